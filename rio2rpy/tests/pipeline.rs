// End-to-end tests: bytes → instructions → CFG → Ren'Py script

use rio2rpy::settings::{Character, RangeMark, SkipRange, VoiceMatch};
use rio2rpy::{cfg, disasm, transpile, BlockKind, OpcodeTable, Settings, Version};

fn quiet() -> Settings {
    Settings {
        force_include_disasm: false,
        ..Settings::default()
    }
}

fn cstr(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

fn sleep(ms: i16) -> Vec<u8> {
    let mut v = vec![0x82];
    v.extend_from_slice(&ms.to_le_bytes());
    v.push(0);
    v
}

const RETURN: [u8; 2] = [0x0a, 0x00];

#[test]
fn test_decode_and_cfg_agree() {
    // jeq skipping, 0, +4; sleep 100; goto "b02"; return
    let mut data = vec![0x01, 0x03];
    data.extend_from_slice(&998u16.to_le_bytes());
    data.extend_from_slice(&0i16.to_le_bytes());
    data.extend_from_slice(&4i32.to_le_bytes());
    data.push(0);
    data.extend(sleep(100));
    data.push(0x07);
    data.extend(cstr("b02"));
    data.extend_from_slice(&RETURN);

    let insts = disasm::decode(&data, &OpcodeTable::default(), true);
    let graph = cfg::build(&insts);
    let kinds: Vec<_> = graph.blocks().iter().map(|b| b.kind).collect();
    assert_eq!(
        kinds,
        vec![
            BlockKind::Conditional,
            BlockKind::Linear,
            BlockKind::ProcJump,
            BlockKind::Return
        ]
    );
    assert_eq!(graph.block_at(15).unwrap().exit_procs, vec!["b02".to_string()]);

    let t = transpile("a01", &data, &quiet());
    assert!(t.is_complete());
    assert!(t
        .text
        .contains("  if will_flagbank['skipping'] == 0:\n    pause 0.1\n  jump RIO_B02\n  return\n"));
}

#[test]
fn test_invalid_opcode_is_commented() {
    let mut data = vec![0x99, 0x01, 0x02, 0x00];
    data.extend_from_slice(&RETURN);
    let t = transpile("a01", &data, &quiet());
    assert!(t.is_complete());
    assert!(t.text.contains("# [cmd:unhandled] 0x0:INVALID("));
    assert!(t.text.ends_with("  return\n"));
}

#[test]
fn test_jump_to_end_of_script() {
    let mut data = vec![0x06];
    data.extend_from_slice(&6i32.to_le_bytes());
    data.push(0);
    let t = transpile("t", &data, &quiet());
    assert!(t.text.ends_with("  jump RIO_T_6\nlabel RIO_T_6:\n  pass\n"));
}

#[test]
fn test_ymk_layout_from_json_settings() {
    let settings =
        Settings::from_json(r#"{"force_include_disasm": false, "opcode_version": "ymk"}"#).unwrap();
    assert_eq!(settings.opcode_version, Version::Ymk);

    // fg_noarg7 0, 400, 0, 0, 0, 0, "ch"; transition fade_in 500ms
    let mut data = vec![0x48, 0x00];
    for v in [400i16, 0, 0, 0] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data.push(0);
    data.extend(cstr("ch"));
    data.extend_from_slice(&[0x4a, 25]);
    data.extend_from_slice(&500i16.to_le_bytes());
    data.push(0);

    let t = transpile("a01", &data, &settings);
    assert!(t.is_complete());
    assert!(t
        .text
        .contains("  show fg CH at reset as fg_i0:\n    xpos 0.5\n  with Dissolve(0.5)\n"));
}

#[test]
fn test_audio_and_voice_speaker() {
    let mut settings = quiet();
    settings.character_table_lookup = true;
    settings.characters.push(Character {
        symbol: "l".to_string(),
        name: "Lida".to_string(),
        who_color: None,
    });
    settings.voice_matches.push(VoiceMatch {
        prefix: "led_".to_string(),
        symbol: "l".to_string(),
    });

    // bgm
    let mut data = vec![0x21, 0x00];
    data.extend_from_slice(&2000i16.to_le_bytes());
    data.push(0);
    data.extend(cstr("BGM01"));
    // se on channel 1, forever
    data.extend_from_slice(&[0x25, 0x01, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    data.extend(cstr("SE01"));
    // se_stop all
    data.extend_from_slice(&[0x26, 0xff, 0x00]);
    // voice
    data.extend_from_slice(&[0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    data.extend(cstr("LED_0001"));
    // text_c "???" "Hello"
    data.extend_from_slice(&[0x42, 0x01, 0x00, 0x00, 0x00]);
    data.extend(cstr("???"));
    data.extend(cstr("Hello"));
    data.extend_from_slice(&RETURN);

    let t = transpile("a01", &data, &settings);
    assert!(t.is_complete());
    assert!(t.text.contains("  play music 'BGM01' fadein 2.0 loop\n"));
    assert!(t.text.contains(
        "  # [patch:sound_channel.rpy] renpy.music.register_channel('sound2', 'sfx', False)\n  play sound2 'SE01' loop\n"
    ));
    assert!(t.text.contains("  call stop_all_sounds()\n"));
    assert!(t.text.contains("  voice 'LED_0001'\n"));
    assert!(t.text.contains("  chara.l \"Hello\" (name='???')\n"));
}

#[test]
fn test_adult_skip_range() {
    let mut settings = quiet();
    settings.adult_skip.enabled = true;
    settings.adult_skip.ranges.push(SkipRange {
        begin: RangeMark {
            script: "EV01".to_string(),
            addr: 4,
            insert_transition: true,
        },
        end: RangeMark {
            script: "ev01".to_string(),
            addr: 8,
            insert_transition: false,
        },
    });
    let data = [sleep(100), sleep(200), RETURN.to_vec()].concat();

    let t = transpile("ev01", &data, &settings);
    assert!(t.is_complete());
    assert!(t.text.contains(
        "  # [adult] Begin #0\n  if not persistent.hentai:\n    scene bg BLACK with dissolve\n    pause 1.0\n    jump RIO_EV01_skip_0_end\n  pause 0.2\n# [adult] End #0\nlabel RIO_EV01_skip_0_end:\n  return\n"
    ));
}

#[test]
fn test_disassembly_listing() {
    let mut data = vec![0x07];
    data.extend(cstr("ab"));
    let listing = rio2rpy::disassemble(&data, &Settings::default());
    assert_eq!(listing, "0x0:goto(\"ab\")\n0x4:EOF()\n");
}
