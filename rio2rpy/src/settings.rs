// settings.rs - Per-title translation settings
//
// Flag banks, flag and character tables, call hooks and feature toggles.
// Everything has a default; a JSON file only needs to override what differs.

use crate::opcode::Version;
use anyhow::{bail, Context, Result};
use encoding_rs::{Encoding, SHIFT_JIS};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Flag inclusion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Full read/write access in the generated script
    #[default]
    Include,
    /// Access is dropped; conditionals on it evaluate to false
    Exclude,
    /// Like `Exclude`, with an explanatory comment
    Hint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagCategory {
    #[default]
    Uncategorized,
    /// Branching condition of the story
    Story,
    /// Gallery or event unlock
    Unlock,
    /// Engine bookkeeping
    System,
}

/// Flag table entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct FlagEntry {
    /// Variable name; anonymous flags are referenced by address
    pub name: Option<String>,
    pub policy: Policy,
    pub category: FlagCategory,
}

impl FlagEntry {
    fn system(name: &str, policy: Policy) -> Self {
        Self {
            name: Some(name.to_string()),
            policy,
            category: FlagCategory::System,
        }
    }
}

/// Inclusive flag address range stored in one named container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlagBank {
    pub first: u32,
    pub last: u32,
    /// Python expression of the container, e.g. `persistent.will_flagbank`
    pub name: String,
}

impl FlagBank {
    pub fn contains(&self, addr: u32) -> bool {
        (self.first..=self.last).contains(&addr)
    }

    pub fn is_persistent(&self) -> bool {
        self.name.starts_with("persistent.")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Character {
    /// Ren'Py character object name
    pub symbol: String,
    /// Name as it appears in the script
    pub name: String,
    #[serde(default)]
    pub who_color: Option<String>,
}

/// Voice file name prefix identifying a speaker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceMatch {
    pub prefix: String,
    pub symbol: String,
}

/// Extra action run when a script calls a given procedure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookAction {
    /// Emit a raw statement
    Statement { text: String },
    /// Put an externally managed object into a foreground slot
    StubForeground { slot: usize, reference: String },
}

/// One end of an adult scene range
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RangeMark {
    pub script: String,
    pub addr: u32,
    #[serde(default)]
    pub insert_transition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkipRange {
    pub begin: RangeMark,
    pub end: RangeMark,
}

/// Optional adult scene skipping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdultSkip {
    pub enabled: bool,
    /// `persistent.<variable>` enables the scenes
    pub variable: String,
    pub ranges: Vec<SkipRange>,
}

impl Default for AdultSkip {
    fn default() -> Self {
        Self {
            enabled: false,
            variable: "hentai".to_string(),
            ranges: Vec::new(),
        }
    }
}

/// Translation settings for one title
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub opcode_version: Version,
    /// Emit explicit z-orders for foreground slots
    pub accurate_zorder: bool,
    /// Tint through ATL `matrixcolor` instead of an image wrapper
    pub use_atl_matrixcolor: bool,
    /// Transitions that need the newer graphics runtime
    pub use_gfx_next: bool,
    /// Emit a disassembly comment before each handled instruction
    pub force_include_disasm: bool,
    /// Encoding label understood by `encoding_rs`
    pub text_encoding: String,
    pub move_previous_say_into_menu: bool,
    pub character_table_lookup: bool,
    pub character_namespace: Option<String>,
    pub characters: Vec<Character>,
    pub voice_matches: Vec<VoiceMatch>,
    /// Only animate keyframes guarded by `skipping == 0`
    pub detect_animation_skip: bool,
    /// Drop `with` statements that follow no display change
    pub remove_orphan_with: bool,
    pub weather_layer: Option<String>,
    /// Reference audio by bare name instead of a file path
    pub audio_symbol_only: bool,
    pub resolve_emoji: bool,
    pub emoji_font: Option<String>,
    pub emoji_table: BTreeMap<char, String>,
    pub flag_banks: Vec<FlagBank>,
    pub flags: BTreeMap<u32, FlagEntry>,
    /// Procedure name (upper case) → actions
    pub call_hooks: BTreeMap<String, Vec<HookAction>>,
    pub adult_skip: AdultSkip,
}

impl Default for Settings {
    fn default() -> Self {
        use Policy::{Hint, Include};
        let flags = [
            (700, "cgdisp_page_num", Hint),
            (709, "has_bgm", Hint),
            (720, "current_event_id", Include),
            (723, "has_bg", Hint),
            (756, "option_group", Include),
            (762, "cutscene_index", Include),
            (763, "cutscene_unskippable", Include),
            (765, "ctr_cg", Hint),
            (850, "has_opt_0", Include),
            (851, "has_opt_1", Include),
            (852, "has_opt_2", Include),
            (853, "has_opt_3", Include),
            (993, "typewriter_effect_duration", Hint),
            (995, "in_event_view_mode", Include),
            (996, "performing_transition", Hint),
            (998, "skipping", Include),
            (10007, "system_keycode", Hint),
        ]
        .into_iter()
        .map(|(addr, name, policy)| (addr, FlagEntry::system(name, policy)))
        .collect();

        Self {
            opcode_version: Version::Default,
            accurate_zorder: false,
            use_atl_matrixcolor: false,
            use_gfx_next: false,
            force_include_disasm: true,
            text_encoding: "shift_jis".to_string(),
            move_previous_say_into_menu: true,
            character_table_lookup: false,
            character_namespace: Some("chara".to_string()),
            characters: Vec::new(),
            voice_matches: Vec::new(),
            detect_animation_skip: true,
            remove_orphan_with: true,
            weather_layer: Some("weather".to_string()),
            audio_symbol_only: true,
            resolve_emoji: false,
            emoji_font: None,
            emoji_table: BTreeMap::new(),
            flag_banks: vec![
                FlagBank {
                    first: 0,
                    last: 999,
                    name: "will_flagbank".to_string(),
                },
                FlagBank {
                    first: 1000,
                    last: 2999,
                    name: "persistent.will_flagbank".to_string(),
                },
            ],
            flags,
            call_hooks: BTreeMap::new(),
            adult_skip: AdultSkip::default(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON; missing keys keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text).context("Invalid settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if Encoding::for_label(self.text_encoding.as_bytes()).is_none() {
            bail!("Unknown text encoding `{}`", self.text_encoding);
        }
        for bank in &self.flag_banks {
            if bank.first > bank.last {
                bail!(
                    "Flag bank `{}` has an empty range {}..={}",
                    bank.name,
                    bank.first,
                    bank.last
                );
            }
        }
        if self.flag_banks.is_empty() {
            bail!("At least one flag bank is required");
        }
        Ok(())
    }

    /// Text encoding of the scripts, Shift-JIS if the label is unknown
    pub fn encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.text_encoding.as_bytes()).unwrap_or(SHIFT_JIS)
    }

    pub fn flag(&self, addr: u32) -> Option<&FlagEntry> {
        self.flags.get(&addr)
    }

    pub fn flag_name(&self, addr: u32) -> Option<&str> {
        self.flag(addr)?.name.as_deref()
    }

    pub fn bank_for(&self, addr: u32) -> Option<&FlagBank> {
        self.flag_banks.iter().find(|b| b.contains(addr))
    }

    /// Character symbol by display name
    pub fn character_symbol(&self, name: &str) -> Option<&str> {
        self.characters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.symbol.as_str())
    }

    pub fn character(&self, symbol: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.symbol == symbol)
    }

    /// Symbol with the configured namespace prefix
    pub fn qualified_symbol(&self, symbol: &str) -> String {
        match &self.character_namespace {
            Some(ns) => format!("{}.{}", ns, symbol),
            None => symbol.to_string(),
        }
    }

    /// Speaker symbol for a voice file, matched case-insensitively by prefix
    pub fn voice_speaker(&self, filename: &str) -> Option<&str> {
        let filename = filename.to_lowercase();
        self.voice_matches
            .iter()
            .find(|m| filename.starts_with(&m.prefix.to_lowercase()))
            .map(|m| m.symbol.as_str())
    }

    pub fn hooks(&self, procedure: &str) -> &[HookAction] {
        self.call_hooks
            .get(procedure)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.flag_name(998), Some("skipping"));
        assert_eq!(s.flag(993).unwrap().policy, Policy::Hint);
        assert_eq!(s.bank_for(1500).unwrap().name, "persistent.will_flagbank");
        assert!(s.bank_for(3000).is_none());
        assert_eq!(s.encoding(), SHIFT_JIS);
        assert!(s.force_include_disasm);
    }

    #[test]
    fn test_from_json_overrides() {
        let s = Settings::from_json(
            r#"{
                "opcode_version": "ymk",
                "character_table_lookup": true,
                "characters": [{"symbol": "l", "name": "Lida", "who_color": "ff0000"}],
                "voice_matches": [{"prefix": "led_", "symbol": "l"}],
                "flags": {"42": {"name": "met_lida", "category": "story"}},
                "emoji_table": {"@": "<3"},
                "call_hooks": {
                    "LIST_VIW": [{"kind": "stub_foreground", "slot": 3, "reference": "screen list"}]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(s.opcode_version, Version::Ymk);
        assert_eq!(s.character_symbol("Lida"), Some("l"));
        assert_eq!(s.voice_speaker("LED_0001"), Some("l"));
        assert_eq!(s.voice_speaker("aka_0001"), None);
        assert_eq!(s.flag(42).unwrap().policy, Policy::Include);
        assert_eq!(s.flag(42).unwrap().category, FlagCategory::Story);
        assert_eq!(s.emoji_table.get(&'@').map(String::as_str), Some("<3"));
        assert_eq!(
            s.hooks("LIST_VIW"),
            &[HookAction::StubForeground {
                slot: 3,
                reference: "screen list".to_string()
            }]
        );
        // Untouched keys keep their defaults
        assert_eq!(s.flag_banks.len(), 2);
        assert!(s.remove_orphan_with);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(Settings::from_json(r#"{"text_encoding": "klingon"}"#).is_err());
        assert!(Settings::from_json(r#"{"flag_banks": []}"#).is_err());
        assert!(Settings::from_json("not json").is_err());
    }

    #[test]
    fn test_qualified_symbol() {
        let mut s = Settings::default();
        assert_eq!(s.qualified_symbol("a"), "chara.a");
        s.character_namespace = None;
        assert_eq!(s.qualified_symbol("a"), "a");
    }
}
