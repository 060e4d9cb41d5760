// Browser-side tests; run with `wasm-pack test --headless --chrome`
#![cfg(target_arch = "wasm32")]

use rio2rpy_wasm::{disassemble_script, transpile_script};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn test_transpile_return() {
    let t = transpile_script("a01", &[0x0a, 0x00], None).unwrap();
    assert!(t.is_complete());
    assert!(t.text().contains("label RIO_A01:"));
}

#[wasm_bindgen_test]
fn test_incomplete_translation_returns_partial_text() {
    // bg "bg01"; transition mask_dissolve without a mask; return
    let script = [
        0x46, 0, 0, 0, 0, 0, 0, 0, 0, 0, b'b', b'g', b'0', b'1', 0x00, 0x4a, 42, 0xf4, 0x01, 0x00,
        0x0a, 0x00,
    ];
    let t = transpile_script("a01", &script, None).unwrap();
    assert!(!t.is_complete());
    assert!(t.error().is_some());
    assert!(t.text().contains("scene bg BG01 at reset"));
    assert!(t
        .text()
        .ends_with("$ renpy.error('Incomplete script translation')\n"));
}

#[wasm_bindgen_test]
fn test_disassemble_goto() {
    let listing = disassemble_script(b"\x07ab\x00", Some("default".to_string())).unwrap();
    assert!(listing.starts_with("0x0:goto(\"ab\")\n"));
}
