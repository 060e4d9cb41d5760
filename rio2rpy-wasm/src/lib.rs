// rio2rpy-wasm: RIO to Ren'Py transpiler for the browser
//
// This crate wraps the rio2rpy library for use inside a WebAssembly
// environment. It compiles to wasm32-unknown-unknown via wasm-bindgen, so a
// web page can convert dropped scenario files without a native install.

use rio2rpy::{Settings, Version};
use wasm_bindgen::prelude::*;

/// Translated script text and the error that stopped it, if any
///
/// A failed translation still carries everything emitted before the
/// failure, ending in a `$ renpy.error(...)` line.
#[wasm_bindgen]
pub struct Transpiled {
    text: String,
    error: Option<String>,
}

#[wasm_bindgen]
impl Transpiled {
    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.text.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn error(&self) -> Option<String> {
        self.error.clone()
    }

    #[wasm_bindgen(getter, js_name = isComplete)]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Transpile one RIO script to Ren'Py script text.
///
/// `name` is the script's label name (the file stem), `version` an optional
/// opcode table version (`default`, `ymk` or `io`). Default settings are
/// used otherwise. Only bad arguments throw; translation errors are
/// reported through `Transpiled::error`.
#[wasm_bindgen]
pub fn transpile_script(
    name: &str,
    script: &[u8],
    version: Option<String>,
) -> Result<Transpiled, JsValue> {
    transpile_inner(name, script, None, version.as_deref())
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}

/// Like `transpile_script`, with title settings given as JSON.
#[wasm_bindgen]
pub fn transpile_script_with_settings(
    name: &str,
    script: &[u8],
    settings_json: &str,
) -> Result<Transpiled, JsValue> {
    transpile_inner(name, script, Some(settings_json), None)
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}

/// Disassembly listing of a RIO script, one instruction per line.
#[wasm_bindgen]
pub fn disassemble_script(script: &[u8], version: Option<String>) -> Result<String, JsValue> {
    let settings = settings(None, version.as_deref())
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
    Ok(rio2rpy::disassemble(script, &settings))
}

fn settings(json: Option<&str>, version: Option<&str>) -> anyhow::Result<Settings> {
    let mut settings = match json {
        Some(json) => Settings::from_json(json)?,
        None => Settings::default(),
    };
    if let Some(version) = version {
        settings.opcode_version = version.parse::<Version>()?;
    }
    Ok(settings)
}

fn transpile_inner(
    name: &str,
    script: &[u8],
    json: Option<&str>,
    version: Option<&str>,
) -> anyhow::Result<Transpiled> {
    let settings = settings(json, version)?;
    let translation = rio2rpy::transpile(name, script, &settings);
    Ok(Transpiled {
        text: translation.text,
        error: translation
            .error
            .map(|err| format!("translation of {} is incomplete: {}", name, err)),
    })
}

/// Get version string
#[wasm_bindgen]
pub fn version() -> String {
    format!("rio2rpy-wasm {}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // bg "bg01"; transition mask_dissolve 500ms without a mask; return
    const MASKLESS: &[u8] = &[
        0x46, 0, 0, 0, 0, 0, 0, 0, 0, 0, b'b', b'g', b'0', b'1', 0x00, 0x4a, 42, 0xf4, 0x01, 0x00,
        0x0a, 0x00,
    ];

    #[test]
    fn test_transpile_inner() {
        // `return`
        let t = transpile_inner("a01", &[0x0a, 0x00], None, None).unwrap();
        assert!(t.is_complete());
        assert!(t.text.contains("label RIO_A01:\n"));
        assert!(t.text.contains("  return\n"));
    }

    #[test]
    fn test_incomplete_translation_keeps_text() {
        let t = transpile_inner("a01", MASKLESS, None, None).unwrap();
        assert!(!t.is_complete());
        assert!(t.error().unwrap().starts_with("translation of a01 is incomplete"));
        assert!(t.text().contains("  scene bg BG01 at reset\n"));
        assert!(t
            .text()
            .ends_with("$ renpy.error('Incomplete script translation')\n"));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        assert!(transpile_inner("a01", &[0x0a, 0x00], None, Some("nope")).is_err());
        assert!(settings(None, Some("ymk")).is_ok());
    }

    #[test]
    fn test_settings_json() {
        let t = transpile_inner(
            "a01",
            &[0x0a, 0x00],
            Some(r#"{"force_include_disasm": false}"#),
            None,
        )
        .unwrap();
        assert!(!t.text.contains("[cmd]"));
    }
}
