// export.rs - Companion Ren'Py definitions
//
// Character objects and the flag name table referenced by translated scripts.

use crate::emitter::Emitter;
use crate::settings::Settings;

/// `define` statements for every configured character
pub fn characters(settings: &Settings) -> String {
    let mut out = Emitter::new();
    out.statement("init:");
    out.begin_scope();
    for chara in &settings.characters {
        let color = chara
            .who_color
            .as_ref()
            .map(|c| format!(", who_color='{}'", c))
            .unwrap_or_default();
        out.statement(format!(
            "define {} = Character('{}'{})",
            settings.qualified_symbol(&chara.symbol),
            chara.name.replace('\'', "\\'"),
            color
        ));
    }
    out.end_scope();
    out.render()
}

/// Flag name to address table, for scripts that look flags up by name
pub fn flag_names(settings: &Settings) -> String {
    let mut out = Emitter::new();
    out.statement("python early:");
    out.begin_scope();
    let named: Vec<_> = settings
        .flags
        .iter()
        .filter_map(|(addr, entry)| entry.name.as_ref().map(|name| (name, addr)))
        .collect();
    if named.is_empty() {
        out.statement("WILL_FLAG_NAMES = {}");
    } else {
        out.statement("WILL_FLAG_NAMES = {");
        out.begin_scope();
        for (name, addr) in named {
            out.statement(format!("'{}': {},", name, addr));
        }
        out.end_scope();
        out.statement("}");
    }
    out.end_scope();
    out.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Character;

    #[test]
    fn test_characters() {
        let mut settings = Settings::default();
        settings.characters = vec![
            Character {
                symbol: "l".to_string(),
                name: "Lida".to_string(),
                who_color: Some("#ff8080".to_string()),
            },
            Character {
                symbol: "n".to_string(),
                name: "Narrator's".to_string(),
                who_color: None,
            },
        ];
        assert_eq!(
            characters(&settings),
            "init:\n\
             \x20 define chara.l = Character('Lida', who_color='#ff8080')\n\
             \x20 define chara.n = Character('Narrator\\'s')\n"
        );
    }

    #[test]
    fn test_no_characters() {
        let mut settings = Settings::default();
        settings.character_namespace = None;
        assert_eq!(characters(&settings), "init:\n  pass\n");
    }

    #[test]
    fn test_flag_names() {
        let text = flag_names(&Settings::default());
        assert!(text.starts_with("python early:\n  WILL_FLAG_NAMES = {\n"));
        assert!(text.contains("    'skipping': 998,\n"));
        assert!(text.ends_with("  }\n"));
        // Sorted by address
        let a = text.find("'cgdisp_page_num'").unwrap();
        let b = text.find("'system_keycode'").unwrap();
        assert!(a < b);

        let mut settings = Settings::default();
        settings.flags.clear();
        assert_eq!(flag_names(&settings), "python early:\n  WILL_FLAG_NAMES = {}\n");
    }
}
