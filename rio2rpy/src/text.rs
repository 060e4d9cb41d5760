// text.rs - Dialogue text conversion
//
// Decodes script strings and escapes them for Ren'Py string literals,
// rewriting the engine's `{base:reading}` ruby markup on the way.

use encoding_rs::Encoding;
use std::collections::BTreeMap;

/// Emoji substitution table and the font to render them with
#[derive(Debug, Clone, Copy)]
pub struct Emoji<'a> {
    pub table: &'a BTreeMap<char, String>,
    pub font: Option<&'a str>,
}

/// Decode raw script bytes with the title's encoding
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}

/// Match `{base:reading}` at the start of `text`
fn ruby(text: &str) -> Option<(&str, &str, usize)> {
    let body = text.strip_prefix('{')?;
    let close = body.find('}')?;
    let (base, reading) = body[..close].split_once(':')?;
    let valid = |s: &str| !s.is_empty() && !s.contains(['{', ':']);
    if valid(base) && valid(reading) {
        Some((base, reading, close + 2))
    } else {
        None
    }
}

/// Escape text for a double-quoted say statement
pub fn escape(text: &str, emoji: Option<Emoji<'_>>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        let mut advance = c.len_utf8();
        match c {
            '\\' => match rest[1..].chars().next() {
                Some('n') => {
                    out.push_str("\\n");
                    advance = 2;
                }
                Some('\\') => {
                    out.push_str("\\\\");
                    advance = 2;
                }
                // Unknown escape; the next character is handled on its own
                _ => out.push_str("\\\\"),
            },
            '%' => out.push_str("\\%"),
            '"' | '\'' => {
                out.push('\\');
                out.push(c);
            }
            '[' | ']' | '}' => {
                out.push(c);
                out.push(c);
            }
            '{' => match ruby(rest) {
                Some((base, reading, len)) => {
                    let long = base.chars().count() > 1;
                    if long {
                        out.push_str("{rb}");
                    }
                    out.push_str(base);
                    if long {
                        out.push_str("{/rb}");
                    }
                    out.push_str("{rt}");
                    out.push_str(reading);
                    out.push_str("{/rt}");
                    advance = len;
                }
                None => out.push_str("{{"),
            },
            _ => match emoji.and_then(|e| e.table.get(&c).map(|s| (s, e.font))) {
                Some((replacement, font)) => {
                    if let Some(font) = font {
                        out.push_str(&format!("{{font={}}}", font));
                    }
                    out.push_str(replacement);
                    if font.is_some() {
                        out.push_str("{/font}");
                    }
                }
                None => out.push(c),
            },
        }
        rest = &rest[advance..];
    }
    out
}

/// Format a float the way Ren'Py script expects: whole numbers keep `.0`
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Seconds from a millisecond count
pub fn seconds(ms: i64) -> String {
    format_float(ms as f64 / 1000.0)
}
