// emitter.rs - Indented script emitter
//
// Accumulates statements and comments at a tracked scope depth and renders
// them as indented text.

use std::fmt;

/// One emitted line
#[derive(Debug, Clone)]
struct Line {
    depth: usize,
    text: String,
}

/// Line/scope accumulator for the generated script
#[derive(Debug, Clone)]
pub struct Emitter {
    lines: Vec<Line>,
    /// One entry per open scope: has it received a statement yet?
    scopes: Vec<bool>,
    indent: &'static str,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self::with_indent("  ")
    }

    pub fn with_indent(indent: &'static str) -> Self {
        Self {
            lines: Vec::new(),
            scopes: Vec::new(),
            indent,
        }
    }

    fn push(&mut self, text: String) {
        self.lines.push(Line {
            depth: self.scopes.len(),
            text,
        });
    }

    /// Emit a statement in the current scope
    pub fn statement(&mut self, text: impl Into<String>) {
        self.push(text.into());
        if let Some(has_statement) = self.scopes.last_mut() {
            *has_statement = true;
        }
    }

    /// Emit a comment line; comments don't count as statements
    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.push(format!("# {}", text.as_ref()));
    }

    pub fn begin_scope(&mut self) {
        self.scopes.push(false);
    }

    /// Close the innermost scope, filling it with `pass` if it is empty
    pub fn end_scope(&mut self) {
        match self.scopes.last() {
            None => log::warn!("closing a scope at depth 0"),
            Some(false) => {
                self.statement("pass");
                self.scopes.pop();
            }
            Some(true) => {
                self.scopes.pop();
            }
        }
    }

    /// Close every open scope
    pub fn end_all_scopes(&mut self) {
        while !self.scopes.is_empty() {
            self.end_scope();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            for _ in 0..line.depth {
                out.push_str(self.indent);
            }
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_scopes() {
        let mut e = Emitter::new();
        e.statement("label start:");
        e.begin_scope();
        e.statement("if x == 1:");
        e.begin_scope();
        e.statement("jump a");
        e.end_scope();
        e.end_scope();
        assert_eq!(e.render(), "label start:\n  if x == 1:\n    jump a\n");
        assert_eq!(e.depth(), 0);
    }

    #[test]
    fn test_empty_scope_gets_pass() {
        let mut e = Emitter::new();
        e.statement("if False:");
        e.begin_scope();
        e.comment("nothing here");
        e.end_scope();
        assert_eq!(e.render(), "if False:\n  # nothing here\n  pass\n");
    }

    #[test]
    fn test_end_scope_at_root_is_noop() {
        let mut e = Emitter::new();
        e.end_scope();
        e.statement("return");
        assert_eq!(e.to_string(), "return\n");
    }

    #[test]
    fn test_end_all_scopes() {
        let mut e = Emitter::with_indent("    ");
        e.begin_scope();
        e.statement("a");
        e.begin_scope();
        e.end_all_scopes();
        assert_eq!(e.render(), "    a\n        pass\n");
    }
}
