// src/template.rs - Placeholder substitution for subjects and bodies
//
// Format strings use `{name}` placeholders. `{{` and `}}` produce literal
// braces. Lookup checks the per-event special variables first, then the
// snapshot's fields. A placeholder that resolves to nothing is replaced
// with a visible marker instead of failing the whole message: a partially
// broken alert still reaches the operator, a dropped one does not.

use crate::snapshot::Snapshot;

/// The four special variables available to every format string.
#[derive(Debug, Clone)]
pub struct SpecialVars<'a> {
    /// Alarm name (`{_NAME}`)
    pub name: &'a str,
    /// Rule text (`{_RULE}`)
    pub rule: &'a str,
    /// Resolved state label (`{_STATE}`)
    pub state: &'a str,
    /// Snapshot timestamp, pre-formatted (`{_TIME}`)
    pub time: String,
}

/// Result of rendering one format string.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Final text, markers included
    pub text: String,
    /// Placeholder names that had no value and were marked in the output
    pub unresolved: Vec<String>,
}

impl Rendered {
    /// True when every placeholder resolved.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Substitute `{name}` placeholders in `template`.
pub fn render(template: &str, snapshot: &Snapshot, special: &SpecialVars) -> Rendered {
    let mut text = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    text.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if !closed {
                    // dangling brace, keep it visible as-is
                    text.push('{');
                    text.push_str(&name);
                    continue;
                }
                match lookup(&name, snapshot, special) {
                    Some(value) => text.push_str(&value),
                    None => {
                        text.push_str(&format!("<unresolved:{}>", name));
                        unresolved.push(name);
                    }
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                text.push('}');
            }
            other => text.push(other),
        }
    }

    Rendered { text, unresolved }
}

fn lookup(name: &str, snapshot: &Snapshot, special: &SpecialVars) -> Option<String> {
    match name {
        "_NAME" => Some(special.name.to_string()),
        "_RULE" => Some(special.rule.to_string()),
        "_STATE" => Some(special.state.to_string()),
        "_TIME" => Some(special.time.clone()),
        field => snapshot.get(field).map(|v| v.to_string()),
    }
}
