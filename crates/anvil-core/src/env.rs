//! Build environment parsing and variable expansion.
//!
//! The `[build].env` text uses Java properties syntax, one `KEY=VALUE` pair
//! per logical line. Values are expanded against the CI job's environment
//! once, when [`BuildConfig`](crate::BuildConfig) is constructed.

use std::collections::{BTreeMap, HashMap};

use crate::{Error, Result};

/// Source of environment variables for `${VAR}` expansion.
pub trait EnvProvider {
    /// Look up a single variable.
    fn var(&self, name: &str) -> Option<String>;

    /// Substitute `${NAME}` and `$NAME` references in a single pass.
    ///
    /// References to unknown variables are left verbatim. Substituted values
    /// are not expanded again.
    fn expand(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(braced) = after.strip_prefix('{') {
                if let Some(close) = braced.find('}') {
                    let name = &braced[..close];
                    match self.var(name) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&rest[pos..pos + close + 3]),
                    }
                    rest = &braced[close + 1..];
                    continue;
                }
                out.push('$');
                rest = after;
                continue;
            }

            let name_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                // arch-lint: allow(no-silent-result-drop) reason="Option from find, no error to drop"
                .unwrap_or(after.len());
            if name_len == 0 {
                out.push('$');
                rest = after;
                continue;
            }

            let name = &after[..name_len];
            match self.var(name) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            rest = &after[name_len..];
        }

        out.push_str(rest);
        out
    }
}

/// Snapshot of the current process environment.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv {
    vars: BTreeMap<String, String>,
}

impl ProcessEnv {
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }
}

impl EnvProvider for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl EnvProvider for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvProvider for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Parse build environment text in Java properties syntax.
///
/// Supports `=`, `:` and whitespace separators, `#`/`!` comment lines,
/// backslash line continuation and the `\t \n \r \f \uXXXX` escapes.
/// Later keys override earlier ones.
pub fn parse_build_env(text: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    let mut lines = text.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        let first = raw.trim_start_matches(is_blank);
        if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
            continue;
        }

        let mut logical = String::new();
        let mut current = first;
        loop {
            if has_continuation(current) {
                logical.push_str(&current[..current.len() - 1]);
                match lines.next() {
                    Some((_, next)) => current = next.trim_start_matches(is_blank),
                    None => break,
                }
            } else {
                logical.push_str(current);
                break;
            }
        }

        let (key, value) = split_entry(&logical);
        let key = unescape(key, line_no)?;
        if key.is_empty() {
            return Err(Error::BuildEnv {
                line: line_no,
                reason: "missing variable name".to_owned(),
            });
        }
        map.insert(key, unescape(value, line_no)?);
    }

    Ok(map)
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

/// A line continues when it ends with an odd number of backslashes.
fn has_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    let mut separator = None;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                separator = Some(c);
                break;
            }
            c if is_blank(c) => {
                key_end = i;
                separator = Some(' ');
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let rest = &line[key_end..];
    let value = match separator {
        Some(' ') => {
            let rest = rest.trim_start_matches(is_blank);
            match rest.strip_prefix(['=', ':']) {
                Some(r) => r.trim_start_matches(is_blank),
                None => rest,
            }
        }
        Some(_) => rest[1..].trim_start_matches(is_blank),
        None => rest,
    };

    (key, value)
}

fn unescape(s: &str, line: usize) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = decode_unicode(&hex).ok_or_else(|| Error::BuildEnv {
                    line,
                    reason: format!("malformed \\uxxxx encoding: \\u{hex}"),
                })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

fn decode_unicode(hex: &str) -> Option<char> {
    if hex.len() != 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let code = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .fold(0u32, |acc, d| acc * 16 + d);
    char::from_u32(code)
}
