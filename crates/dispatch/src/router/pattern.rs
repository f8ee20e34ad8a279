//! Compilation of URI templates.
//!
//! A template is literal text interleaved with `{name}` and `{name: regex}` tokens. `{name}`
//! captures one path segment (`[^/]+`), `{name: regex}` captures whatever `regex` matches.
//! Literal text is used as regex source, so `/assets/.*` is a catch-all.
//!
//! A template without tokens and without regex metacharacters is matched by plain string
//! equality.
//!
//! Expanding a template back into a path unescapes `\x` in literal text. Literal text that
//! still carries regex syntax (`*`, `+`, groups, classes, anchors) has no single path to
//! expand to, so such templates cannot be expanded.

use crate::error::RouterError;
use crate::router::PathParams;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

static TOKEN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("token name regex is valid"));

const SEGMENT_REGEX: &str = "[^/]+";
const REGEX_METACHARACTERS: &[char] = &['*', '+', '?', '(', ')', '|', '[', ']', '^', '$', '\\'];

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Param { name: String, regex: Option<String> },
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact,
    Regex(Regex),
}

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    pieces: Vec<Piece>,
    matcher: Matcher,
    param_names: Vec<String>,
}

impl RoutePattern {
    pub fn compile(raw: &str) -> Result<Self, RouterError> {
        let pieces = parse(raw)?;

        let mut seen = HashSet::new();
        let mut param_names = Vec::new();
        for piece in &pieces {
            if let Piece::Param { name, .. } = piece {
                if !seen.insert(name.as_str()) {
                    return Err(RouterError::DuplicateParam { pattern: raw.to_string(), name: name.clone() });
                }
                param_names.push(name.clone());
            }
        }

        let matcher = if param_names.is_empty() && !raw.contains(REGEX_METACHARACTERS) {
            Matcher::Exact
        } else {
            Matcher::Regex(build_regex(raw, &pieces)?)
        };

        Ok(Self { raw: raw.to_string(), pieces, matcher, param_names })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the path parameters, in capture order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn is_exact(&self) -> bool {
        matches!(self.matcher, Matcher::Exact)
    }

    /// Matches `path` against the whole pattern and returns the percent-decoded captures.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        match &self.matcher {
            Matcher::Exact => (self.raw == path).then(PathParams::empty),
            Matcher::Regex(regex) => {
                let captures = regex.captures(path)?;
                let params = self.param_names.iter().enumerate().filter_map(|(index, name)| {
                    captures.name(&group_name(index)).map(|value| (name.clone(), decode(value.as_str())))
                });
                Some(PathParams::from_pairs(params))
            }
        }
    }

    /// Rebuilds a path, substituting every parameter with its percent-encoded value.
    ///
    /// Returns `None` as soon as `lookup` has no value for one of the parameters, or when
    /// literal text of the template is a regex rather than plain text.
    pub fn expand<'a, F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut path = String::with_capacity(self.raw.len());
        for piece in &self.pieces {
            match piece {
                Piece::Literal(literal) => unescape_into(literal, &mut path)?,
                Piece::Param { name, .. } => path.push_str(&urlencoding::encode(lookup(name)?)),
            }
        }
        Some(path)
    }
}

/// Appends the plain text behind `literal`, or `None` when it is not plain text.
fn unescape_into(literal: &str, path: &mut String) -> Option<()> {
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if escaped.is_ascii_punctuation() => path.push(escaped),
                _ => return None,
            },
            c if REGEX_METACHARACTERS.contains(&c) => return None,
            c => path.push(c),
        }
    }
    Some(())
}

fn group_name(index: usize) -> String {
    format!("p{index}")
}

fn decode(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(Cow::Borrowed(decoded)) => decoded.to_string(),
        Ok(Cow::Owned(decoded)) => decoded,
        Err(_) => raw.to_string(),
    }
}

fn build_regex(raw: &str, pieces: &[Piece]) -> Result<Regex, RouterError> {
    let mut source = String::with_capacity(raw.len() + 16);
    source.push_str("^(?:");
    let mut index = 0;
    for piece in pieces {
        match piece {
            Piece::Literal(literal) => source.push_str(literal),
            Piece::Param { regex, .. } => {
                source.push_str("(?P<");
                source.push_str(&group_name(index));
                source.push('>');
                source.push_str(regex.as_deref().unwrap_or(SEGMENT_REGEX));
                source.push(')');
                index += 1;
            }
        }
    }
    source.push_str(")$");

    Regex::new(&source).map_err(|source| RouterError::InvalidRegex { pattern: raw.to_string(), source })
}

fn parse(raw: &str) -> Result<Vec<Piece>, RouterError> {
    let bytes = raw.as_bytes();
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if literal_start < i {
                    pieces.push(Piece::Literal(raw[literal_start..i].to_string()));
                }
                let end = closing_brace(bytes, i).ok_or_else(|| RouterError::invalid_pattern(raw, "unclosed '{'"))?;
                pieces.push(parse_token(raw, &raw[i + 1..end])?);
                i = end + 1;
                literal_start = i;
            }
            b'}' => return Err(RouterError::invalid_pattern(raw, "unbalanced '}'")),
            _ => i += 1,
        }
    }

    if literal_start < bytes.len() {
        pieces.push(Piece::Literal(raw[literal_start..].to_string()));
    }
    Ok(pieces)
}

/// Finds the brace closing the one at `open`; regexes inside a token may nest braces.
fn closing_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in bytes[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_token(raw: &str, token: &str) -> Result<Piece, RouterError> {
    let (name, regex) = match token.split_once(':') {
        Some((name, regex)) => {
            let regex = regex.trim();
            if regex.is_empty() {
                return Err(RouterError::invalid_pattern(raw, format!("empty regex for parameter '{}'", name.trim())));
            }
            (name.trim(), Some(regex.to_string()))
        }
        None => (token.trim(), None),
    };

    if !TOKEN_NAME.is_match(name) {
        return Err(RouterError::invalid_pattern(raw, format!("invalid parameter name '{name}'")));
    }

    Ok(Piece::Param { name: name.to_string(), regex })
}
