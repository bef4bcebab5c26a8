//! Resource path segmentation.
//!
//! A resource path is a `/`-separated list of segments, each a resource or
//! property name optionally followed by a parenthesized identifier:
//! `Datastreams(52)/Observations`, `Things('a/b')/name`. Quoted identifiers may
//! contain `/`, `)` and `?`; a quote inside a quoted identifier is written twice.

use std::ops::Range;

/// One segment of a resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Resource, navigation or property name.
    pub name: String,
    /// Identifier between the parentheses, if any.
    pub id: Option<String>,
    /// Byte range of the whole segment within the path.
    pub span: Range<usize>,
}

impl PathSegment {
    /// Whether the segment carries an identifier.
    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }
}

/// Split a topic body at the first `?` outside a quoted identifier.
///
/// Returns the resource path and the query text, if any.
pub fn split_query(body: &str) -> (&str, Option<&str>) {
    let mut quoted = false;
    for (pos, b) in body.bytes().enumerate() {
        match b {
            // A doubled quote toggles twice and leaves the state unchanged.
            b'\'' => quoted = !quoted,
            b'?' if !quoted => return (&body[..pos], Some(&body[pos + 1..])),
            _ => {}
        }
    }
    (body, None)
}

/// Split `path` into segments.
///
/// With `unquote` set, quoted identifiers lose their surrounding quotes and
/// doubled quotes collapse to one; otherwise identifiers are kept verbatim.
pub fn split_segments(path: &str, unquote: bool) -> Result<Vec<PathSegment>, String> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;

    if path.is_empty() {
        return Err("empty path".to_string());
    }

    loop {
        let start = pos;
        while pos < bytes.len() && bytes[pos] != b'(' && bytes[pos] != b'/' {
            if bytes[pos] == b')' || bytes[pos] == b'\'' {
                return Err(format!("unexpected {:?} at offset {}", bytes[pos] as char, pos));
            }
            pos += 1;
        }
        let name = &path[start..pos];
        if name.is_empty() {
            return Err(format!("empty segment at offset {}", start));
        }

        let mut id = None;
        if pos < bytes.len() && bytes[pos] == b'(' {
            let (raw, end) = scan_identifier(path, pos + 1)?;
            id = Some(if unquote { unquote_identifier(raw) } else { raw.to_string() });
            pos = end;
        }

        segments.push(PathSegment {
            name: name.to_string(),
            id,
            span: start..pos,
        });

        match bytes.get(pos) {
            None => return Ok(segments),
            Some(b'/') => pos += 1,
            Some(other) => {
                return Err(format!("expected '/' at offset {}, found {:?}", pos, *other as char))
            }
        }
    }
}

/// Scan an identifier starting right after `(`.
///
/// Returns the raw identifier text and the offset just past the closing `)`.
fn scan_identifier(path: &str, start: usize) -> Result<(&str, usize), String> {
    let bytes = path.as_bytes();
    let mut pos = start;

    if bytes.get(pos) == Some(&b'\'') {
        pos += 1;
        loop {
            match bytes.get(pos) {
                None => return Err(format!("unterminated quoted identifier at offset {}", start)),
                Some(b'\'') if bytes.get(pos + 1) == Some(&b'\'') => pos += 2,
                Some(b'\'') => {
                    pos += 1;
                    break;
                }
                Some(_) => pos += 1,
            }
        }
        if bytes.get(pos) != Some(&b')') {
            return Err(format!("expected ')' at offset {}", pos));
        }
    } else {
        while pos < bytes.len() && bytes[pos] != b')' {
            if matches!(bytes[pos], b'(' | b'/' | b'\'') {
                return Err(format!("unexpected {:?} in identifier", bytes[pos] as char));
            }
            pos += 1;
        }
        if pos >= bytes.len() {
            return Err(format!("unterminated identifier at offset {}", start));
        }
    }

    if pos == start {
        return Err(format!("empty identifier at offset {}", start));
    }
    Ok((&path[start..pos], pos + 1))
}

fn unquote_identifier(raw: &str) -> String {
    match raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => raw.to_string(),
    }
}

/// Whether `name` can be a property name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
