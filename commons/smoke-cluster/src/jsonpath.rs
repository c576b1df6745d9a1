//! A kubectl-style JSON-path subset: `{.a.b[0].c[*].d}`.
//!
//! Multiple matches are joined with a single space. Strings render raw,
//! `null` renders empty, everything else renders as compact JSON. A path
//! that matches nothing yields an empty string.

use serde_json::Value;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid json path `{path}`: {reason}")]
pub struct JsonPathError {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

pub fn extract(value: &Value, path: &str) -> Result<String, JsonPathError> {
    let segments = parse(path)?;
    let mut current = vec![value];
    for segment in &segments {
        let mut next = Vec::new();
        for v in current {
            match segment {
                Segment::Field(name) => {
                    if let Some(child) = v.get(name.as_str()) {
                        next.push(child);
                    }
                }
                Segment::Index(i) => {
                    if let Some(child) = v.get(*i) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => match v {
                    Value::Array(items) => next.extend(items.iter()),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
            }
        }
        current = next;
    }
    Ok(current.into_iter().map(render).collect::<Vec<_>>().join(" "))
}

fn render(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse(path: &str) -> Result<Vec<Segment>, JsonPathError> {
    let err = |reason: &str| JsonPathError {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = path.trim();
    let inner = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
        (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
        (None, None) => trimmed,
        _ => return Err(err("unbalanced braces")),
    };
    let inner = inner.strip_prefix('$').unwrap_or(inner);
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    match n {
                        '.' | '[' => break,
                        '\\' => {
                            chars.next();
                            match chars.next() {
                                Some(escaped) => name.push(escaped),
                                None => return Err(err("dangling escape")),
                            }
                        }
                        _ => {
                            name.push(n);
                            chars.next();
                        }
                    }
                }
                match name.as_str() {
                    "" => return Err(err("empty field name")),
                    "*" => segments.push(Segment::Wildcard),
                    _ => segments.push(Segment::Field(name)),
                }
            }
            '[' => {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(b) => body.push(b),
                        None => return Err(err("unclosed bracket")),
                    }
                }
                let body = body.trim();
                if body == "*" {
                    segments.push(Segment::Wildcard);
                } else if let Some(quoted) = body
                    .strip_prefix('\'')
                    .and_then(|b| b.strip_suffix('\''))
                {
                    segments.push(Segment::Field(quoted.to_string()));
                } else {
                    let index = body
                        .parse::<usize>()
                        .map_err(|_| err("unsupported subscript"))?;
                    segments.push(Segment::Index(index));
                }
            }
            _ => return Err(err("expected `.` or `[`")),
        }
    }
    Ok(segments)
}
