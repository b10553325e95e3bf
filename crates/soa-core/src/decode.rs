//! Defensive JSON decoding of raw model responses.
//!
//! Three escalating layers, each tried only when the previous one fails:
//!
//! 1. Parse the response as-is.
//! 2. Strip markdown code fences and surrounding prose, drop trailing
//!    commas before `}`/`]`, and parse again.
//! 3. Scan for the first balanced `{...}` span that parses after the same
//!    comma repair.
//!
//! The decoder only repairs syntactic wrapping. It never invents values.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)(?:```|\z)").expect("Invalid fence regex")
});

/// Upper bound on `{` start positions tried by the extraction layer.
const MAX_EXTRACTION_CANDIDATES: usize = 64;

/// Repair layer that produced (or failed to produce) a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeLayer {
    Direct,
    Cleaned,
    Extracted,
}

impl fmt::Display for DecodeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Direct => "direct parse",
            Self::Cleaned => "fence/prose cleanup",
            Self::Extracted => "object extraction",
        })
    }
}

/// Error reported by one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerError {
    pub layer: DecodeLayer,
    pub message: String,
}

/// The raw text could not be coerced into JSON by any layer.
#[derive(Debug, Clone, Error)]
#[error("response is not valid JSON after {} repair layers", .attempts.len())]
pub struct DecodeFailure {
    /// The response exactly as received.
    pub raw: String,
    pub attempts: Vec<LayerError>,
}

/// A successfully decoded response and the layer that decoded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub layer: DecodeLayer,
}

/// Decode a raw model response into a JSON value.
pub fn decode(raw: &str) -> Result<Value, DecodeFailure> {
    decode_with_layer(raw).map(|decoded| decoded.value)
}

/// Decode a raw response, reporting which layer succeeded.
pub fn decode_with_layer(raw: &str) -> Result<Decoded, DecodeFailure> {
    let mut attempts = Vec::new();

    match serde_json::from_str::<Value>(raw) {
        Ok(value) => {
            return Ok(Decoded {
                value,
                layer: DecodeLayer::Direct,
            });
        }
        Err(error) => attempts.push(LayerError {
            layer: DecodeLayer::Direct,
            message: error.to_string(),
        }),
    }

    match strip_wrapping(raw) {
        Some(cleaned) => match serde_json::from_str::<Value>(&remove_trailing_commas(cleaned)) {
            Ok(value) => {
                debug!(layer = %DecodeLayer::Cleaned, "decoded response after cleanup");
                return Ok(Decoded {
                    value,
                    layer: DecodeLayer::Cleaned,
                });
            }
            Err(error) => attempts.push(LayerError {
                layer: DecodeLayer::Cleaned,
                message: error.to_string(),
            }),
        },
        None => attempts.push(LayerError {
            layer: DecodeLayer::Cleaned,
            message: "no JSON object or array found".to_string(),
        }),
    }

    let mut last_error = "no balanced object found".to_string();
    for span in balanced_object_spans(raw) {
        match serde_json::from_str::<Value>(&remove_trailing_commas(span)) {
            Ok(value) => {
                debug!(layer = %DecodeLayer::Extracted, "decoded response from embedded object");
                return Ok(Decoded {
                    value,
                    layer: DecodeLayer::Extracted,
                });
            }
            Err(error) => last_error = error.to_string(),
        }
    }
    attempts.push(LayerError {
        layer: DecodeLayer::Extracted,
        message: last_error,
    });

    Err(DecodeFailure {
        raw: raw.to_string(),
        attempts,
    })
}

/// Remove code fences and the prose around the outermost JSON container.
fn strip_wrapping(raw: &str) -> Option<&str> {
    let body = CODE_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());
    let start = body.find(['{', '['])?;
    let closer = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(closer)?;
    if end < start {
        return None;
    }
    Some(&body[start..=end])
}

/// Drop commas that directly precede `}` or `]`, ignoring string contents.
pub fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Iterate over balanced `{...}` spans in start order.
///
/// Only the first [`MAX_EXTRACTION_CANDIDATES`] `{` positions are tried,
/// balanced or not.
fn balanced_object_spans(raw: &str) -> impl Iterator<Item = &str> {
    raw.match_indices('{')
        .take(MAX_EXTRACTION_CANDIDATES)
        .filter_map(move |(start, _)| balanced_end(&raw[start..]).map(|end| &raw[start..start + end]))
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}
