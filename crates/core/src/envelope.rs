//! The uniform JSON response wrapper every Atelier endpoint returns.
//!
//! ```json
//! {
//!   "status":  { "errors": [], "summary": "" },
//!   "console": ["", "Compiling class Foo"],
//!   "result":  { "status": "", "content": [...], "enc": false }
//! }
//! ```
//!
//! After [`ResponseEnvelope::decode_content`], `result.enc` is always `false`
//! and base64 payloads have been replaced by raw bytes.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::AtelierError;

/// Decoder for fragment sequences: padding is optional per padded run.
const FRAGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// `status` block of the envelope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvelopeStatus {
    /// Combined error text; empty on success.
    pub summary: String,
    /// Structured error entries (`{error, code, domain, id, params}`).
    pub errors: Vec<Value>,
}

/// Payload of `result.content`.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Content as the server sent it.
    Json(Value),
    /// Decoded base64 payload of an `enc: true` result.
    Binary(Vec<u8>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Json(Value::Null)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Content::Json)
    }
}

impl Content {
    /// Returns the JSON payload, or `None` for binary content.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Binary(_) => None,
        }
    }

    /// Returns the decoded bytes, or `None` for JSON content.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            Self::Json(_) => None,
        }
    }
}

/// `result` block of the envelope.
///
/// Document endpoints put their metadata (`name`, `ts`, `cat`, `db`, ...)
/// next to `status`/`content`/`enc`; those fields are kept in [`Self::extra`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnvelopeResult {
    /// Per-result error text; non-empty means the call failed.
    #[serde(default)]
    pub status: String,
    /// The payload.
    #[serde(default)]
    pub content: Content,
    /// `true` while `content` is still a list of base64 fragments.
    #[serde(default)]
    pub enc: bool,
    /// Every other field of the result object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parsed response body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponseEnvelope {
    /// Overall status.
    pub status: EnvelopeStatus,
    /// Server console output produced while handling the request.
    pub console: Vec<String>,
    /// Result payload.
    pub result: EnvelopeResult,
}

/// Which envelope field reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSource {
    /// `result.status` was non-empty.
    ResultStatus,
    /// `status.summary` was non-empty.
    Summary,
}

/// An envelope-level failure found by [`ResponseEnvelope::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeFailure {
    /// Field the message came from.
    pub source: FailureSource,
    /// Server-supplied message.
    pub message: String,
}

impl From<EnvelopeFailure> for AtelierError {
    fn from(failure: EnvelopeFailure) -> Self {
        AtelierError::Protocol {
            message: failure.message,
        }
    }
}

impl ResponseEnvelope {
    /// Parses a response body.
    pub fn from_body(body: &str) -> Result<Self, AtelierError> {
        serde_json::from_str(body).map_err(|e| AtelierError::InvalidResponse {
            message: format!("body is not an Atelier envelope: {e}"),
        })
    }

    /// Builds an envelope whose only content is `value`.
    pub fn with_content(value: Value) -> Self {
        Self {
            result: EnvelopeResult {
                content: Content::Json(value),
                ..EnvelopeResult::default()
            },
            ..Self::default()
        }
    }

    /// Replaces base64 fragment content with the decoded bytes and clears
    /// `enc`. Does nothing when `enc` is already `false`.
    pub fn decode_content(&mut self) -> Result<(), AtelierError> {
        if !self.result.enc {
            return Ok(());
        }
        let bytes = {
            let fragments = match &self.result.content {
                Content::Json(Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        item.as_str().ok_or_else(|| AtelierError::InvalidResponse {
                            message: "encoded content fragment is not a string".to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Content::Json(Value::String(single)) => vec![single.as_str()],
                Content::Json(Value::Null) => Vec::new(),
                Content::Json(_) => {
                    return Err(AtelierError::InvalidResponse {
                        message: "encoded content is not a list of fragments".to_string(),
                    })
                }
                Content::Binary(_) => return Ok(()),
            };
            decode_fragments(&fragments)?
        };
        self.result.content = Content::Binary(bytes);
        self.result.enc = false;
        Ok(())
    }

    /// Returns `true` when the payload is an internal studio-action response,
    /// recognised by an `action` field on the first content element.
    pub fn is_studio_action(&self) -> bool {
        match &self.result.content {
            Content::Json(Value::Array(items)) => items
                .first()
                .and_then(Value::as_object)
                .is_some_and(|first| first.contains_key("action")),
            _ => false,
        }
    }

    /// Console lines worth showing (the server pads output with blank lines).
    pub fn console_lines(&self) -> impl Iterator<Item = &str> {
        self.console
            .iter()
            .map(String::as_str)
            .filter(|line| !line.is_empty())
    }

    /// Decides whether the envelope reports success.
    ///
    /// `result.status` takes precedence over `status.summary`.
    pub fn classify(&self) -> Result<(), EnvelopeFailure> {
        if !self.result.status.is_empty() {
            return Err(EnvelopeFailure {
                source: FailureSource::ResultStatus,
                message: self.result.status.clone(),
            });
        }
        if !self.status.summary.is_empty() {
            return Err(EnvelopeFailure {
                source: FailureSource::Summary,
                message: self.status.summary.clone(),
            });
        }
        Ok(())
    }
}

/// Concatenates base64 fragments and decodes them in one pass.
///
/// A fragment may carry its own `=` padding; each padded run is decoded as a
/// complete quantum so the concatenation still yields the original bytes.
pub fn decode_fragments<S: AsRef<str>>(fragments: &[S]) -> Result<Vec<u8>, AtelierError> {
    let joined: String = fragments
        .iter()
        .flat_map(|f| f.as_ref().chars())
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let mut decoded = Vec::with_capacity(joined.len() / 4 * 3);
    let mut rest = joined.as_str();
    while !rest.is_empty() {
        let end = match rest.find('=') {
            Some(pad) => pad + rest[pad..].bytes().take_while(|b| *b == b'=').count(),
            None => rest.len(),
        };
        let (chunk, tail) = rest.split_at(end);
        FRAGMENT_ENGINE
            .decode_vec(chunk, &mut decoded)
            .map_err(|e| AtelierError::InvalidResponse {
                message: format!("invalid base64 content: {e}"),
            })?;
        rest = tail;
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> ResponseEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn padded_fragments_decode_to_concatenated_bytes() {
        let mut env = envelope(json!({
            "status": {"errors": [], "summary": ""},
            "console": [],
            "result": {"status": "", "enc": true, "content": ["QQ==", "QQ=="]}
        }));
        env.decode_content().unwrap();
        assert_eq!(env.result.content.as_bytes(), Some(&b"AA"[..]));
        assert!(!env.result.enc);
    }

    #[test]
    fn unpadded_fragments_decode_as_one_stream() {
        // "hello world" split across fragment boundaries.
        let bytes = decode_fragments(&["aGVsbG8g", "d29y", "bGQ="]).unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn plain_content_is_left_alone() {
        let mut env = envelope(json!({"result": {"content": ["line 1"]}}));
        env.decode_content().unwrap();
        assert_eq!(env.result.content.as_json(), Some(&json!(["line 1"])));
    }

    #[test]
    fn invalid_base64_is_an_invalid_response() {
        let mut env = envelope(json!({"result": {"enc": true, "content": ["@@@@"]}}));
        assert!(matches!(
            env.decode_content(),
            Err(AtelierError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn document_metadata_survives_in_extra() {
        let env = envelope(json!({
            "result": {"name": "Foo.cls", "ts": "2024-01-02 03:04:05.678", "content": []}
        }));
        assert_eq!(env.result.extra.get("name"), Some(&json!("Foo.cls")));
        assert!(!env.result.extra.contains_key("content"));
    }

    #[test]
    fn result_status_wins_over_summary() {
        let env = envelope(json!({
            "status": {"summary": "summary text"},
            "result": {"status": "result text"}
        }));
        let failure = env.classify().unwrap_err();
        assert_eq!(failure.source, FailureSource::ResultStatus);
        assert_eq!(failure.message, "result text");

        let env = envelope(json!({"status": {"summary": "only summary"}}));
        assert_eq!(env.classify().unwrap_err().source, FailureSource::Summary);
        assert!(envelope(json!({})).classify().is_ok());
    }

    #[test]
    fn studio_actions_are_detected_from_first_element() {
        let env = envelope(json!({"result": {"content": [{"action": 2, "target": "x"}]}}));
        assert!(env.is_studio_action());
        let env = envelope(json!({"result": {"content": [{"name": "Foo.cls"}]}}));
        assert!(!env.is_studio_action());
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(matches!(
            ResponseEnvelope::from_body("<html>"),
            Err(AtelierError::InvalidResponse { .. })
        ));
    }
}
