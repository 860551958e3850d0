//! Event-Stream Decoder
//!
//! Turns the body returned by the agent runtime's invoke endpoint into a
//! trace transcript, the final answer, and the citations the agent used.
//!
//! # Wire Format
//!
//! The body is an event stream: binary length-prefixed frames whose headers
//! and payloads are mostly JSON text. The decoder does not parse the framing.
//! It treats the body as text and relies on fixed markers:
//!
//! - frames are separated by the literal `:message-type`
//! - a frame carrying an answer chunk contains `bytes`, and the base64 value
//!   is the fourth `"`-delimited token of the frame text
//! - when the last frame carries no chunk, the answer sits in the trace under
//!   `finalResponse":`
//!
//! Chunks that are not valid UTF-8 on their own (framing bytes, CRCs) are
//! dropped one by one. Intermediate frames that fail to decode are noted in the
//! trace and otherwise ignored; only the last frame decides the answer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::metadata::{extract_citations, CitationRecord};

/// Literal separating frames in the decoded buffer
pub const MESSAGE_TYPE_MARKER: &str = ":message-type";

/// Marker present in frames that carry a base64 answer chunk
pub const PAYLOAD_MARKER: &str = "bytes";

/// Key preceding the fallback answer object
pub const FINAL_RESPONSE_KEY: &str = "finalResponse\":";

const FINAL_RESPONSE_TERMINATOR: &str = "\"}";

/// Zero-based index of the base64 value among `"`-delimited tokens
const PAYLOAD_TOKEN_INDEX: usize = 3;

/// Serialization leftovers the upstream service leaks into answers
const ANSWER_ARTIFACTS: [&str; 2] = ["{input:{value:", ",source:null}}"];

/// Result of decoding one agent response
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedResponse {
    /// Diagnostic transcript of the decode, not meant for end users
    pub trace: String,
    /// Cleaned answer text
    pub answer: String,
    /// Deduplicated citations in first-seen order
    pub citations: Vec<CitationRecord>,
}

/// Decode a complete agent response
///
/// `chunks` are the transport chunks in arrival order. Each chunk is decoded
/// as UTF-8 independently and skipped if that fails.
///
/// # Errors
///
/// - [`DecodeError::EmptyResponse`] if no text survives chunk decoding
/// - [`DecodeError::MalformedPayload`] if the answer cannot be located or
///   decoded from the last frame or the `finalResponse` fallback
pub fn decode<I, C>(chunks: I) -> Result<DecodedResponse, DecodeError>
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let (buffer, skipped_chunks) = accumulate(chunks);
    if buffer.is_empty() {
        tracing::warn!(skipped_chunks, "Agent response was empty after decoding");
        return Err(DecodeError::EmptyResponse);
    }

    let mut trace = Trace::default();
    trace.line(format!("Decoded response {buffer}"));
    if skipped_chunks > 0 {
        trace.line(format!("skipped {skipped_chunks} undecodable chunks"));
    }

    let segments: Vec<&str> = buffer.split(MESSAGE_TYPE_MARKER).collect();
    trace.line(format!("Split Response: {segments:?}"));
    trace.line(format!("length of split: {}", segments.len()));

    for (idx, segment) in segments.iter().enumerate() {
        if is_payload_bearing(segment) {
            match decode_payload(segment) {
                Ok(text) => trace.line(text),
                Err(e) => trace.line(format!("payload at index {idx} skipped: {e}")),
            }
        } else {
            trace.line(format!("no bytes at index {idx}"));
            trace.line(*segment);
        }
    }

    let citations = extract_citations(&segments);
    trace.line(format!("Extracted metadata_list: {citations:?}"));

    let last = segments.last().ok_or(DecodeError::EmptyResponse)?;
    trace.line(format!("Last Response: {last}"));

    let raw_answer = if is_payload_bearing(last) {
        trace.line("Bytes in last response");
        decode_payload(last)?
    } else {
        trace.line("no bytes in last response");
        final_response_text(&buffer)?
    };

    let answer = clean_answer(&raw_answer);

    tracing::debug!(
        segments = segments.len(),
        citations = citations.len(),
        skipped_chunks,
        answer_len = answer.len(),
        "Decoded agent response"
    );

    Ok(DecodedResponse {
        trace: trace.into_string(),
        answer,
        citations,
    })
}

/// Whether a frame carries a base64 answer chunk
#[must_use]
pub fn is_payload_bearing(segment: &str) -> bool {
    segment.contains(PAYLOAD_MARKER)
}

/// Remove quote characters and known upstream serialization artifacts
#[must_use]
pub fn clean_answer(raw: &str) -> String {
    let mut answer = raw.replace('"', "");
    for artifact in ANSWER_ARTIFACTS {
        answer = answer.replace(artifact, "");
    }
    answer
}

fn accumulate<I, C>(chunks: I) -> (String, usize)
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut buffer = String::new();
    let mut skipped = 0usize;

    for chunk in chunks {
        match std::str::from_utf8(chunk.as_ref()) {
            Ok(text) => buffer.push_str(text),
            Err(_) => skipped += 1,
        }
    }

    (buffer, skipped)
}

fn decode_payload(segment: &str) -> Result<String, DecodeError> {
    let encoded = segment.split('"').nth(PAYLOAD_TOKEN_INDEX).ok_or_else(|| {
        DecodeError::malformed("payload frame has fewer than four quoted tokens")
    })?;

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| DecodeError::malformed(format!("invalid base64 payload: {e}")))?;

    String::from_utf8(bytes)
        .map_err(|e| DecodeError::malformed(format!("payload is not UTF-8: {e}")))
}

/// Locate the fallback answer under `finalResponse":`
///
/// The candidate runs from just after the key through the next `"}`. Its first
/// JSON value is either an object with a `text` string or a bare string.
fn final_response_text(buffer: &str) -> Result<String, DecodeError> {
    let start = buffer
        .find(FINAL_RESPONSE_KEY)
        .ok_or_else(|| DecodeError::malformed("no payload frame and no finalResponse field"))?
        + FINAL_RESPONSE_KEY.len();
    let rest = &buffer[start..];

    let end = rest
        .find(FINAL_RESPONSE_TERMINATOR)
        .ok_or_else(|| DecodeError::malformed("unterminated finalResponse field"))?
        + FINAL_RESPONSE_TERMINATOR.len();
    let candidate = &rest[..end];

    let value = serde_json::Deserializer::from_str(candidate)
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| DecodeError::malformed("empty finalResponse field"))?
        .map_err(|e| DecodeError::malformed(format!("finalResponse is not JSON: {e}")))?;

    match value {
        Value::String(text) => Ok(text),
        Value::Object(mut fields) => match fields.remove("text") {
            Some(Value::String(text)) => Ok(text),
            _ => Err(DecodeError::malformed("finalResponse has no text field")),
        },
        _ => Err(DecodeError::malformed("finalResponse is neither object nor string")),
    }
}

#[derive(Default)]
struct Trace(String);

impl Trace {
    fn line(&mut self, text: impl AsRef<str>) {
        self.0.push_str(text.as_ref());
        self.0.push('\n');
    }

    fn into_string(self) -> String {
        self.0
    }
}
