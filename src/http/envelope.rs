//! JSON envelope used by every response and request body.
//!
//! Success bodies look like `{"data": ...}`, failures like
//! `{"errors": [{"status": "404", "title": ..., "detail": ..., "source": ...}]}`.
//! Exactly one of the two keys is present in a response.

use std::io::Read;

use log::error;
use rouille::Response;
use serde::{Deserialize, Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Value, error::Category};
use thiserror::Error;

/// The only media type the API produces and consumes
pub const MEDIA_TYPE: &str = "application/json";

const INTERNAL_ERROR_BODY: &str =
    r#"{"errors":[{"status":"500","title":"Internal server error"}]}"#;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    errors: [&'a ErrorInfo; 1],
}

/// A single entry of the `errors` array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    #[serde(serialize_with = "status_as_string")]
    pub status: u16,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

/// Points at the request header that caused an error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSource {
    pub header: String,
}

fn status_as_string<S: Serializer>(status: &u16, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(status)
}

/// Builds a `{"data": ...}` response with the given status
pub fn data_response<T: Serialize>(data: &T, status: u16) -> Response {
    match serde_json::to_vec(&DataEnvelope { data }) {
        Ok(body) => json_response(body, status),
        Err(e) => {
            error!("failed to encode response data: {e}");
            internal_error_response()
        }
    }
}

/// Builds a `{"errors": [...]}` response; the status comes from the error itself
pub fn error_response(info: &ErrorInfo) -> Response {
    match serde_json::to_vec(&ErrorEnvelope { errors: [info] }) {
        Ok(body) => json_response(body, info.status),
        Err(e) => {
            error!("failed to encode error response: {e}");
            internal_error_response()
        }
    }
}

fn internal_error_response() -> Response {
    json_response(INTERNAL_ERROR_BODY, 500)
}

fn json_response(body: impl Into<Vec<u8>>, status: u16) -> Response {
    Response::from_data(MEDIA_TYPE, body).with_status_code(status)
}

/// Reasons a request body could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The client sent something that is not a valid request body
    #[error(transparent)]
    Malformed(#[from] ParseError),

    /// The body could not be read; nothing the client can fix
    #[error("failed to read request body: {0}")]
    Read(#[source] std::io::Error),
}

/// Human readable description of a malformed request body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(String);

impl ParseError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Decodes a `{"data": T}` request body.
///
/// The body must hold exactly one JSON object; unknown fields are
/// rejected at every level.
pub fn decode_data<T: DeserializeOwned>(mut reader: impl Read) -> Result<T, DecodeError> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body).map_err(DecodeError::Read)?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::new("The request body must not be empty").into());
    }

    let mut de = serde_json::Deserializer::from_slice(&body);
    let value = Value::deserialize(&mut de).map_err(describe_syntax_error)?;
    de.end()
        .map_err(|_| ParseError::new("The request body must contain a single JSON object"))?;

    if !value.is_object() {
        return Err(ParseError::new("The root element of the request body is invalid").into());
    }

    let envelope: DataEnvelope<T> = serde_path_to_error::deserialize(value).map_err(|e| {
        let field = e.path().iter().next().map(|_| e.path().to_string());
        describe_data_error(e.inner(), field.as_deref())
    })?;
    Ok(envelope.data)
}

fn describe_syntax_error(err: serde_json::Error) -> DecodeError {
    let msg = match err.classify() {
        Category::Eof => "The request body contains invalid JSON content".to_string(),
        Category::Syntax => format!(
            "The request body has a syntax error at line {}, column {}",
            err.line(),
            err.column()
        ),
        Category::Data => describe_data_error(&err, None).0,
        Category::Io => return DecodeError::Read(err.into()),
    };
    ParseError::new(msg).into()
}

/// `field` is the dotted path of the offending value, when known
fn describe_data_error(err: &serde_json::Error, field: Option<&str>) -> ParseError {
    let msg = err.to_string();

    if let Some(field) = quoted_name_after(&msg, "unknown field ") {
        return ParseError::new(format!(
            "The request body contains an unknown field '{field}'"
        ));
    }
    if let Some(field) = quoted_name_after(&msg, "missing field ") {
        return ParseError::new(format!(
            "The request body is missing the required field '{field}'"
        ));
    }
    match field {
        Some(field) => ParseError::new(format!(
            "The request body contains an invalid value for the field '{field}': {msg}"
        )),
        None => ParseError::new(format!("The request body contains an invalid value: {msg}")),
    }
}

/// Extracts `name` from serde messages shaped like "<prefix>`name`..."
fn quoted_name_after<'a>(msg: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = msg.strip_prefix(prefix)?.strip_prefix('`')?;
    rest.split_once('`').map(|(name, _)| name)
}
