//! `Content-Type` and `Accept` checks run before any route handler.
//!
//! Clients are free to omit both headers. When they are present they
//! are interpreted following RFC 7231: wildcards in `Accept`, `q=0`
//! as an explicit refusal, and no parameters besides `charset=utf-8`
//! on request bodies.

use rouille::{Request, Response};

use crate::http::{envelope::MEDIA_TYPE, error::ApiError};

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MediaType {
    pub main: String,
    pub sub: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MediaTypeError {
    InvalidType,
    InvalidParameter,
    DuplicateParameter,
}

impl MediaType {
    /// Parses `type/subtype *(";" name=value)`.
    ///
    /// Type, subtype and parameter names are lowercased, parameter values
    /// keep their case. Values may be tokens or quoted strings.
    pub fn parse(s: &str) -> Result<Self, MediaTypeError> {
        let (full_type, mut rest) = s.split_once(';').unwrap_or((s, ""));

        let (main, sub) = full_type
            .trim()
            .split_once('/')
            .ok_or(MediaTypeError::InvalidType)?;
        if !is_token(main) || !is_token(sub) {
            return Err(MediaTypeError::InvalidType);
        }

        let mut params: Vec<(String, String)> = Vec::new();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            let (name, value, remaining) = parse_param(rest)?;
            if params.iter().any(|(n, _)| *n == name) {
                return Err(MediaTypeError::DuplicateParameter);
            }
            params.push((name, value));

            rest = match remaining.trim_start() {
                "" => "",
                r => r.strip_prefix(';').ok_or(MediaTypeError::InvalidParameter)?,
            };
        }

        Ok(Self {
            main: main.to_ascii_lowercase(),
            sub: sub.to_ascii_lowercase(),
            params,
        })
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parses one `name=value` pair and returns the input after it
fn parse_param(s: &str) -> Result<(String, String, &str), MediaTypeError> {
    let (name, rest) = s.split_once('=').ok_or(MediaTypeError::InvalidParameter)?;
    let name = name.trim_end();
    if !is_token(name) {
        return Err(MediaTypeError::InvalidParameter);
    }

    let rest = rest.trim_start();
    let (value, rest) = match rest.strip_prefix('"') {
        Some(quoted) => parse_quoted(quoted)?,
        None => {
            let end = rest.find(|c| !is_token_char(c)).unwrap_or(rest.len());
            if end == 0 {
                return Err(MediaTypeError::InvalidParameter);
            }
            (rest[..end].to_string(), &rest[end..])
        }
    };

    Ok((name.to_ascii_lowercase(), value, rest))
}

/// Reads a quoted string whose opening quote was already consumed
fn parse_quoted(s: &str) -> Result<(String, &str), MediaTypeError> {
    let mut value = String::new();
    let mut chars = s.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &s[i + 1..])),
            '\\' => {
                let (_, escaped) = chars.next().ok_or(MediaTypeError::InvalidParameter)?;
                value.push(escaped);
            }
            c => value.push(c),
        }
    }
    Err(MediaTypeError::InvalidParameter)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?=".contains(c)
}

/// Checks `Content-Type` of body carrying requests.
///
/// Returns the error response to send, if the request has to be refused.
pub fn check_content_type(request: &Request) -> Option<Response> {
    if !has_content_body(request.method()) {
        return None;
    }

    let content_type = request.header("Content-Type")?;
    if content_type_is_supported(content_type, MEDIA_TYPE) {
        return None;
    }

    Some(
        ApiError::UnsupportedMediaType {
            content_type: content_type.to_string(),
            accept_header: accept_header_for_method(request.method()),
        }
        .into_response(),
    )
}

/// Checks the `Accept` header of any request.
///
/// Returns the error response to send, if the request has to be refused.
pub fn check_accept(request: &Request) -> Option<Response> {
    let accept = request.header("Accept")?;
    if accepts(accept, MEDIA_TYPE) {
        return None;
    }

    Some(ApiError::NotAcceptable.into_response())
}

pub(crate) fn content_type_is_supported(content_type: &str, supported: &str) -> bool {
    if content_type.is_empty() {
        return true;
    }

    let Ok(media_type) = MediaType::parse(content_type) else {
        return false;
    };
    if format!("{}/{}", media_type.main, media_type.sub) != supported {
        return false;
    }

    match media_type.params.as_slice() {
        [] => true,
        [(name, value)] => name == "charset" && value == "utf-8",
        _ => false,
    }
}

pub(crate) fn accepts(accept: &str, supported: &str) -> bool {
    if accept.is_empty() {
        return true;
    }

    let (sup_main, sup_sub) = supported.split_once('/').unwrap_or((supported, ""));

    accept.split(',').any(|candidate| {
        let Ok(range) = MediaType::parse(candidate) else {
            return false;
        };

        if !range.params.is_empty() {
            // q is the only parameter a candidate may carry
            let Some(q) = range.param("q").filter(|_| range.params.len() == 1) else {
                return false;
            };
            match q.parse::<f64>() {
                Ok(q) if q != 0.0 => {}
                _ => return false,
            }
        }

        (range.main == sup_main || range.main == "*") && (range.sub == sup_sub || range.sub == "*")
    })
}

fn has_content_body(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH")
}

fn accept_header_for_method(method: &str) -> Option<&'static str> {
    match method {
        "POST" => Some("Accept-Post"),
        "PATCH" => Some("Accept-Patch"),
        _ => None,
    }
}
