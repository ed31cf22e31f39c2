use rouille::Response;

use crate::http::envelope::{self, ErrorInfo, ErrorSource, MEDIA_TYPE, ParseError};

/// Failures as they are reported to API clients.
///
/// Internal details never make it into a response; callers log them
/// before turning them into [`ApiError::Internal`].
#[derive(Debug)]
pub enum ApiError {
    NotFound {
        path: String,
    },
    MethodNotAllowed {
        method: String,
        allow: &'static str,
    },
    MalformedBody(ParseError),
    NotAcceptable,
    UnsupportedMediaType {
        content_type: String,
        accept_header: Option<&'static str>,
    },
    Internal,
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        ApiError::MalformedBody(err)
    }
}

impl ApiError {
    pub fn not_found(path: impl Into<String>) -> Self {
        ApiError::NotFound { path: path.into() }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::MethodNotAllowed { .. } => 405,
            ApiError::MalformedBody(_) => 400,
            ApiError::NotAcceptable => 406,
            ApiError::UnsupportedMediaType { .. } => 415,
            ApiError::Internal => 500,
        }
    }

    fn info(&self) -> ErrorInfo {
        let (title, detail, header) = match self {
            ApiError::NotFound { path } => (
                "Resource not found",
                Some(format!(
                    "The requested path '{path}' does not refer to a valid resource"
                )),
                None,
            ),
            ApiError::MethodNotAllowed { method, .. } => (
                "Method not allowed",
                Some(format!(
                    "The requested resource does not support a method '{method}'"
                )),
                None,
            ),
            ApiError::MalformedBody(err) => {
                ("The request body is malformed", Some(err.to_string()), None)
            }
            ApiError::NotAcceptable => (
                "Media type is not acceptable",
                Some(format!("The only acceptable media type is '{MEDIA_TYPE}'")),
                Some("Accept"),
            ),
            ApiError::UnsupportedMediaType { content_type, .. } => (
                "Media type is unsupported",
                Some(format!(
                    "Unexpected content type '{content_type}', only '{MEDIA_TYPE}' is allowed"
                )),
                Some("Content-Type"),
            ),
            ApiError::Internal => ("Internal server error", None, None),
        };

        ErrorInfo {
            status: self.status_code(),
            title: title.to_string(),
            detail,
            source: header.map(|h| ErrorSource {
                header: h.to_string(),
            }),
        }
    }

    pub fn into_response(self) -> Response {
        let response = envelope::error_response(&self.info());

        match self {
            ApiError::MethodNotAllowed { allow, .. } => {
                response.with_unique_header("Allow", allow)
            }
            ApiError::UnsupportedMediaType {
                accept_header: Some(header),
                ..
            } => response.with_unique_header(header, MEDIA_TYPE),
            _ => response,
        }
    }
}
