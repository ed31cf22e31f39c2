use std::sync::Arc;

use log::error;
use rouille::{Request, Response};

use crate::{
    domain::track::{TrackAttrs, TrackId},
    http::{
        envelope::{self, DecodeError},
        error::ApiError,
        middleware::{self, RequestId, RequestIds},
        negotiate,
    },
    storage::{TrackStore, error::StoreError},
};

const TRACKS_PATH: &str = "/tracks";

/// The tracks API: middleware chain plus route handlers.
///
/// Handlers are stateless; everything that outlives a request lives in
/// the store.
pub struct Api {
    store: Arc<dyn TrackStore>,
    request_ids: RequestIds,
}

impl Api {
    pub fn new(store: Arc<dyn TrackStore>) -> Self {
        Self {
            store,
            request_ids: RequestIds::new(),
        }
    }

    pub fn handle_request(&self, request: &Request) -> Response {
        let id = self.request_ids.next();

        middleware::log_request(id, request, || {
            middleware::recover_panics(id, || {
                if let Some(refused) = negotiate::check_content_type(request) {
                    return refused;
                }
                if let Some(refused) = negotiate::check_accept(request) {
                    return refused;
                }
                self.route(id, request)
            })
        })
    }

    fn route(&self, req_id: RequestId, request: &Request) -> Response {
        let result = rouille::router!(request,
            (GET) (/tracks) => {
                self.list_tracks(req_id)
            },
            (POST) (/tracks) => {
                self.create_track(req_id, request)
            },
            (GET) (/tracks/{id: String}) => {
                self.get_track(req_id, request, &id)
            },
            (DELETE) (/tracks/{id: String}) => {
                self.delete_track(req_id, request, &id)
            },
            _ => Err(Self::unrouted(request))
        );

        result.unwrap_or_else(ApiError::into_response)
    }

    fn list_tracks(&self, req_id: RequestId) -> Result<Response, ApiError> {
        let tracks = self
            .store
            .list()
            .map_err(|e| Self::storage_error(req_id, "read tracks", e))?;

        Ok(envelope::data_response(&tracks, 200))
    }

    fn get_track(&self, req_id: RequestId, request: &Request, id: &str) -> Result<Response, ApiError> {
        // a malformed ID is reported exactly like an unknown one
        let id: TrackId = id.parse().map_err(|_| ApiError::not_found(request.url()))?;

        let track = self.store.get(id).map_err(|e| match e {
            StoreError::TrackNotFound(_) => ApiError::not_found(request.url()),
            e => Self::storage_error(req_id, "read track", e),
        })?;

        Ok(envelope::data_response(&track, 200))
    }

    fn create_track(&self, req_id: RequestId, request: &Request) -> Result<Response, ApiError> {
        let Some(body) = request.data() else {
            error!("[{req_id}] request body was already consumed");
            return Err(ApiError::Internal);
        };

        let attrs: TrackAttrs = envelope::decode_data(body).map_err(|e| match e {
            DecodeError::Malformed(e) => ApiError::from(e),
            DecodeError::Read(e) => {
                error!("[{req_id}] failed to read the request body: {e}");
                ApiError::Internal
            }
        })?;

        let track = self
            .store
            .create(attrs)
            .map_err(|e| Self::storage_error(req_id, "save track", e))?;

        let location = format!("{}/{}", request.url().trim_end_matches('/'), track.id);
        Ok(envelope::data_response(&track, 201).with_unique_header("Location", location))
    }

    fn delete_track(&self, req_id: RequestId, request: &Request, id: &str) -> Result<Response, ApiError> {
        let id: TrackId = id.parse().map_err(|_| ApiError::not_found(request.url()))?;

        self.store.delete(id).map_err(|e| match e {
            StoreError::TrackNotFound(_) => ApiError::not_found(request.url()),
            e => Self::storage_error(req_id, "delete track", e),
        })?;

        Ok(Response::empty_204())
    }

    /// 405 for known resources with an unsupported method, 404 otherwise
    fn unrouted(request: &Request) -> ApiError {
        match allowed_methods(&request.url()) {
            Some(allow) => ApiError::MethodNotAllowed {
                method: request.method().to_string(),
                allow,
            },
            None => ApiError::not_found(request.url()),
        }
    }

    fn storage_error(req_id: RequestId, action: &str, err: StoreError) -> ApiError {
        error!("[{req_id}] failed to {action} in storage: {err}");
        ApiError::Internal
    }
}

/// Methods served under `path`, formatted for the `Allow` header
fn allowed_methods(path: &str) -> Option<&'static str> {
    let rest = path.strip_prefix(TRACKS_PATH)?;

    match rest.strip_prefix('/') {
        None if rest.is_empty() => Some("GET, POST"),
        Some(id) if !id.is_empty() && !id.contains('/') => Some("GET, DELETE"),
        _ => None,
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
