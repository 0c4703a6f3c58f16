//! `Json` and `Path` extractors whose rejections use the API error envelope.

use axum::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ValidationErrors};

/// JSON request body or response. A body that fails to deserialize is a
/// `400` naming the offending field.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let axum::Json(value) = axum::Json::<Value>::from_request(req, state).await?;
        let parsed = serde_path_to_error::deserialize(value).map_err(body_errors)?;
        Ok(Json(parsed))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::general(rejection.body_text())
    }
}

fn body_errors(err: serde_path_to_error::Error<serde_json::Error>) -> ApiError {
    let path = err.path().to_string();
    let msg = err.inner().to_string();
    let errs = match (missing_field(&msg), path.as_str()) {
        (Some(name), ".") => ValidationErrors::field(name, "This field is required."),
        (Some(name), parent) => {
            ValidationErrors::field(&format!("{parent}.{name}"), "This field is required.")
        }
        (None, ".") => ValidationErrors::general(msg),
        (None, field) => ValidationErrors::field(field, msg),
    };
    ApiError::Validation(errs)
}

// serde reports absent fields as "missing field `name`".
fn missing_field(msg: &str) -> Option<&str> {
    msg.strip_prefix("missing field `")?.split('`').next()
}

/// Path parameters. Segments that don't parse (a non-numeric id) name no
/// resource, so they read as `404`.
pub struct Path<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Path<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ApiError> {
        let axum::extract::Path(params) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Path(params))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(_) => ApiError::NotFound,
            other => ApiError::Internal(other.body_text()),
        }
    }
}
