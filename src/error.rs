use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::rules;

/// Field-level and general validation messages, serialized as
/// `{"field": ["msg", ...], "non_field_errors": [...]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub const NON_FIELD: &'static str = "non_field_errors";

    pub fn general(msg: impl Into<String>) -> Self {
        Self::field(Self::NON_FIELD, msg)
    }

    pub fn field(name: &str, msg: impl Into<String>) -> Self {
        let mut errs = Self::default();
        errs.add(name, msg);
        errs
    }

    pub fn add(&mut self, name: &str, msg: impl Into<String>) {
        self.0.entry(name.to_string()).or_default().push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was collected, the validation error otherwise.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, msgs) in &self.0 {
            for msg in msgs {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;
                if name == Self::NON_FIELD {
                    write!(f, "{msg}")?;
                } else {
                    write!(f, "{name}: {msg}")?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication credentials were not provided.")]
    Unauthenticated,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("Not found.")]
    NotFound,
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("database error: {0}")]
    Db(sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn general(msg: impl Into<String>) -> Self {
        ApiError::Validation(ValidationErrors::general(msg))
    }

    pub fn field(name: &str, msg: impl Into<String>) -> Self {
        ApiError::Validation(ValidationErrors::field(name, msg))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Db(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_check_violation() => {
                match db.constraint().and_then(constraint_violation) {
                    Some(errs) => ApiError::Validation(errs),
                    None => ApiError::Db(e),
                }
            }
            _ => ApiError::Db(e),
        }
    }
}

/// Storage constraints back the business rules; a violation that slipped
/// past the in-transaction checks reads the same as the rule itself.
fn constraint_violation(name: &str) -> Option<ValidationErrors> {
    let errs = match name {
        "users_username_key" => {
            ValidationErrors::field("username", "A user with that username already exists.")
        }
        "users_email_key" => ValidationErrors::general(rules::EMAIL_TAKEN),
        "courses_instructor_title_key" => ValidationErrors::general(rules::COURSE_TITLE_TAKEN),
        "courses_slug_key" => {
            ValidationErrors::field("title", "A course with this slug already exists.")
        }
        "contents_course_slug_key" => ValidationErrors::field(
            "title",
            "A lesson with this slug already exists in this course.",
        ),
        "enrollments_course_student_key" => ValidationErrors::general(rules::ALREADY_ENROLLED),
        "options_question_text_key" => ValidationErrors::general(rules::OPTION_EXISTS),
        "options_one_correct_idx" => ValidationErrors::general(rules::CORRECT_OPTION_EXISTS),
        "messages_sender_receiver_check" => ValidationErrors::general(rules::BAD_RECEIVER),
        _ => return None,
    };
    Some(errs)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(errs) => json!(errs),
            ApiError::Db(e) => {
                tracing::error!(error=%e, "database error");
                json!({ "detail": "Internal server error." })
            }
            ApiError::Internal(e) => {
                tracing::error!(error=%e, "internal error");
                json!({ "detail": "Internal server error." })
            }
            _ => json!({ "detail": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
