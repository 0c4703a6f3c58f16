use axum::{
    routing::{get, post},
    Router,
};

use crate::db::Db;
use crate::error::ApiError;
use crate::models::Course;
use crate::policy::{CourseAccess, Principal};
use crate::store;

mod accounts;
mod assessments;
mod courses;
mod extract;
mod instructors;
mod messages;

pub(crate) use extract::{Json, Path};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub token_ttl_hours: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // identity
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/logout", post(accounts::logout))
        // instructor profiles
        .route("/instructors", get(instructors::list).post(instructors::create))
        .route(
            "/instructors/:username",
            get(instructors::retrieve)
                .put(instructors::update)
                .patch(instructors::partial_update)
                .delete(instructors::destroy),
        )
        // courses
        .route("/courses", get(courses::list).post(courses::create))
        .route(
            "/courses/:slug",
            get(courses::retrieve)
                .put(courses::update)
                .patch(courses::partial_update)
                .delete(courses::destroy),
        )
        .route(
            "/:course_slug/enrollments",
            get(courses::list_enrollments).post(courses::enroll),
        )
        .route(
            "/:course_slug/lessons",
            get(courses::list_lessons).post(courses::create_lesson),
        )
        .route(
            "/:course_slug/lessons/:slug",
            get(courses::retrieve_lesson)
                .put(courses::update_lesson)
                .patch(courses::partial_update_lesson)
                .delete(courses::destroy_lesson),
        )
        // assessments, questions, options
        .route(
            "/:course_slug/assessments/:content_slug",
            get(assessments::list).post(assessments::create),
        )
        .route(
            "/:course_slug/assessments/:content_slug/:id",
            get(assessments::retrieve)
                .put(assessments::update)
                .patch(assessments::partial_update)
                .delete(assessments::destroy),
        )
        .route(
            "/:course_slug/:assessment/questions",
            get(assessments::list_questions).post(assessments::create_question),
        )
        .route(
            "/:course_slug/:assessment/questions/:id",
            get(assessments::retrieve_question)
                .put(assessments::update_question)
                .patch(assessments::partial_update_question)
                .delete(assessments::destroy_question),
        )
        .route(
            "/:course_slug/:assessment/:question/options",
            get(assessments::list_options).post(assessments::create_option),
        )
        .route(
            "/:course_slug/:assessment/:question/options/:id",
            get(assessments::retrieve_option)
                .put(assessments::update_option)
                .patch(assessments::partial_update_option)
                .delete(assessments::destroy_option),
        )
        // messages
        .route(
            "/:course_slug/messages",
            get(messages::list).post(messages::create),
        )
        .route(
            "/:course_slug/messages/:id",
            get(messages::retrieve)
                .put(messages::update)
                .patch(messages::partial_update)
                .delete(messages::destroy),
        )
        .fallback(|| async { ApiError::NotFound })
        .with_state(state)
}

/// A course resolved from the path, with the caller's standing in it.
pub(crate) struct CourseCtx {
    pub course: Course,
    pub access: CourseAccess,
}

pub(crate) async fn course_ctx(db: &Db, slug: &str, p: &Principal) -> Result<CourseCtx, ApiError> {
    let course = store::course_by_slug(db, slug)
        .await?
        .ok_or(ApiError::NotFound)?;
    let access = store::course_access(db, &course, p).await?;
    Ok(CourseCtx { course, access })
}

/// Parses path segments of the form `<tag>-<id>`, e.g. `assessment-12`.
pub(crate) fn tagged_id(segment: &str, tag: &str) -> Result<i64, ApiError> {
    segment
        .strip_prefix(tag)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    // Nothing below reaches the database; the pool never connects.
    fn app() -> Router {
        let db = PgPoolOptions::new()
            .connect_lazy("postgres://learnhub@localhost/unused")
            .unwrap();
        router(AppState {
            db,
            token_ttl_hours: 10,
        })
    }

    async fn send(req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn tagged_segments() {
        assert_eq!(tagged_id("assessment-12", "assessment").unwrap(), 12);
        assert_eq!(tagged_id("question-3", "question").unwrap(), 3);
        assert!(tagged_id("assessment-", "assessment").is_err());
        assert!(tagged_id("assessment-1x", "assessment").is_err());
        assert!(tagged_id("assessment-+1", "assessment").is_err());
        assert!(tagged_id("question-3", "assessment").is_err());
        assert!(tagged_id("assessments", "assessment").is_err());
    }

    #[tokio::test]
    async fn anonymous_course_creation_is_unauthenticated() {
        let (status, body) = send(json_post(
            "/courses",
            serde_json::json!({
                "title": "Rust",
                "description": "d",
                "start_date": "2026-01-01",
                "end_date": "2026-02-01"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn registration_with_mismatched_passwords_is_rejected() {
        let (status, body) = send(json_post(
            "/register",
            serde_json::json!({
                "username": "Alice",
                "email": "alice@example.com",
                "password": "one",
                "confirm_password": "two"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["non_field_errors"][0], "Passwords do not match.");
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let (status, body) = send(json_post("/login", serde_json::json!({ "username": "a" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["non_field_errors"][0],
            "Must include 'username' and 'password'."
        );
    }

    #[tokio::test]
    async fn mistyped_body_field_is_a_field_error() {
        let (status, body) = send(json_post("/register", serde_json::json!({ "username": 5 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["username"][0].as_str().unwrap().contains("invalid type"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_general_error() {
        let req = Request::post("/login")
            .header("content-type", "application/json")
            .body(Body::from("{\"username\": "))
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["non_field_errors"][0].is_string());
    }

    #[tokio::test]
    async fn course_without_dates_names_the_missing_field() {
        let (status, body) = send(json_post(
            "/courses",
            serde_json::json!({ "title": "Rust", "description": "d" }),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["start_date"][0], "This field is required.");
    }

    #[tokio::test]
    async fn bad_course_date_names_the_field() {
        let (status, body) = send(json_post(
            "/courses",
            serde_json::json!({
                "title": "Rust",
                "description": "d",
                "start_date": "next monday",
                "end_date": "2026-02-01"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["start_date"].is_array());
    }

    #[tokio::test]
    async fn non_numeric_message_id_is_json_404() {
        let req = Request::get("/rust-101/messages/abc").body(Body::empty()).unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Not found.");
    }

    #[tokio::test]
    async fn anonymous_logout_is_unauthenticated() {
        let (status, _) = send(json_post("/logout", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_instructor_listing_is_unauthenticated() {
        let req = Request::get("/instructors").body(Body::empty()).unwrap();
        let (status, _) = send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_course_listing_is_empty() {
        let req = Request::get("/courses").body(Body::empty()).unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn malformed_assessment_segment_is_not_found() {
        let req = Request::get("/rust-101/assessment-abc/questions")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_authorization_header_is_rejected() {
        let req = Request::get("/courses")
            .header("authorization", "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let req = Request::get("/nope").body(Body::empty()).unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Not found.");
    }
}
