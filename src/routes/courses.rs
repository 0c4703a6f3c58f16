use axum::{extract::State, http::StatusCode};
use serde::Serialize;

use super::{course_ctx, AppState, Json, Path};
use crate::error::{ApiError, ValidationErrors};
use crate::models::{
    Content, ContentPatch, ContentReq, ContentView, Course, CoursePatch, CourseReq, Enrollment,
};
use crate::policy::{Action, Policy, Principal, ResourceClass};
use crate::{rules, store};

const COURSES: Policy = Policy::for_class(ResourceClass::Course);
const ENROLLMENTS: Policy = Policy::for_class(ResourceClass::Enrollment);
const LESSONS: Policy = Policy::for_class(ResourceClass::Content);

// --- courses ---

/// Instructors see their own courses; everyone else gets an empty list.
pub async fn list(
    State(st): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Course>>, ApiError> {
    COURSES.authorize(&principal, Action::List, None)?;
    let courses = match principal.identity() {
        Some(me) if me.is_instructor => store::courses_by_instructor(&st.db, me.user_id).await?,
        _ => Vec::new(),
    };
    Ok(Json(courses))
}

pub async fn create(
    State(st): State<AppState>,
    principal: Principal,
    Json(req): Json<CourseReq>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    COURSES.authorize(&principal, Action::Create, None)?;
    let me = principal.require()?;
    rules::check_course_fields(&req)?;

    let course = store::create_course(&st.db, me.user_id, &req).await?;
    tracing::info!(course = %course.slug, instructor = %me.username, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn retrieve(
    State(st): State<AppState>,
    principal: Principal,
    Path(slug): Path<String>,
) -> Result<Json<Course>, ApiError> {
    COURSES.authorize(&principal, Action::Retrieve, None)?;
    let course = fetch_course(&st, &slug).await?;
    COURSES.authorize_object(&principal, Action::Retrieve, None, Some(course.instructor_id))?;
    Ok(Json(course))
}

pub async fn update(
    State(st): State<AppState>,
    principal: Principal,
    Path(slug): Path<String>,
    Json(req): Json<CourseReq>,
) -> Result<Json<Course>, ApiError> {
    save_course(&st, &principal, &slug, Action::Update, |_| req).await
}

pub async fn partial_update(
    State(st): State<AppState>,
    principal: Principal,
    Path(slug): Path<String>,
    Json(patch): Json<CoursePatch>,
) -> Result<Json<Course>, ApiError> {
    save_course(&st, &principal, &slug, Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy(
    State(st): State<AppState>,
    principal: Principal,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    COURSES.authorize(&principal, Action::Destroy, None)?;
    let course = fetch_course(&st, &slug).await?;
    COURSES.authorize_object(&principal, Action::Destroy, None, Some(course.instructor_id))?;
    store::delete_course(&st.db, course.id).await?;
    tracing::info!(course = %course.slug, "course deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn save_course(
    st: &AppState,
    principal: &Principal,
    slug: &str,
    action: Action,
    build: impl FnOnce(&Course) -> CourseReq,
) -> Result<Json<Course>, ApiError> {
    COURSES.authorize(principal, action, None)?;
    let course = fetch_course(st, slug).await?;
    COURSES.authorize_object(principal, action, None, Some(course.instructor_id))?;

    let req = build(&course);
    rules::check_course_fields(&req)?;
    Ok(Json(store::update_course(&st.db, &course, &req).await?))
}

async fn fetch_course(st: &AppState, slug: &str) -> Result<Course, ApiError> {
    store::course_by_slug(&st.db, slug)
        .await?
        .ok_or(ApiError::NotFound)
}

// --- enrollments ---

#[derive(Serialize)]
pub struct Enrolled {
    #[serde(flatten)]
    enrollment: Enrollment,
    detail: &'static str,
}

pub async fn list_enrollments(
    State(st): State<AppState>,
    principal: Principal,
    Path(course_slug): Path<String>,
) -> Result<Json<Vec<Enrollment>>, ApiError> {
    ENROLLMENTS.authorize(&principal, Action::List, None)?;
    let course = fetch_course(&st, &course_slug).await?;
    Ok(Json(store::enrollments_for_course(&st.db, course.id).await?))
}

pub async fn enroll(
    State(st): State<AppState>,
    principal: Principal,
    Path(course_slug): Path<String>,
) -> Result<(StatusCode, Json<Enrolled>), ApiError> {
    ENROLLMENTS.authorize(&principal, Action::Create, None)?;
    let me = principal.require()?;
    let course = fetch_course(&st, &course_slug).await?;

    let enrollment = store::enroll(&st.db, course.id, me.user_id).await?;
    tracing::info!(course = %course.slug, student = %me.username, "enrolled");
    Ok((
        StatusCode::CREATED,
        Json(Enrolled {
            enrollment,
            detail: rules::ENROLLED,
        }),
    ))
}

// --- lessons ---

pub async fn list_lessons(
    State(st): State<AppState>,
    principal: Principal,
    Path(course_slug): Path<String>,
) -> Result<Json<Vec<ContentView>>, ApiError> {
    let ctx = course_ctx(&st.db, &course_slug, &principal).await?;
    LESSONS.authorize(&principal, Action::List, Some(&ctx.access))?;
    let lessons = store::contents_for_course(&st.db, ctx.course.id).await?;
    Ok(Json(lessons.into_iter().map(ContentView::from).collect()))
}

pub async fn create_lesson(
    State(st): State<AppState>,
    principal: Principal,
    Path(course_slug): Path<String>,
    Json(req): Json<ContentReq>,
) -> Result<(StatusCode, Json<ContentView>), ApiError> {
    let ctx = course_ctx(&st.db, &course_slug, &principal).await?;
    LESSONS.authorize(&principal, Action::Create, Some(&ctx.access))?;
    check_lesson(&req)?;

    let lesson = store::create_content(&st.db, ctx.course.id, &req).await?;
    Ok((StatusCode::CREATED, Json(lesson.into())))
}

pub async fn retrieve_lesson(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, slug)): Path<(String, String)>,
) -> Result<Json<ContentView>, ApiError> {
    let ctx = course_ctx(&st.db, &course_slug, &principal).await?;
    LESSONS.authorize(&principal, Action::Retrieve, Some(&ctx.access))?;
    let lesson = fetch_lesson(&st, ctx.course.id, &slug).await?;
    LESSONS.authorize_object(&principal, Action::Retrieve, Some(&ctx.access), None)?;
    Ok(Json(lesson.into()))
}

pub async fn update_lesson(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, slug)): Path<(String, String)>,
    Json(req): Json<ContentReq>,
) -> Result<Json<ContentView>, ApiError> {
    save_lesson(&st, &principal, &course_slug, &slug, Action::Update, |_| req).await
}

pub async fn partial_update_lesson(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, slug)): Path<(String, String)>,
    Json(patch): Json<ContentPatch>,
) -> Result<Json<ContentView>, ApiError> {
    save_lesson(&st, &principal, &course_slug, &slug, Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy_lesson(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, slug)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let ctx = course_ctx(&st.db, &course_slug, &principal).await?;
    LESSONS.authorize(&principal, Action::Destroy, Some(&ctx.access))?;
    let lesson = fetch_lesson(&st, ctx.course.id, &slug).await?;
    LESSONS.authorize_object(&principal, Action::Destroy, Some(&ctx.access), None)?;
    store::delete_content(&st.db, lesson.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_lesson(
    st: &AppState,
    principal: &Principal,
    course_slug: &str,
    slug: &str,
    action: Action,
    build: impl FnOnce(&Content) -> ContentReq,
) -> Result<Json<ContentView>, ApiError> {
    let ctx = course_ctx(&st.db, course_slug, principal).await?;
    LESSONS.authorize(principal, action, Some(&ctx.access))?;
    let lesson = fetch_lesson(st, ctx.course.id, slug).await?;
    LESSONS.authorize_object(principal, action, Some(&ctx.access), None)?;

    let req = build(&lesson);
    check_lesson(&req)?;
    Ok(Json(store::update_content(&st.db, lesson.id, &req).await?.into()))
}

async fn fetch_lesson(st: &AppState, course_id: i64, slug: &str) -> Result<Content, ApiError> {
    store::content_by_slug(&st.db, course_id, slug)
        .await?
        .ok_or(ApiError::NotFound)
}

fn check_lesson(req: &ContentReq) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    rules::check_text(&mut errs, "title", &req.title, Some(255));
    rules::check_slug_source(&mut errs, "title", &req.title);
    rules::check_text(&mut errs, "description", &req.description, None);
    errs.into_result()
}
