use axum::{extract::State, http::StatusCode};

use super::{course_ctx, AppState, CourseCtx, Json, Path};
use crate::error::{ApiError, ValidationErrors};
use crate::models::{Message, MessageEditReq, MessagePatch, MessageReq};
use crate::policy::{Action, Policy, Principal, ResourceClass};
use crate::{rules, store};

const MESSAGES: Policy = Policy::for_class(ResourceClass::Message);

/// Messages in the course that the caller sent or received.
pub async fn list(
    State(st): State<AppState>,
    principal: Principal,
    Path(course_slug): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let ctx = scope(&st, &principal, &course_slug, Action::List).await?;
    let me = principal.require()?;
    Ok(Json(store::messages_for(&st.db, ctx.course.id, me.user_id).await?))
}

pub async fn create(
    State(st): State<AppState>,
    principal: Principal,
    Path(course_slug): Path<String>,
    Json(req): Json<MessageReq>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let ctx = scope(&st, &principal, &course_slug, Action::Create).await?;
    let me = principal.require()?;
    let mut errs = ValidationErrors::default();
    rules::check_text(&mut errs, "receiver", &req.receiver, Some(150));
    rules::check_text(&mut errs, "content", &req.content, None);
    errs.into_result()?;

    let message = store::create_message(&st.db, &ctx.course, me.user_id, &req).await?;
    tracing::debug!(course = %ctx.course.slug, from = %me.username, "message sent");
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn retrieve(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, id)): Path<(String, i64)>,
) -> Result<Json<Message>, ApiError> {
    let action = Action::Retrieve;
    let ctx = scope(&st, &principal, &course_slug, action).await?;
    let message = fetch(&st, &ctx, id).await?;
    MESSAGES.authorize_object(&principal, action, Some(&ctx.access), Some(message.sender_id))?;
    Ok(Json(message))
}

pub async fn update(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, id)): Path<(String, i64)>,
    Json(req): Json<MessageEditReq>,
) -> Result<Json<Message>, ApiError> {
    save(&st, &principal, (&course_slug, id), Action::Update, |_| req).await
}

pub async fn partial_update(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, id)): Path<(String, i64)>,
    Json(patch): Json<MessagePatch>,
) -> Result<Json<Message>, ApiError> {
    save(&st, &principal, (&course_slug, id), Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    let action = Action::Destroy;
    let ctx = scope(&st, &principal, &course_slug, action).await?;
    let message = fetch(&st, &ctx, id).await?;
    MESSAGES.authorize_object(&principal, action, Some(&ctx.access), Some(message.sender_id))?;
    store::delete_message(&st.db, message.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save(
    st: &AppState,
    principal: &Principal,
    (course_slug, id): (&str, i64),
    action: Action,
    build: impl FnOnce(&Message) -> MessageEditReq,
) -> Result<Json<Message>, ApiError> {
    let ctx = scope(st, principal, course_slug, action).await?;
    let message = fetch(st, &ctx, id).await?;
    MESSAGES.authorize_object(principal, action, Some(&ctx.access), Some(message.sender_id))?;

    let req = build(&message);
    let mut errs = ValidationErrors::default();
    rules::check_text(&mut errs, "content", &req.content, None);
    errs.into_result()?;
    Ok(Json(store::update_message(&st.db, message.id, &req.content).await?))
}

async fn scope(
    st: &AppState,
    principal: &Principal,
    course_slug: &str,
    action: Action,
) -> Result<CourseCtx, ApiError> {
    let ctx = course_ctx(&st.db, course_slug, principal).await?;
    MESSAGES.authorize(principal, action, Some(&ctx.access))?;
    Ok(ctx)
}

async fn fetch(st: &AppState, ctx: &CourseCtx, id: i64) -> Result<Message, ApiError> {
    store::message_in_course(&st.db, ctx.course.id, id)
        .await?
        .ok_or(ApiError::NotFound)
}
