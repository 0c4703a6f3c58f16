use axum::{extract::State, http::StatusCode};

use super::{AppState, Json, Path};
use crate::error::{ApiError, ValidationErrors};
use crate::models::{Instructor, InstructorPatch, InstructorReq, InstructorView};
use crate::policy::{Action, Policy, Principal, ResourceClass};
use crate::{rules, store};

const POLICY: Policy = Policy::for_class(ResourceClass::Instructor);

pub async fn list(
    State(st): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Instructor>>, ApiError> {
    POLICY.authorize(&principal, Action::List, None)?;
    Ok(Json(store::list_instructors(&st.db).await?))
}

pub async fn create(
    State(st): State<AppState>,
    principal: Principal,
    Json(req): Json<InstructorReq>,
) -> Result<(StatusCode, Json<InstructorView>), ApiError> {
    POLICY.authorize(&principal, Action::Create, None)?;
    let me = principal.require()?;
    check_bio(&req)?;

    let instructor = store::create_instructor(&st.db, me.user_id, &req.bio).await?;
    tracing::info!(user = %me.username, "instructor profile created");
    Ok((
        StatusCode::CREATED,
        Json(InstructorView {
            instructor,
            learners: Vec::new(),
        }),
    ))
}

pub async fn retrieve(
    State(st): State<AppState>,
    principal: Principal,
    Path(username): Path<String>,
) -> Result<Json<InstructorView>, ApiError> {
    POLICY.authorize(&principal, Action::Retrieve, None)?;
    let instructor = fetch(&st, &username).await?;
    POLICY.authorize_object(&principal, Action::Retrieve, None, Some(instructor.user_id))?;
    Ok(Json(view(&st, instructor).await?))
}

pub async fn update(
    State(st): State<AppState>,
    principal: Principal,
    Path(username): Path<String>,
    Json(req): Json<InstructorReq>,
) -> Result<Json<InstructorView>, ApiError> {
    save(&st, &principal, &username, Action::Update, |_| req).await
}

pub async fn partial_update(
    State(st): State<AppState>,
    principal: Principal,
    Path(username): Path<String>,
    Json(patch): Json<InstructorPatch>,
) -> Result<Json<InstructorView>, ApiError> {
    save(&st, &principal, &username, Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy(
    State(st): State<AppState>,
    principal: Principal,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    POLICY.authorize(&principal, Action::Destroy, None)?;
    let instructor = fetch(&st, &username).await?;
    POLICY.authorize_object(&principal, Action::Destroy, None, Some(instructor.user_id))?;
    store::delete_instructor(&st.db, instructor.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save(
    st: &AppState,
    principal: &Principal,
    username: &str,
    action: Action,
    build: impl FnOnce(&Instructor) -> InstructorReq,
) -> Result<Json<InstructorView>, ApiError> {
    POLICY.authorize(principal, action, None)?;
    let mut instructor = fetch(st, username).await?;
    POLICY.authorize_object(principal, action, None, Some(instructor.user_id))?;

    let req = build(&instructor);
    check_bio(&req)?;
    store::update_instructor(&st.db, instructor.user_id, &req.bio).await?;
    instructor.bio = req.bio;
    Ok(Json(view(st, instructor).await?))
}

async fn fetch(st: &AppState, username: &str) -> Result<Instructor, ApiError> {
    store::instructor_by_username(&st.db, username)
        .await?
        .ok_or(ApiError::NotFound)
}

async fn view(st: &AppState, instructor: Instructor) -> Result<InstructorView, ApiError> {
    let learners = store::learners_of(&st.db, instructor.user_id).await?;
    Ok(InstructorView {
        instructor,
        learners,
    })
}

fn check_bio(req: &InstructorReq) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    rules::check_text(&mut errs, "bio", &req.bio, None);
    errs.into_result()
}
