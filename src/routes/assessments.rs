use axum::{extract::State, http::StatusCode};

use super::{course_ctx, tagged_id, AppState, CourseCtx, Json, Path};
use crate::error::{ApiError, ValidationErrors};
use crate::models::{
    AnswerOption, Assessment, AssessmentPatch, AssessmentReq, AssessmentView, Content, OptionPatch,
    OptionReq, Question, QuestionPatch, QuestionReq, QuestionView,
};
use crate::policy::{Action, Policy, Principal, ResourceClass};
use crate::{rules, store};

const ASSESSMENTS: Policy = Policy::for_class(ResourceClass::Assessment);
const QUESTIONS: Policy = Policy::for_class(ResourceClass::Question);
const OPTIONS: Policy = Policy::for_class(ResourceClass::AnswerOption);

// --- path scopes ---
//
// Each scope resolves the course first, runs the collection-level check,
// then walks down the parent chain. A child that does not belong to its
// parent is a 404.

async fn lesson_scope(
    st: &AppState,
    p: &Principal,
    course_slug: &str,
    content_slug: &str,
    action: Action,
) -> Result<(CourseCtx, Content), ApiError> {
    let ctx = course_ctx(&st.db, course_slug, p).await?;
    ASSESSMENTS.authorize(p, action, Some(&ctx.access))?;
    let content = store::content_by_slug(&st.db, ctx.course.id, content_slug)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((ctx, content))
}

async fn assessment_scope(
    st: &AppState,
    p: &Principal,
    course_slug: &str,
    segment: &str,
    action: Action,
) -> Result<(CourseCtx, Assessment), ApiError> {
    let assessment_id = tagged_id(segment, "assessment")?;
    let ctx = course_ctx(&st.db, course_slug, p).await?;
    QUESTIONS.authorize(p, action, Some(&ctx.access))?;
    let assessment = store::assessment_in_course(&st.db, ctx.course.id, assessment_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((ctx, assessment))
}

async fn question_scope(
    st: &AppState,
    p: &Principal,
    course_slug: &str,
    (a_seg, q_seg): (&str, &str),
    action: Action,
) -> Result<(CourseCtx, Question), ApiError> {
    let question_id = tagged_id(q_seg, "question")?;
    // options share the course-content policy checked by the assessment scope
    let (ctx, assessment) = assessment_scope(st, p, course_slug, a_seg, action).await?;
    let question = store::question_in_assessment(&st.db, assessment.id, question_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((ctx, question))
}

// --- assessments ---

pub async fn list(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, content_slug)): Path<(String, String)>,
) -> Result<Json<Vec<AssessmentView>>, ApiError> {
    let (_, content) = lesson_scope(&st, &principal, &course_slug, &content_slug, Action::List).await?;
    Ok(Json(store::assessments_for_content(&st.db, content.id).await?))
}

pub async fn create(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, content_slug)): Path<(String, String)>,
    Json(req): Json<AssessmentReq>,
) -> Result<(StatusCode, Json<AssessmentView>), ApiError> {
    let (_, content) =
        lesson_scope(&st, &principal, &course_slug, &content_slug, Action::Create).await?;
    check_assessment(&req)?;
    let id = store::create_assessment(&st.db, content.id, &req).await?;
    Ok((StatusCode::CREATED, Json(store::assessment_view(&st.db, id).await?)))
}

pub async fn retrieve(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, content_slug, id)): Path<(String, String, i64)>,
) -> Result<Json<AssessmentView>, ApiError> {
    let action = Action::Retrieve;
    let (ctx, content) = lesson_scope(&st, &principal, &course_slug, &content_slug, action).await?;
    let assessment = fetch_assessment(&st, content.id, id).await?;
    ASSESSMENTS.authorize_object(&principal, action, Some(&ctx.access), None)?;
    Ok(Json(store::assessment_view(&st.db, assessment.id).await?))
}

pub async fn update(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, content_slug, id)): Path<(String, String, i64)>,
    Json(req): Json<AssessmentReq>,
) -> Result<Json<AssessmentView>, ApiError> {
    let path = (course_slug.as_str(), content_slug.as_str(), id);
    save_assessment(&st, &principal, path, Action::Update, |_| req).await
}

pub async fn partial_update(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, content_slug, id)): Path<(String, String, i64)>,
    Json(patch): Json<AssessmentPatch>,
) -> Result<Json<AssessmentView>, ApiError> {
    let path = (course_slug.as_str(), content_slug.as_str(), id);
    save_assessment(&st, &principal, path, Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, content_slug, id)): Path<(String, String, i64)>,
) -> Result<StatusCode, ApiError> {
    let action = Action::Destroy;
    let (ctx, content) = lesson_scope(&st, &principal, &course_slug, &content_slug, action).await?;
    let assessment = fetch_assessment(&st, content.id, id).await?;
    ASSESSMENTS.authorize_object(&principal, action, Some(&ctx.access), None)?;
    store::delete_assessment(&st.db, assessment.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_assessment(
    st: &AppState,
    principal: &Principal,
    (course_slug, content_slug, id): (&str, &str, i64),
    action: Action,
    build: impl FnOnce(&Assessment) -> AssessmentReq,
) -> Result<Json<AssessmentView>, ApiError> {
    let (ctx, content) = lesson_scope(st, principal, course_slug, content_slug, action).await?;
    let assessment = fetch_assessment(st, content.id, id).await?;
    ASSESSMENTS.authorize_object(principal, action, Some(&ctx.access), None)?;

    let req = build(&assessment);
    check_assessment(&req)?;
    store::update_assessment(&st.db, assessment.id, &req).await?;
    Ok(Json(store::assessment_view(&st.db, assessment.id).await?))
}

async fn fetch_assessment(st: &AppState, content_id: i64, id: i64) -> Result<Assessment, ApiError> {
    store::assessment_in_content(&st.db, content_id, id)
        .await?
        .ok_or(ApiError::NotFound)
}

fn check_assessment(req: &AssessmentReq) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    rules::check_text(&mut errs, "title", &req.title, Some(256));
    rules::check_text(&mut errs, "description", &req.description, None);
    errs.into_result()
}

// --- questions ---

pub async fn list_questions(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg)): Path<(String, String)>,
) -> Result<Json<Vec<QuestionView>>, ApiError> {
    let (_, assessment) = assessment_scope(&st, &principal, &course_slug, &a_seg, Action::List).await?;
    Ok(Json(store::questions_for_assessment(&st.db, assessment.id).await?))
}

pub async fn create_question(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg)): Path<(String, String)>,
    Json(req): Json<QuestionReq>,
) -> Result<(StatusCode, Json<QuestionView>), ApiError> {
    let (_, assessment) =
        assessment_scope(&st, &principal, &course_slug, &a_seg, Action::Create).await?;
    check_question(&req)?;
    let id = store::create_question(&st.db, assessment.id, &req).await?;
    Ok((StatusCode::CREATED, Json(store::question_view(&st.db, id).await?)))
}

pub async fn retrieve_question(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, id)): Path<(String, String, i64)>,
) -> Result<Json<QuestionView>, ApiError> {
    let action = Action::Retrieve;
    let (ctx, assessment) = assessment_scope(&st, &principal, &course_slug, &a_seg, action).await?;
    let question = fetch_question(&st, assessment.id, id).await?;
    QUESTIONS.authorize_object(&principal, action, Some(&ctx.access), None)?;
    Ok(Json(store::question_view(&st.db, question.id).await?))
}

pub async fn update_question(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, id)): Path<(String, String, i64)>,
    Json(req): Json<QuestionReq>,
) -> Result<Json<QuestionView>, ApiError> {
    let path = (course_slug.as_str(), a_seg.as_str(), id);
    save_question(&st, &principal, path, Action::Update, |_| req).await
}

pub async fn partial_update_question(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, id)): Path<(String, String, i64)>,
    Json(patch): Json<QuestionPatch>,
) -> Result<Json<QuestionView>, ApiError> {
    let path = (course_slug.as_str(), a_seg.as_str(), id);
    save_question(&st, &principal, path, Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy_question(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, id)): Path<(String, String, i64)>,
) -> Result<StatusCode, ApiError> {
    let action = Action::Destroy;
    let (ctx, assessment) = assessment_scope(&st, &principal, &course_slug, &a_seg, action).await?;
    let question = fetch_question(&st, assessment.id, id).await?;
    QUESTIONS.authorize_object(&principal, action, Some(&ctx.access), None)?;
    store::delete_question(&st.db, question.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_question(
    st: &AppState,
    principal: &Principal,
    (course_slug, a_seg, id): (&str, &str, i64),
    action: Action,
    build: impl FnOnce(&Question) -> QuestionReq,
) -> Result<Json<QuestionView>, ApiError> {
    let (ctx, assessment) = assessment_scope(st, principal, course_slug, a_seg, action).await?;
    let question = fetch_question(st, assessment.id, id).await?;
    QUESTIONS.authorize_object(principal, action, Some(&ctx.access), None)?;

    let req = build(&question);
    check_question(&req)?;
    store::update_question(&st.db, question.id, &req).await?;
    Ok(Json(store::question_view(&st.db, question.id).await?))
}

async fn fetch_question(st: &AppState, assessment_id: i64, id: i64) -> Result<Question, ApiError> {
    store::question_in_assessment(&st.db, assessment_id, id)
        .await?
        .ok_or(ApiError::NotFound)
}

fn check_question(req: &QuestionReq) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    rules::check_text(&mut errs, "question_text", &req.question_text, None);
    errs.into_result()
}

// --- options ---

pub async fn list_options(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, q_seg)): Path<(String, String, String)>,
) -> Result<Json<Vec<AnswerOption>>, ApiError> {
    let segs = (a_seg.as_str(), q_seg.as_str());
    let (_, question) = question_scope(&st, &principal, &course_slug, segs, Action::List).await?;
    Ok(Json(store::options_for_question(&st.db, question.id).await?))
}

pub async fn create_option(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, q_seg)): Path<(String, String, String)>,
    Json(req): Json<OptionReq>,
) -> Result<(StatusCode, Json<AnswerOption>), ApiError> {
    let segs = (a_seg.as_str(), q_seg.as_str());
    let (_, question) = question_scope(&st, &principal, &course_slug, segs, Action::Create).await?;
    let option = store::create_option(&st.db, question.id, &req).await?;
    Ok((StatusCode::CREATED, Json(option)))
}

pub async fn retrieve_option(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, q_seg, id)): Path<(String, String, String, i64)>,
) -> Result<Json<AnswerOption>, ApiError> {
    let action = Action::Retrieve;
    let segs = (a_seg.as_str(), q_seg.as_str());
    let (ctx, question) = question_scope(&st, &principal, &course_slug, segs, action).await?;
    let option = fetch_option(&st, question.id, id).await?;
    OPTIONS.authorize_object(&principal, action, Some(&ctx.access), None)?;
    Ok(Json(option))
}

pub async fn update_option(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, q_seg, id)): Path<(String, String, String, i64)>,
    Json(req): Json<OptionReq>,
) -> Result<Json<AnswerOption>, ApiError> {
    let path = (course_slug.as_str(), a_seg.as_str(), q_seg.as_str(), id);
    save_option(&st, &principal, path, Action::Update, |_| req).await
}

pub async fn partial_update_option(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, q_seg, id)): Path<(String, String, String, i64)>,
    Json(patch): Json<OptionPatch>,
) -> Result<Json<AnswerOption>, ApiError> {
    let path = (course_slug.as_str(), a_seg.as_str(), q_seg.as_str(), id);
    save_option(&st, &principal, path, Action::PartialUpdate, |cur| {
        patch.merge(cur)
    })
    .await
}

pub async fn destroy_option(
    State(st): State<AppState>,
    principal: Principal,
    Path((course_slug, a_seg, q_seg, id)): Path<(String, String, String, i64)>,
) -> Result<StatusCode, ApiError> {
    let action = Action::Destroy;
    let segs = (a_seg.as_str(), q_seg.as_str());
    let (ctx, question) = question_scope(&st, &principal, &course_slug, segs, action).await?;
    let option = fetch_option(&st, question.id, id).await?;
    OPTIONS.authorize_object(&principal, action, Some(&ctx.access), None)?;
    store::delete_option(&st.db, option.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_option(
    st: &AppState,
    principal: &Principal,
    (course_slug, a_seg, q_seg, id): (&str, &str, &str, i64),
    action: Action,
    build: impl FnOnce(&AnswerOption) -> OptionReq,
) -> Result<Json<AnswerOption>, ApiError> {
    let (ctx, question) = question_scope(st, principal, course_slug, (a_seg, q_seg), action).await?;
    let option = fetch_option(st, question.id, id).await?;
    OPTIONS.authorize_object(principal, action, Some(&ctx.access), None)?;

    let req = build(&option);
    Ok(Json(store::update_option(&st.db, question.id, option.id, &req).await?))
}

async fn fetch_option(st: &AppState, question_id: i64, id: i64) -> Result<AnswerOption, ApiError> {
    store::option_in_question(&st.db, question_id, id)
        .await?
        .ok_or(ApiError::NotFound)
}
