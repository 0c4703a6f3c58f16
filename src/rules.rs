//! Business rules checked before a mutation is written.
//!
//! Each check works on facts the store read inside the mutation's
//! transaction (with the parent row locked), so a rejection never leaves a
//! partial write behind.

use chrono::NaiveDate;

use crate::error::{ApiError, ValidationErrors};
use crate::models::{AnswerOption, CourseReq, RegisterReq};
use crate::text;

pub const MAX_OPTIONS: usize = 4;

pub const EMAIL_TAKEN: &str = "This email is already registered.";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match.";
pub const COURSE_TITLE_TAKEN: &str = "A course of yours with this title already exists.";
pub const ALREADY_ENROLLED: &str = "You are already enrolled in this course.";
pub const ENROLLED: &str = "Enrolled successfully.";
pub const TOO_MANY_OPTIONS: &str = "Cannot create more than 4 options for a question.";
pub const OPTION_EXISTS: &str = "This option already exists.";
pub const CORRECT_OPTION_EXISTS: &str = "Correct answer already exists.";
pub const BAD_RECEIVER: &str = "You can only send messages to your enrolled instructors.";
pub const ALREADY_INSTRUCTOR: &str = "Bad Attempt";

const BLANK: &str = "This field may not be blank.";

/// Required, non-blank text no longer than `max` characters (no limit when
/// `max` is `None`).
pub fn check_text(errs: &mut ValidationErrors, field: &str, value: &str, max: Option<usize>) {
    if value.trim().is_empty() {
        errs.add(field, BLANK);
    } else if let Some(max) = max {
        if value.chars().count() > max {
            errs.add(
                field,
                format!("Ensure this field has no more than {max} characters."),
            );
        }
    }
}

/// Titles that double as URL slugs must leave something after slugifying.
pub fn check_slug_source(errs: &mut ValidationErrors, field: &str, title: &str) {
    if !title.trim().is_empty() && text::slugify(title).is_empty() {
        errs.add(field, "Title must contain at least one ASCII letter or digit.");
    }
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Field checks plus the password confirmation. The email collision is
/// checked separately against the store.
pub fn check_registration(req: &RegisterReq) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    check_text(&mut errs, "username", &req.username, Some(150));
    check_text(&mut errs, "email", &req.email, Some(254));
    if !req.email.trim().is_empty() && !req.email.contains('@') {
        errs.add("email", "Enter a valid email address.");
    }
    check_text(&mut errs, "password", &req.password, None);
    if req.password != req.confirm_password {
        errs.add(ValidationErrors::NON_FIELD, PASSWORD_MISMATCH);
    }
    errs.into_result()
}

pub fn check_email_free(email_taken: bool) -> Result<(), ApiError> {
    if email_taken {
        return Err(ApiError::general(EMAIL_TAKEN));
    }
    Ok(())
}

pub fn check_course_fields(req: &CourseReq) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    check_text(&mut errs, "title", &req.title, Some(255));
    check_slug_source(&mut errs, "title", &req.title);
    check_text(&mut errs, "description", &req.description, None);
    check_dates(&mut errs, req.start_date, req.end_date);
    errs.into_result()
}

fn check_dates(errs: &mut ValidationErrors, start: NaiveDate, end: NaiveDate) {
    if end < start {
        errs.add("end_date", "End date must not be before the start date.");
    }
}

/// `siblings` are `(id, title)` of the instructor's courses; `updating` is
/// the id of the course being edited, which never collides with itself.
pub fn check_course_title(
    siblings: &[(i64, String)],
    title: &str,
    updating: Option<i64>,
) -> Result<(), ApiError> {
    let taken = siblings
        .iter()
        .any(|(id, t)| t == title && Some(*id) != updating);
    if taken {
        return Err(ApiError::general(COURSE_TITLE_TAKEN));
    }
    Ok(())
}

pub fn check_enrollment(already_enrolled: bool) -> Result<(), ApiError> {
    if already_enrolled {
        return Err(ApiError::general(ALREADY_ENROLLED));
    }
    Ok(())
}

/// Checks in order: option count, duplicate text, second correct answer.
pub fn check_new_option(
    existing: &[AnswerOption],
    option_text: &str,
    is_correct: bool,
) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    check_text(&mut errs, "option_text", option_text, Some(255));
    errs.into_result()?;

    if existing.len() >= MAX_OPTIONS {
        return Err(ApiError::general(TOO_MANY_OPTIONS));
    }
    if existing.iter().any(|o| o.option_text == option_text) {
        return Err(ApiError::general(OPTION_EXISTS));
    }
    if is_correct && existing.iter().any(|o| o.is_correct) {
        return Err(ApiError::general(CORRECT_OPTION_EXISTS));
    }
    Ok(())
}

/// `existing` includes the option being edited (`option_id`); only the other
/// options can conflict with it.
pub fn check_option_update(
    existing: &[AnswerOption],
    option_id: i64,
    option_text: &str,
    is_correct: bool,
) -> Result<(), ApiError> {
    let mut errs = ValidationErrors::default();
    check_text(&mut errs, "option_text", option_text, Some(255));
    errs.into_result()?;

    let others = || existing.iter().filter(move |o| o.id != option_id);
    if is_correct && others().any(|o| o.is_correct) {
        return Err(ApiError::general(CORRECT_OPTION_EXISTS));
    }
    if others().any(|o| o.option_text == option_text) {
        return Err(ApiError::general(OPTION_EXISTS));
    }
    Ok(())
}

/// The receiver must be the course's instructor and not the sender.
pub fn check_message(
    course_instructor_id: i64,
    sender_id: i64,
    receiver_id: i64,
) -> Result<(), ApiError> {
    if receiver_id != course_instructor_id || receiver_id == sender_id {
        return Err(ApiError::general(BAD_RECEIVER));
    }
    Ok(())
}

pub fn check_instructor_signup(has_profile: bool) -> Result<(), ApiError> {
    if has_profile {
        return Err(ApiError::field("error", ALREADY_INSTRUCTOR));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(id: i64, text: &str, is_correct: bool) -> AnswerOption {
        AnswerOption {
            id,
            question_id: 1,
            option_text: text.into(),
            is_correct,
        }
    }

    fn message_of(err: ApiError) -> String {
        match err {
            ApiError::Validation(errs) => errs.to_string(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn register(password: &str, confirm: &str) -> RegisterReq {
        RegisterReq {
            username: "Alice".into(),
            email: "alice@example.com".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[test]
    fn registration_password_mismatch_rejected() {
        assert!(check_registration(&register("s3cret", "s3cret")).is_ok());
        let err = check_registration(&register("s3cret", "secret")).unwrap_err();
        assert_eq!(message_of(err), PASSWORD_MISMATCH);
    }

    #[test]
    fn registration_requires_fields() {
        let err = check_registration(&RegisterReq::default()).unwrap_err();
        let ApiError::Validation(errs) = err else {
            panic!("expected validation error")
        };
        assert!(errs.get("username").is_some());
        assert!(errs.get("email").is_some());
        assert!(errs.get("password").is_some());
    }

    #[test]
    fn duplicate_email_rejected() {
        assert!(check_email_free(false).is_ok());
        assert_eq!(message_of(check_email_free(true).unwrap_err()), EMAIL_TAKEN);
    }

    #[test]
    fn usernames_are_lowercased() {
        assert_eq!(normalize_username("AliCe"), "alice");
        assert_eq!(normalize_username(" BOB "), "bob");
        assert_eq!(normalize_username("carol"), "carol");
    }

    #[test]
    fn second_course_with_same_title_rejected() {
        let mine = vec![(1, "X".to_string())];
        let err = check_course_title(&mine, "X", None).unwrap_err();
        assert_eq!(message_of(err), COURSE_TITLE_TAKEN);
        assert!(check_course_title(&mine, "Y", None).is_ok());
    }

    #[test]
    fn course_update_ignores_itself() {
        let mine = vec![(1, "X".to_string()), (2, "Y".to_string())];
        assert!(check_course_title(&mine, "X", Some(1)).is_ok());
        assert!(check_course_title(&mine, "Y", Some(1)).is_err());
    }

    #[test]
    fn course_dates_must_be_ordered() {
        let req = CourseReq {
            title: "Rust".into(),
            description: "d".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
        };
        let ApiError::Validation(errs) = check_course_fields(&req).unwrap_err() else {
            panic!("expected validation error")
        };
        assert!(errs.get("end_date").is_some());
    }

    #[test]
    fn enrolling_twice_rejected() {
        assert!(check_enrollment(false).is_ok());
        assert_eq!(message_of(check_enrollment(true).unwrap_err()), ALREADY_ENROLLED);
    }

    #[test]
    fn fifth_option_rejected() {
        let four: Vec<_> = (1..=4).map(|i| opt(i, &format!("o{i}"), false)).collect();
        let err = check_new_option(&four, "o5", false).unwrap_err();
        assert_eq!(message_of(err), TOO_MANY_OPTIONS);
        assert!(check_new_option(&four[..3], "o5", false).is_ok());
    }

    #[test]
    fn duplicate_option_text_rejected() {
        let existing = vec![opt(1, "Paris", false)];
        let err = check_new_option(&existing, "Paris", false).unwrap_err();
        assert_eq!(message_of(err), OPTION_EXISTS);
    }

    #[test]
    fn second_correct_option_rejected() {
        let existing = vec![opt(1, "Paris", true), opt(2, "Rome", false)];
        let err = check_new_option(&existing, "Berlin", true).unwrap_err();
        assert_eq!(message_of(err), CORRECT_OPTION_EXISTS);
        assert!(check_new_option(&existing, "Berlin", false).is_ok());
    }

    #[test]
    fn first_correct_option_accepted() {
        let existing = vec![opt(1, "Rome", false)];
        assert!(check_new_option(&existing, "Paris", true).is_ok());
    }

    #[test]
    fn count_is_checked_before_correctness() {
        let full = vec![
            opt(1, "a", true),
            opt(2, "b", false),
            opt(3, "c", false),
            opt(4, "d", false),
        ];
        let err = check_new_option(&full, "e", true).unwrap_err();
        assert_eq!(message_of(err), TOO_MANY_OPTIONS);
    }

    #[test]
    fn option_update_against_other_correct_rejected() {
        let existing = vec![opt(1, "Paris", true), opt(2, "Rome", false)];
        let err = check_option_update(&existing, 2, "Rome", true).unwrap_err();
        assert_eq!(message_of(err), CORRECT_OPTION_EXISTS);
        // re-saving the correct option itself is fine
        assert!(check_option_update(&existing, 1, "Paris", true).is_ok());
        assert!(check_option_update(&existing, 2, "Roma", false).is_ok());
    }

    #[test]
    fn option_rename_to_sibling_text_rejected() {
        let existing = vec![opt(1, "Paris", true), opt(2, "Rome", false)];
        let err = check_option_update(&existing, 2, "Paris", false).unwrap_err();
        assert_eq!(message_of(err), OPTION_EXISTS);
    }

    #[test]
    fn blank_option_text_rejected() {
        let ApiError::Validation(errs) = check_new_option(&[], "  ", false).unwrap_err() else {
            panic!("expected validation error")
        };
        assert!(errs.get("option_text").is_some());
    }

    #[test]
    fn messages_only_to_the_course_instructor() {
        // instructor 1, student 5, other user 6
        assert!(check_message(1, 5, 1).is_ok());
        assert_eq!(message_of(check_message(1, 5, 6).unwrap_err()), BAD_RECEIVER);
        // instructor writing to themselves
        assert!(check_message(1, 1, 1).is_err());
    }

    #[test]
    fn instructor_signup_once() {
        assert!(check_instructor_signup(false).is_ok());
        let ApiError::Validation(errs) = check_instructor_signup(true).unwrap_err() else {
            panic!("expected validation error")
        };
        assert_eq!(errs.get("error").unwrap(), &[ALREADY_INSTRUCTOR.to_string()]);
    }

    #[test]
    fn titles_must_yield_a_slug() {
        let mut errs = ValidationErrors::default();
        check_slug_source(&mut errs, "title", "Intro");
        assert!(errs.is_empty());
        check_slug_source(&mut errs, "title", "!!!");
        assert!(errs.get("title").is_some());
    }

    #[test]
    fn text_length_limits() {
        let mut errs = ValidationErrors::default();
        check_text(&mut errs, "title", &"x".repeat(255), Some(255));
        assert!(errs.is_empty());
        check_text(&mut errs, "title", &"x".repeat(256), Some(255));
        assert!(errs.get("title").is_some());
    }
}
