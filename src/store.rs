//! Postgres queries.
//!
//! Mutations guarded by a business rule run in a transaction that first
//! locks the parent row (`FOR UPDATE`), so two concurrent requests against
//! the same course or question are serialized before the rule reads its
//! facts. Unique constraints in the schema back the same rules.

use chrono::{Duration, Utc};
use sqlx::{query, query_as, query_scalar};

use crate::db::Db;
use crate::error::ApiError;
use crate::models::*;
use crate::policy::{CourseAccess, Identity, Principal};
use crate::{rules, text};

type Result<T> = std::result::Result<T, ApiError>;

// --- users & tokens ---

pub async fn register_user(
    db: &Db,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let mut tx = db.begin().await?;
    let taken: bool = query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(&mut *tx)
        .await?;
    rules::check_email_free(taken)?;

    let user = query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id, username, email, password_hash, is_active
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(user)
}

pub async fn user_by_username(db: &Db, username: &str) -> Result<Option<User>> {
    Ok(query_as::<_, User>(
        "SELECT id, username, email, password_hash, is_active
         FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(db)
    .await?)
}

pub async fn issue_token(db: &Db, user_id: i64, digest: &str, ttl_hours: i64) -> Result<()> {
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    query("INSERT INTO auth_tokens (digest, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(digest)
        .bind(user_id)
        .bind(expires_at)
        .execute(db)
        .await?;
    Ok(())
}

/// Drops every token of the user, expired ones included.
pub async fn revoke_tokens(db: &Db, user_id: i64) -> Result<u64> {
    let done = query("DELETE FROM auth_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}

pub async fn identity_for_token(db: &Db, digest: &str) -> Result<Option<Identity>> {
    let row: Option<(i64, String, bool, bool)> = query_as(
        r#"
        SELECT u.id, u.username, u.is_staff, (i.user_id IS NOT NULL)
        FROM auth_tokens t
        JOIN users u ON u.id = t.user_id
        LEFT JOIN instructors i ON i.user_id = u.id
        WHERE t.digest = $1 AND t.expires_at > now() AND u.is_active
        "#,
    )
    .bind(digest)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(user_id, username, is_staff, is_instructor)| Identity {
        user_id,
        username,
        is_staff,
        is_instructor,
    }))
}

// --- instructors ---

const INSTRUCTOR_SELECT: &str =
    "SELECT i.user_id, u.username, i.bio FROM instructors i JOIN users u ON u.id = i.user_id";

pub async fn list_instructors(db: &Db) -> Result<Vec<Instructor>> {
    let sql = format!("{INSTRUCTOR_SELECT} ORDER BY u.username");
    Ok(query_as::<_, Instructor>(&sql).fetch_all(db).await?)
}

pub async fn instructor_by_username(db: &Db, username: &str) -> Result<Option<Instructor>> {
    let sql = format!("{INSTRUCTOR_SELECT} WHERE u.username = $1");
    Ok(query_as::<_, Instructor>(&sql)
        .bind(username)
        .fetch_optional(db)
        .await?)
}

pub async fn learners_of(db: &Db, instructor_id: i64) -> Result<Vec<String>> {
    Ok(query_scalar(
        "SELECT u.username FROM instructor_learners l JOIN users u ON u.id = l.learner_id
         WHERE l.instructor_id = $1 ORDER BY u.username",
    )
    .bind(instructor_id)
    .fetch_all(db)
    .await?)
}

pub async fn create_instructor(db: &Db, user_id: i64, bio: &str) -> Result<Instructor> {
    let mut tx = db.begin().await?;
    query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let exists: bool = query_scalar("SELECT EXISTS(SELECT 1 FROM instructors WHERE user_id = $1)")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    rules::check_instructor_signup(exists)?;

    query("INSERT INTO instructors (user_id, bio) VALUES ($1, $2)")
        .bind(user_id)
        .bind(bio)
        .execute(&mut *tx)
        .await?;
    let sql = format!("{INSTRUCTOR_SELECT} WHERE i.user_id = $1");
    let created = query_as::<_, Instructor>(&sql)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(created)
}

pub async fn update_instructor(db: &Db, user_id: i64, bio: &str) -> Result<()> {
    query("UPDATE instructors SET bio = $2 WHERE user_id = $1")
        .bind(user_id)
        .bind(bio)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete_instructor(db: &Db, user_id: i64) -> Result<()> {
    query("DELETE FROM instructors WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

// --- courses ---

const COURSE_SELECT: &str = r#"
    SELECT c.id, c.title, c.slug, c.description, c.start_date, c.end_date,
           c.instructor_id, u.username AS instructor
    FROM courses c JOIN users u ON u.id = c.instructor_id
"#;

pub async fn course_by_slug(db: &Db, slug: &str) -> Result<Option<Course>> {
    let sql = format!("{COURSE_SELECT} WHERE c.slug = $1");
    Ok(query_as::<_, Course>(&sql)
        .bind(slug)
        .fetch_optional(db)
        .await?)
}

async fn course_by_id(db: &Db, id: i64) -> Result<Course> {
    let sql = format!("{COURSE_SELECT} WHERE c.id = $1");
    Ok(query_as::<_, Course>(&sql).bind(id).fetch_one(db).await?)
}

pub async fn courses_by_instructor(db: &Db, instructor_id: i64) -> Result<Vec<Course>> {
    let sql = format!("{COURSE_SELECT} WHERE c.instructor_id = $1 ORDER BY c.start_date, c.id");
    Ok(query_as::<_, Course>(&sql)
        .bind(instructor_id)
        .fetch_all(db)
        .await?)
}

/// The principal's standing in `course`.
pub async fn course_access(db: &Db, course: &Course, p: &Principal) -> Result<CourseAccess> {
    let enrolled = match p.user_id() {
        Some(uid) if uid != course.instructor_id => {
            query_scalar(
                "SELECT EXISTS(SELECT 1 FROM enrollments WHERE course_id = $1 AND student_id = $2)",
            )
            .bind(course.id)
            .bind(uid)
            .fetch_one(db)
            .await?
        }
        _ => false,
    };
    Ok(CourseAccess {
        instructor_user_id: course.instructor_id,
        enrolled,
    })
}

pub async fn create_course(db: &Db, instructor_id: i64, req: &CourseReq) -> Result<Course> {
    let mut tx = db.begin().await?;
    query("SELECT user_id FROM instructors WHERE user_id = $1 FOR UPDATE")
        .bind(instructor_id)
        .execute(&mut *tx)
        .await?;
    let siblings: Vec<(i64, String)> =
        query_as("SELECT id, title FROM courses WHERE instructor_id = $1")
            .bind(instructor_id)
            .fetch_all(&mut *tx)
            .await?;
    rules::check_course_title(&siblings, &req.title, None)?;

    let id: i64 = query_scalar(
        r#"
        INSERT INTO courses (title, slug, description, instructor_id, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&req.title)
    .bind(text::slugify(&req.title))
    .bind(&req.description)
    .bind(instructor_id)
    .bind(req.start_date)
    .bind(req.end_date)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    course_by_id(db, id).await
}

/// Rewrites every writable column; the slug is re-derived from the title.
pub async fn update_course(db: &Db, course: &Course, req: &CourseReq) -> Result<Course> {
    let mut tx = db.begin().await?;
    query("SELECT user_id FROM instructors WHERE user_id = $1 FOR UPDATE")
        .bind(course.instructor_id)
        .execute(&mut *tx)
        .await?;
    let siblings: Vec<(i64, String)> =
        query_as("SELECT id, title FROM courses WHERE instructor_id = $1")
            .bind(course.instructor_id)
            .fetch_all(&mut *tx)
            .await?;
    rules::check_course_title(&siblings, &req.title, Some(course.id))?;

    query(
        r#"
        UPDATE courses
        SET title = $2, slug = $3, description = $4, start_date = $5, end_date = $6
        WHERE id = $1
        "#,
    )
    .bind(course.id)
    .bind(&req.title)
    .bind(text::slugify(&req.title))
    .bind(&req.description)
    .bind(req.start_date)
    .bind(req.end_date)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    course_by_id(db, course.id).await
}

pub async fn delete_course(db: &Db, id: i64) -> Result<()> {
    query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

// --- enrollments ---

const ENROLLMENT_SELECT: &str = r#"
    SELECT e.id, c.slug AS course, u.username AS student, e.enrollment_date
    FROM enrollments e
    JOIN courses c ON c.id = e.course_id
    JOIN users u ON u.id = e.student_id
"#;

pub async fn enrollments_for_course(db: &Db, course_id: i64) -> Result<Vec<Enrollment>> {
    let sql = format!("{ENROLLMENT_SELECT} WHERE e.course_id = $1 ORDER BY e.enrollment_date");
    Ok(query_as::<_, Enrollment>(&sql)
        .bind(course_id)
        .fetch_all(db)
        .await?)
}

pub async fn enroll(db: &Db, course_id: i64, student_id: i64) -> Result<Enrollment> {
    let mut tx = db.begin().await?;
    query("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    let already: bool = query_scalar(
        "SELECT EXISTS(SELECT 1 FROM enrollments WHERE course_id = $1 AND student_id = $2)",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_one(&mut *tx)
    .await?;
    rules::check_enrollment(already)?;

    let id: i64 = query_scalar(
        "INSERT INTO enrollments (course_id, student_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_one(&mut *tx)
    .await?;
    let sql = format!("{ENROLLMENT_SELECT} WHERE e.id = $1");
    let enrollment = query_as::<_, Enrollment>(&sql)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(enrollment)
}

// --- lessons ---

const CONTENT_SELECT: &str = "SELECT id, title, slug, description FROM contents";

pub async fn contents_for_course(db: &Db, course_id: i64) -> Result<Vec<Content>> {
    let sql = format!("{CONTENT_SELECT} WHERE course_id = $1 ORDER BY id");
    Ok(query_as::<_, Content>(&sql)
        .bind(course_id)
        .fetch_all(db)
        .await?)
}

pub async fn content_by_slug(db: &Db, course_id: i64, slug: &str) -> Result<Option<Content>> {
    let sql = format!("{CONTENT_SELECT} WHERE course_id = $1 AND slug = $2");
    Ok(query_as::<_, Content>(&sql)
        .bind(course_id)
        .bind(slug)
        .fetch_optional(db)
        .await?)
}

pub async fn create_content(db: &Db, course_id: i64, req: &ContentReq) -> Result<Content> {
    Ok(query_as::<_, Content>(
        r#"
        INSERT INTO contents (course_id, title, slug, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, slug, description
        "#,
    )
    .bind(course_id)
    .bind(&req.title)
    .bind(text::slugify(&req.title))
    .bind(&req.description)
    .fetch_one(db)
    .await?)
}

pub async fn update_content(db: &Db, id: i64, req: &ContentReq) -> Result<Content> {
    Ok(query_as::<_, Content>(
        r#"
        UPDATE contents SET title = $2, slug = $3, description = $4
        WHERE id = $1
        RETURNING id, title, slug, description
        "#,
    )
    .bind(id)
    .bind(&req.title)
    .bind(text::slugify(&req.title))
    .bind(&req.description)
    .fetch_one(db)
    .await?)
}

pub async fn delete_content(db: &Db, id: i64) -> Result<()> {
    query("DELETE FROM contents WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

// --- assessments ---

const ASSESSMENT_VIEW_SELECT: &str = r#"
    SELECT a.id, a.title, a.description,
           COALESCE(ARRAY_AGG(q.id ORDER BY q.id) FILTER (WHERE q.id IS NOT NULL), '{}') AS questions
    FROM assessments a
    LEFT JOIN questions q ON q.assessment_id = a.id
"#;

pub async fn assessments_for_content(db: &Db, content_id: i64) -> Result<Vec<AssessmentView>> {
    let sql = format!("{ASSESSMENT_VIEW_SELECT} WHERE a.content_id = $1 GROUP BY a.id ORDER BY a.id");
    Ok(query_as::<_, AssessmentView>(&sql)
        .bind(content_id)
        .fetch_all(db)
        .await?)
}

pub async fn assessment_view(db: &Db, id: i64) -> Result<AssessmentView> {
    let sql = format!("{ASSESSMENT_VIEW_SELECT} WHERE a.id = $1 GROUP BY a.id");
    Ok(query_as::<_, AssessmentView>(&sql)
        .bind(id)
        .fetch_one(db)
        .await?)
}

pub async fn assessment_in_content(
    db: &Db,
    content_id: i64,
    id: i64,
) -> Result<Option<Assessment>> {
    Ok(query_as::<_, Assessment>(
        "SELECT id, title, description FROM assessments
         WHERE id = $1 AND content_id = $2",
    )
    .bind(id)
    .bind(content_id)
    .fetch_optional(db)
    .await?)
}

/// An assessment reached by id under a course path; `None` when it belongs
/// to another course.
pub async fn assessment_in_course(db: &Db, course_id: i64, id: i64) -> Result<Option<Assessment>> {
    Ok(query_as::<_, Assessment>(
        r#"
        SELECT a.id, a.title, a.description
        FROM assessments a JOIN contents ct ON ct.id = a.content_id
        WHERE a.id = $1 AND ct.course_id = $2
        "#,
    )
    .bind(id)
    .bind(course_id)
    .fetch_optional(db)
    .await?)
}

pub async fn create_assessment(db: &Db, content_id: i64, req: &AssessmentReq) -> Result<i64> {
    Ok(query_scalar(
        "INSERT INTO assessments (content_id, title, description) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(content_id)
    .bind(&req.title)
    .bind(&req.description)
    .fetch_one(db)
    .await?)
}

pub async fn update_assessment(db: &Db, id: i64, req: &AssessmentReq) -> Result<()> {
    query("UPDATE assessments SET title = $2, description = $3 WHERE id = $1")
        .bind(id)
        .bind(&req.title)
        .bind(&req.description)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete_assessment(db: &Db, id: i64) -> Result<()> {
    query("DELETE FROM assessments WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

// --- questions ---

const QUESTION_VIEW_SELECT: &str = r#"
    SELECT q.id, q.question_text,
           COALESCE(ARRAY_AGG(o.id ORDER BY o.id) FILTER (WHERE o.id IS NOT NULL), '{}') AS options
    FROM questions q
    LEFT JOIN options o ON o.question_id = q.id
"#;

pub async fn questions_for_assessment(db: &Db, assessment_id: i64) -> Result<Vec<QuestionView>> {
    let sql = format!("{QUESTION_VIEW_SELECT} WHERE q.assessment_id = $1 GROUP BY q.id ORDER BY q.id");
    Ok(query_as::<_, QuestionView>(&sql)
        .bind(assessment_id)
        .fetch_all(db)
        .await?)
}

pub async fn question_view(db: &Db, id: i64) -> Result<QuestionView> {
    let sql = format!("{QUESTION_VIEW_SELECT} WHERE q.id = $1 GROUP BY q.id");
    Ok(query_as::<_, QuestionView>(&sql)
        .bind(id)
        .fetch_one(db)
        .await?)
}

pub async fn question_in_assessment(
    db: &Db,
    assessment_id: i64,
    id: i64,
) -> Result<Option<Question>> {
    Ok(query_as::<_, Question>(
        "SELECT id, question_text FROM questions
         WHERE id = $1 AND assessment_id = $2",
    )
    .bind(id)
    .bind(assessment_id)
    .fetch_optional(db)
    .await?)
}

pub async fn create_question(db: &Db, assessment_id: i64, req: &QuestionReq) -> Result<i64> {
    Ok(query_scalar(
        "INSERT INTO questions (assessment_id, question_text) VALUES ($1, $2) RETURNING id",
    )
    .bind(assessment_id)
    .bind(&req.question_text)
    .fetch_one(db)
    .await?)
}

pub async fn update_question(db: &Db, id: i64, req: &QuestionReq) -> Result<()> {
    query("UPDATE questions SET question_text = $2 WHERE id = $1")
        .bind(id)
        .bind(&req.question_text)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn delete_question(db: &Db, id: i64) -> Result<()> {
    query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

// --- options ---

const OPTION_SELECT: &str = "SELECT id, question_id, option_text, is_correct FROM options";

pub async fn options_for_question(db: &Db, question_id: i64) -> Result<Vec<AnswerOption>> {
    let sql = format!("{OPTION_SELECT} WHERE question_id = $1 ORDER BY id");
    Ok(query_as::<_, AnswerOption>(&sql)
        .bind(question_id)
        .fetch_all(db)
        .await?)
}

pub async fn option_in_question(
    db: &Db,
    question_id: i64,
    id: i64,
) -> Result<Option<AnswerOption>> {
    let sql = format!("{OPTION_SELECT} WHERE id = $1 AND question_id = $2");
    Ok(query_as::<_, AnswerOption>(&sql)
        .bind(id)
        .bind(question_id)
        .fetch_optional(db)
        .await?)
}

pub async fn create_option(db: &Db, question_id: i64, req: &OptionReq) -> Result<AnswerOption> {
    let mut tx = db.begin().await?;
    query("SELECT id FROM questions WHERE id = $1 FOR UPDATE")
        .bind(question_id)
        .execute(&mut *tx)
        .await?;
    let sql = format!("{OPTION_SELECT} WHERE question_id = $1");
    let existing = query_as::<_, AnswerOption>(&sql)
        .bind(question_id)
        .fetch_all(&mut *tx)
        .await?;
    rules::check_new_option(&existing, &req.option_text, req.is_correct)?;

    let created = query_as::<_, AnswerOption>(
        r#"
        INSERT INTO options (question_id, option_text, is_correct)
        VALUES ($1, $2, $3)
        RETURNING id, question_id, option_text, is_correct
        "#,
    )
    .bind(question_id)
    .bind(&req.option_text)
    .bind(req.is_correct)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(created)
}

pub async fn update_option(
    db: &Db,
    question_id: i64,
    id: i64,
    req: &OptionReq,
) -> Result<AnswerOption> {
    let mut tx = db.begin().await?;
    query("SELECT id FROM questions WHERE id = $1 FOR UPDATE")
        .bind(question_id)
        .execute(&mut *tx)
        .await?;
    let sql = format!("{OPTION_SELECT} WHERE question_id = $1");
    let existing = query_as::<_, AnswerOption>(&sql)
        .bind(question_id)
        .fetch_all(&mut *tx)
        .await?;
    rules::check_option_update(&existing, id, &req.option_text, req.is_correct)?;

    let updated = query_as::<_, AnswerOption>(
        r#"
        UPDATE options SET option_text = $2, is_correct = $3
        WHERE id = $1
        RETURNING id, question_id, option_text, is_correct
        "#,
    )
    .bind(id)
    .bind(&req.option_text)
    .bind(req.is_correct)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(updated)
}

pub async fn delete_option(db: &Db, id: i64) -> Result<()> {
    query("DELETE FROM options WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

// --- messages ---

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.sender_id,
           s.username AS sender, r.username AS receiver, m.content, m."timestamp"
    FROM messages m
    JOIN users s ON s.id = m.sender_id
    JOIN users r ON r.id = m.receiver_id
"#;

/// Messages of the course the user sent or received.
pub async fn messages_for(db: &Db, course_id: i64, user_id: i64) -> Result<Vec<Message>> {
    let sql = format!(
        "{MESSAGE_SELECT} WHERE m.course_id = $1 AND (m.sender_id = $2 OR m.receiver_id = $2)
         ORDER BY m.\"timestamp\", m.id"
    );
    Ok(query_as::<_, Message>(&sql)
        .bind(course_id)
        .bind(user_id)
        .fetch_all(db)
        .await?)
}

pub async fn message_in_course(db: &Db, course_id: i64, id: i64) -> Result<Option<Message>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1 AND m.course_id = $2");
    Ok(query_as::<_, Message>(&sql)
        .bind(id)
        .bind(course_id)
        .fetch_optional(db)
        .await?)
}

async fn message_by_id(db: &Db, id: i64) -> Result<Message> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
    Ok(query_as::<_, Message>(&sql).bind(id).fetch_one(db).await?)
}

pub async fn create_message(
    db: &Db,
    course: &Course,
    sender_id: i64,
    req: &MessageReq,
) -> Result<Message> {
    let receiver_id: Option<i64> = query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(rules::normalize_username(&req.receiver))
        .fetch_optional(db)
        .await?;
    let receiver_id = receiver_id.ok_or_else(|| ApiError::field("receiver", "User not found."))?;
    rules::check_message(course.instructor_id, sender_id, receiver_id)?;

    let id: i64 = query_scalar(
        "INSERT INTO messages (sender_id, receiver_id, course_id, content)
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(course.id)
    .bind(&req.content)
    .fetch_one(db)
    .await?;
    message_by_id(db, id).await
}

pub async fn update_message(db: &Db, id: i64, content: &str) -> Result<Message> {
    query("UPDATE messages SET content = $2 WHERE id = $1")
        .bind(id)
        .bind(content)
        .execute(db)
        .await?;
    message_by_id(db, id).await
}

pub async fn delete_message(db: &Db, id: i64) -> Result<()> {
    query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::PgPool;

    fn rejection(err: ApiError) -> String {
        match err {
            ApiError::Validation(errs) => errs.to_string(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    async fn user(db: &Db, name: &str) -> User {
        register_user(db, name, &format!("{name}@example.com"), "x")
            .await
            .unwrap()
    }

    async fn instructor(db: &Db, name: &str) -> User {
        let u = user(db, name).await;
        create_instructor(db, u.id, "teaches").await.unwrap();
        u
    }

    fn course_req(title: &str) -> CourseReq {
        CourseReq {
            title: title.into(),
            description: "d".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        }
    }

    async fn question(db: &Db) -> i64 {
        let ada = instructor(db, "ada").await;
        let course = create_course(db, ada.id, &course_req("Rust 101")).await.unwrap();
        let lesson = ContentReq {
            title: "Ownership".into(),
            description: "moves".into(),
        };
        let content = create_content(db, course.id, &lesson).await.unwrap();
        let quiz = AssessmentReq {
            title: "Quiz".into(),
            description: "q".into(),
        };
        let assessment = create_assessment(db, content.id, &quiz).await.unwrap();
        let q = QuestionReq {
            question_text: "Capital of France?".into(),
        };
        create_question(db, assessment, &q).await.unwrap()
    }

    fn option(text: &str, is_correct: bool) -> OptionReq {
        OptionReq {
            option_text: text.into(),
            is_correct,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_email_is_rejected(db: PgPool) {
        user(&db, "ada").await;
        let err = register_user(&db, "grace", "ada@example.com", "x")
            .await
            .unwrap_err();
        assert_eq!(rejection(err), rules::EMAIL_TAKEN);

        let err = register_user(&db, "ada", "other@example.com", "x")
            .await
            .unwrap_err();
        assert!(rejection(err).starts_with("username: "));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn course_titles_are_unique_per_instructor(db: PgPool) {
        let ada = instructor(&db, "ada").await;
        create_course(&db, ada.id, &course_req("Rust 101")).await.unwrap();
        let err = create_course(&db, ada.id, &course_req("Rust 101"))
            .await
            .unwrap_err();
        assert_eq!(rejection(err), rules::COURSE_TITLE_TAKEN);

        let second = create_course(&db, ada.id, &course_req("Rust 201")).await.unwrap();
        let err = update_course(&db, &second, &course_req("Rust 101"))
            .await
            .unwrap_err();
        assert_eq!(rejection(err), rules::COURSE_TITLE_TAKEN);
        assert_eq!(courses_by_instructor(&db, ada.id).await.unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn same_title_elsewhere_collides_on_slug(db: PgPool) {
        let ada = instructor(&db, "ada").await;
        let grace = instructor(&db, "grace").await;
        create_course(&db, ada.id, &course_req("Rust 101")).await.unwrap();
        let err = create_course(&db, grace.id, &course_req("Rust 101"))
            .await
            .unwrap_err();
        assert!(rejection(err).starts_with("title: "));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn enrolling_twice_keeps_one_row(db: PgPool) {
        let ada = instructor(&db, "ada").await;
        let bob = user(&db, "bob").await;
        let course = create_course(&db, ada.id, &course_req("Rust 101")).await.unwrap();

        let enrollment = enroll(&db, course.id, bob.id).await.unwrap();
        assert_eq!(enrollment.student, "bob");
        assert_eq!(enrollment.course, "rust-101");

        let err = enroll(&db, course.id, bob.id).await.unwrap_err();
        assert_eq!(rejection(err), rules::ALREADY_ENROLLED);
        assert_eq!(enrollments_for_course(&db, course.id).await.unwrap().len(), 1);

        let student = Principal::User(Identity {
            user_id: bob.id,
            username: bob.username.clone(),
            is_staff: false,
            is_instructor: false,
        });
        let access = course_access(&db, &course, &student).await.unwrap();
        assert!(access.enrolled);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn fifth_option_is_rejected(db: PgPool) {
        let q = question(&db).await;
        for text in ["Paris", "Rome", "Berlin", "Madrid"] {
            create_option(&db, q, &option(text, false)).await.unwrap();
        }
        let err = create_option(&db, q, &option("Lisbon", false))
            .await
            .unwrap_err();
        assert_eq!(rejection(err), rules::TOO_MANY_OPTIONS);
        assert_eq!(options_for_question(&db, q).await.unwrap().len(), 4);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_option_text_is_rejected(db: PgPool) {
        let q = question(&db).await;
        create_option(&db, q, &option("Paris", false)).await.unwrap();
        let err = create_option(&db, q, &option("Paris", true)).await.unwrap_err();
        assert_eq!(rejection(err), rules::OPTION_EXISTS);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn only_one_correct_option(db: PgPool) {
        let q = question(&db).await;
        let paris = create_option(&db, q, &option("Paris", true)).await.unwrap();
        assert!(paris.is_correct);
        let rome = create_option(&db, q, &option("Rome", false)).await.unwrap();

        let err = create_option(&db, q, &option("Berlin", true)).await.unwrap_err();
        assert_eq!(rejection(err), rules::CORRECT_OPTION_EXISTS);

        let err = update_option(&db, q, rome.id, &option("Rome", true))
            .await
            .unwrap_err();
        assert_eq!(rejection(err), rules::CORRECT_OPTION_EXISTS);

        // re-saving the correct option itself is fine
        let resaved = update_option(&db, q, paris.id, &option("Paris!", true))
            .await
            .unwrap();
        assert_eq!(resaved.option_text, "Paris!");
        assert!(resaved.is_correct);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn storage_backs_the_single_correct_option(db: PgPool) {
        let q = question(&db).await;
        create_option(&db, q, &option("Paris", true)).await.unwrap();

        // a write that skips the rule still trips the partial index
        let raw = |text: &'static str, is_correct: bool| {
            query("INSERT INTO options (question_id, option_text, is_correct) VALUES ($1, $2, $3)")
                .bind(q)
                .bind(text)
                .bind(is_correct)
        };
        let err: ApiError = raw("Lyon", true).execute(&db).await.unwrap_err().into();
        assert_eq!(rejection(err), rules::CORRECT_OPTION_EXISTS);

        let err: ApiError = raw("Paris", false).execute(&db).await.unwrap_err().into();
        assert_eq!(rejection(err), rules::OPTION_EXISTS);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn messages_go_only_to_the_course_instructor(db: PgPool) {
        let ada = instructor(&db, "ada").await;
        let bob = user(&db, "bob").await;
        let eve = user(&db, "eve").await;
        let course = create_course(&db, ada.id, &course_req("Rust 101")).await.unwrap();

        let to = |receiver: &str| MessageReq {
            receiver: receiver.into(),
            content: "hello".into(),
        };
        let sent = create_message(&db, &course, bob.id, &to("ADA")).await.unwrap();
        assert_eq!(sent.receiver, "ada");
        assert_eq!(sent.sender, "bob");

        let err = create_message(&db, &course, bob.id, &to("eve")).await.unwrap_err();
        assert_eq!(rejection(err), rules::BAD_RECEIVER);
        let err = create_message(&db, &course, bob.id, &to("nobody")).await.unwrap_err();
        assert!(rejection(err).starts_with("receiver: "));

        assert_eq!(messages_for(&db, course.id, ada.id).await.unwrap().len(), 1);
        assert!(messages_for(&db, course.id, eve.id).await.unwrap().is_empty());
    }
}
