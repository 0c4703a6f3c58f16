use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::text;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Instructor {
    #[serde(skip_serializing)]
    pub user_id: i64,
    #[serde(rename = "user")]
    pub username: String,
    pub bio: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct InstructorView {
    #[serde(flatten)]
    pub instructor: Instructor,
    pub learners: Vec<String>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(skip)]
    pub instructor_id: i64,
    // instructor username
    pub instructor: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Enrollment {
    pub id: i64,
    // course slug and student username
    pub course: String,
    pub student: String,
    pub enrollment_date: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Content {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ContentView {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub formatted_description: String,
}

impl From<Content> for ContentView {
    fn from(c: Content) -> Self {
        let formatted_description = text::render_markdown(&c.description);
        Self {
            title: c.title,
            slug: c.slug,
            description: c.description,
            formatted_description,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Assessment {
    pub id: i64,
    pub title: String,
    pub description: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct AssessmentView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub questions: Vec<i64>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct QuestionView {
    pub id: i64,
    pub question_text: String,
    pub options: Vec<i64>,
}

/// One answer choice of a question.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub id: i64,
    #[serde(skip_serializing)]
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Message {
    pub id: i64,
    #[serde(skip_serializing)]
    pub sender_id: i64,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// --- request bodies ---
//
// `*Req` bodies carry the full writable field set (POST, PUT); `*Patch`
// bodies carry any subset (PATCH) and are merged over the stored row.

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct InstructorReq {
    pub bio: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct InstructorPatch {
    pub bio: Option<String>,
}

impl InstructorPatch {
    pub fn merge(self, cur: &Instructor) -> InstructorReq {
        InstructorReq {
            bio: self.bio.unwrap_or_else(|| cur.bio.clone()),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CourseReq {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl CoursePatch {
    pub fn merge(self, cur: &Course) -> CourseReq {
        CourseReq {
            title: self.title.unwrap_or_else(|| cur.title.clone()),
            description: self.description.unwrap_or_else(|| cur.description.clone()),
            start_date: self.start_date.unwrap_or(cur.start_date),
            end_date: self.end_date.unwrap_or(cur.end_date),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ContentReq {
    pub title: String,
    pub description: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ContentPatch {
    pub fn merge(self, cur: &Content) -> ContentReq {
        ContentReq {
            title: self.title.unwrap_or_else(|| cur.title.clone()),
            description: self.description.unwrap_or_else(|| cur.description.clone()),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AssessmentReq {
    pub title: String,
    pub description: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AssessmentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl AssessmentPatch {
    pub fn merge(self, cur: &Assessment) -> AssessmentReq {
        AssessmentReq {
            title: self.title.unwrap_or_else(|| cur.title.clone()),
            description: self.description.unwrap_or_else(|| cur.description.clone()),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct QuestionReq {
    pub question_text: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct QuestionPatch {
    pub question_text: Option<String>,
}

impl QuestionPatch {
    pub fn merge(self, cur: &Question) -> QuestionReq {
        QuestionReq {
            question_text: self
                .question_text
                .unwrap_or_else(|| cur.question_text.clone()),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct OptionReq {
    pub option_text: String,
    pub is_correct: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct OptionPatch {
    pub option_text: Option<String>,
    pub is_correct: Option<bool>,
}

impl OptionPatch {
    pub fn merge(self, cur: &AnswerOption) -> OptionReq {
        OptionReq {
            option_text: self.option_text.unwrap_or_else(|| cur.option_text.clone()),
            is_correct: self.is_correct.unwrap_or(cur.is_correct),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct MessageReq {
    // receiver username
    pub receiver: String,
    pub content: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct MessageEditReq {
    pub content: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MessagePatch {
    pub content: Option<String>,
}

impl MessagePatch {
    pub fn merge(self, cur: &Message) -> MessageEditReq {
        MessageEditReq {
            content: self.content.unwrap_or_else(|| cur.content.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> Course {
        Course {
            id: 1,
            title: "Rust 101".into(),
            slug: "rust-101".into(),
            description: "basics".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            instructor_id: 7,
            instructor: "ada".into(),
        }
    }

    #[test]
    fn course_patch_keeps_untouched_fields() {
        let patch: CoursePatch = serde_json::from_str(r#"{"description":"updated"}"#).unwrap();
        let merged = patch.merge(&course());
        assert_eq!(merged.title, "Rust 101");
        assert_eq!(merged.description, "updated");
        assert_eq!(merged.end_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn course_serializes_instructor_username_only() {
        let v = serde_json::to_value(course()).unwrap();
        assert_eq!(v["instructor"], "ada");
        assert_eq!(v["start_date"], "2026-01-10");
        assert!(v.get("instructor_id").is_none());
    }

    #[test]
    fn option_patch_flips_correct_flag() {
        let cur = AnswerOption {
            id: 3,
            question_id: 1,
            option_text: "42".into(),
            is_correct: false,
        };
        let patch: OptionPatch = serde_json::from_str(r#"{"is_correct":true}"#).unwrap();
        let merged = patch.merge(&cur);
        assert_eq!(merged.option_text, "42");
        assert!(merged.is_correct);
    }

    #[test]
    fn content_view_renders_description() {
        let view = ContentView::from(Content {
            id: 1,
            title: "Ownership".into(),
            slug: "ownership".into(),
            description: "**moves**".into(),
        });
        assert!(view.formatted_description.contains("<strong>moves</strong>"));
        assert_eq!(view.description, "**moves**");
    }

    #[test]
    fn missing_register_fields_default_to_empty() {
        let req: RegisterReq = serde_json::from_str(r#"{"username":"Bob"}"#).unwrap();
        assert_eq!(req.username, "Bob");
        assert!(req.email.is_empty());
    }
}
