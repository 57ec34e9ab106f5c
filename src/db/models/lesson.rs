//! Lesson models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::parse_json_list;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    #[default]
    Video,
    Text,
    Quiz,
    Assignment,
}

impl LessonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonType::Video => "video",
            LessonType::Text => "text",
            LessonType::Quiz => "quiz",
            LessonType::Assignment => "assignment",
        }
    }
}

impl std::str::FromStr for LessonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(LessonType::Video),
            "text" => Ok(LessonType::Text),
            "quiz" => Ok(LessonType::Quiz),
            "assignment" => Ok(LessonType::Assignment),
            _ => Err("Invalid lesson type. Must be one of: video, text, quiz, assignment".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub course_id: String,
    pub sort_order: i64,
    pub lesson_type: String,
    pub video_url: String,
    pub video_id: String,
    /// Seconds
    pub duration: i64,
    pub transcript: String,
    pub text_content: String,
    /// JSON-encoded `Vec<Attachment>`
    pub attachments: String,
    pub is_free: bool,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContent {
    pub video_url: String,
    pub video_id: String,
    pub duration: i64,
    pub transcript: String,
    pub text_content: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub course_id: String,
    pub order: i64,
    #[serde(rename = "type")]
    pub lesson_type: String,
    pub content: LessonContent,
    pub is_free: bool,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Lesson> for LessonResponse {
    fn from(lesson: Lesson) -> Self {
        Self {
            content: LessonContent {
                video_url: lesson.video_url,
                video_id: lesson.video_id,
                duration: lesson.duration,
                transcript: lesson.transcript,
                text_content: lesson.text_content,
                attachments: parse_json_list(&lesson.attachments),
            },
            id: lesson.id,
            title: lesson.title,
            slug: lesson.slug,
            course_id: lesson.course_id,
            order: lesson.sort_order,
            lesson_type: lesson.lesson_type,
            is_free: lesson.is_free,
            is_published: lesson.is_published,
            created_at: lesson.created_at,
            updated_at: lesson.updated_at,
        }
    }
}

/// Public listing view: no video source, transcript or body text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub order: i64,
    #[serde(rename = "type")]
    pub lesson_type: String,
    pub duration: i64,
    pub is_free: bool,
    pub is_published: bool,
}

impl From<Lesson> for LessonSummary {
    fn from(lesson: Lesson) -> Self {
        Self {
            id: lesson.id,
            title: lesson.title,
            slug: lesson.slug,
            order: lesson.sort_order,
            lesson_type: lesson.lesson_type,
            duration: lesson.duration,
            is_free: lesson.is_free,
            is_published: lesson.is_published,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseRef {
    pub id: String,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct LessonDetail {
    pub lesson: LessonResponse,
    pub course: CourseRef,
}

#[derive(Debug, Serialize)]
pub struct LessonEnvelope {
    pub message: String,
    pub lesson: LessonResponse,
}

#[derive(Debug, Serialize)]
pub struct LessonList {
    pub lessons: Vec<LessonSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonContentInput {
    pub video_url: Option<String>,
    pub video_id: Option<String>,
    pub duration: Option<i64>,
    pub transcript: Option<String>,
    pub text_content: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateLessonRequest {
    pub title: String,
    pub course_id: String,
    pub order: Option<i64>,
    #[serde(rename = "type")]
    pub lesson_type: Option<String>,
    pub content: Option<LessonContentInput>,
    pub is_free: Option<bool>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateLessonRequest {
    pub title: Option<String>,
    pub order: Option<i64>,
    #[serde(rename = "type")]
    pub lesson_type: Option<String>,
    pub content: Option<LessonContentInput>,
    pub is_free: Option<bool>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonListQuery {
    pub course_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_is_an_explicit_update() {
        let req: UpdateLessonRequest =
            serde_json::from_str(r#"{"content":{"duration":0}}"#).unwrap();
        assert_eq!(req.content.unwrap().duration, Some(0));

        let req: UpdateLessonRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert!(req.content.is_none());
    }

    #[test]
    fn test_response_nests_content() {
        let lesson = Lesson {
            id: "l1".into(),
            title: "Intro".into(),
            slug: "intro".into(),
            course_id: "c1".into(),
            sort_order: 1,
            lesson_type: "video".into(),
            video_url: "https://v".into(),
            video_id: String::new(),
            duration: 90,
            transcript: String::new(),
            text_content: String::new(),
            attachments: r#"[{"name":"a","url":"u","type":"pdf","size":3}]"#.into(),
            is_free: true,
            is_published: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let json = serde_json::to_value(LessonResponse::from(lesson)).unwrap();
        assert_eq!(json["order"], 1);
        assert_eq!(json["type"], "video");
        assert_eq!(json["courseId"], "c1");
        assert_eq!(json["content"]["duration"], 90);
        assert_eq!(json["content"]["attachments"][0]["type"], "pdf");
    }
}
