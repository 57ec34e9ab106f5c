//! Course models, closed enums and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use super::common::{parse_json_list, Pagination};
use super::lesson::LessonResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseCategory {
    Programming,
    Design,
    Business,
    Marketing,
    DataScience,
    Other,
}

impl CourseCategory {
    pub const ALL: [CourseCategory; 6] = [
        CourseCategory::Programming,
        CourseCategory::Design,
        CourseCategory::Business,
        CourseCategory::Marketing,
        CourseCategory::DataScience,
        CourseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CourseCategory::Programming => "programming",
            CourseCategory::Design => "design",
            CourseCategory::Business => "business",
            CourseCategory::Marketing => "marketing",
            CourseCategory::DataScience => "data-science",
            CourseCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for CourseCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CourseCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid category. Must be one of: {}",
                    CourseCategory::ALL.map(|c| c.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for CourseLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(CourseLevel::Beginner),
            "intermediate" => Ok(CourseLevel::Intermediate),
            "advanced" => Ok(CourseLevel::Advanced),
            _ => Err("Invalid level. Must be one of: beginner, intermediate, advanced".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingType {
    Free,
    Paid,
}

impl PricingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingType::Free => "free",
            PricingType::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PricingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PricingType::Free),
            "paid" => Ok(PricingType::Paid),
            _ => Err("Invalid pricing type. Must be one of: free, paid".to_string()),
        }
    }
}

/// Course lifecycle states
///
/// ```text
/// draft ──► review ──► published ──► archived
///   ▲  ╲                  │              │
///   │   ╲─────────────────┤              │
///   └─────────────────────┴──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Review,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A course cannot move from {from} to {to}")]
    NotAllowed { from: CourseStatus, to: CourseStatus },
    #[error("Add at least one lesson before publishing")]
    NoLessons,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "draft",
            CourseStatus::Review => "review",
            CourseStatus::Published => "published",
            CourseStatus::Archived => "archived",
        }
    }

    pub fn can_transition_to(&self, next: CourseStatus) -> bool {
        use CourseStatus::*;
        matches!(
            (self, next),
            (Draft, Review)
                | (Draft, Published)
                | (Review, Published)
                | (Review, Draft)
                | (Published, Draft)
                | (Published, Archived)
                | (Archived, Draft)
        ) || *self == next
    }

    /// Validate a move to `next`. `live_lessons` must be a fresh count of the
    /// course's lessons, not the stored counter.
    pub fn check_transition(
        &self,
        next: CourseStatus,
        live_lessons: i64,
    ) -> Result<(), TransitionError> {
        if !self.can_transition_to(next) {
            return Err(TransitionError::NotAllowed {
                from: *self,
                to: next,
            });
        }
        if next == CourseStatus::Published && *self != next && live_lessons < 1 {
            return Err(TransitionError::NoLessons);
        }
        Ok(())
    }

    /// Target of the single publish/unpublish action
    pub fn toggle_target(&self) -> Result<CourseStatus, TransitionError> {
        match self {
            CourseStatus::Published => Ok(CourseStatus::Draft),
            CourseStatus::Draft | CourseStatus::Review => Ok(CourseStatus::Published),
            CourseStatus::Archived => Err(TransitionError::NotAllowed {
                from: CourseStatus::Archived,
                to: CourseStatus::Published,
            }),
        }
    }
}

impl std::fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CourseStatus::Draft),
            "review" => Ok(CourseStatus::Review),
            "published" => Ok(CourseStatus::Published),
            "archived" => Ok(CourseStatus::Archived),
            _ => Err("Invalid status. Must be one of: draft, review, published, archived".to_string()),
        }
    }
}

impl From<String> for CourseStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(CourseStatus::Draft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub short_description: Option<String>,
    pub thumbnail: Option<String>,
    pub trailer: Option<String>,
    pub instructor_id: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub level: String,
    pub language: String,
    pub pricing_type: String,
    pub pricing_amount: f64,
    pub pricing_currency: String,
    pub learning_outcomes: String,
    pub requirements: String,
    pub target_audience: String,
    /// Sum of lesson durations in seconds (denormalized)
    pub total_duration: i64,
    /// Number of lessons (denormalized)
    pub total_lessons: i64,
    pub status: String,
    pub rating_average: f64,
    pub rating_count: i64,
    pub enrollment_count: i64,
    pub tags: String,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Course {
    pub fn status_enum(&self) -> CourseStatus {
        CourseStatus::from(self.status.clone())
    }
}

/// Course row joined with its instructor's public fields
#[derive(Debug, Clone, FromRow)]
pub struct CourseWithInstructor {
    #[sqlx(flatten)]
    pub course: Course,
    pub instructor_name: String,
    pub instructor_email: String,
    pub instructor_image: Option<String>,
}

/// SELECT prefix producing `CourseWithInstructor` rows
pub const COURSE_WITH_INSTRUCTOR_SELECT: &str = r#"
    SELECT c.*, u.name AS instructor_name, u.email AS instructor_email, u.image AS instructor_image
    FROM courses c
    INNER JOIN users u ON u.id = c.instructor_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructorSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(rename = "type")]
    pub pricing_type: String,
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseContent {
    pub learning_outcomes: Vec<String>,
    pub requirements: Vec<String>,
    pub target_audience: Vec<String>,
    pub total_duration: i64,
    pub total_lessons: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ratings {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub short_description: Option<String>,
    pub thumbnail: Option<String>,
    pub trailer: Option<String>,
    pub instructor: InstructorSummary,
    pub category: String,
    pub subcategory: Option<String>,
    pub level: String,
    pub language: String,
    pub pricing: Pricing,
    pub content: CourseContent,
    pub status: CourseStatus,
    pub is_published: bool,
    pub ratings: Ratings,
    pub enrollment_count: i64,
    pub tags: Vec<String>,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CourseWithInstructor> for CourseResponse {
    fn from(row: CourseWithInstructor) -> Self {
        let course = row.course;
        let status = course.status_enum();
        Self {
            instructor: InstructorSummary {
                id: course.instructor_id,
                name: row.instructor_name,
                email: row.instructor_email,
                image: row.instructor_image,
            },
            pricing: Pricing {
                pricing_type: course.pricing_type,
                amount: course.pricing_amount,
                currency: course.pricing_currency,
            },
            content: CourseContent {
                learning_outcomes: parse_json_list(&course.learning_outcomes),
                requirements: parse_json_list(&course.requirements),
                target_audience: parse_json_list(&course.target_audience),
                total_duration: course.total_duration,
                total_lessons: course.total_lessons,
            },
            ratings: Ratings {
                average: course.rating_average,
                count: course.rating_count,
            },
            tags: parse_json_list(&course.tags),
            status,
            is_published: status == CourseStatus::Published,
            id: course.id,
            title: course.title,
            slug: course.slug,
            description: course.description,
            short_description: course.short_description,
            thumbnail: course.thumbnail,
            trailer: course.trailer,
            category: course.category,
            subcategory: course.subcategory,
            level: course.level,
            language: course.language,
            enrollment_count: course.enrollment_count,
            published_at: course.published_at,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingInput {
    #[serde(rename = "type")]
    pub pricing_type: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

/// Client-editable parts of `content`; the lesson counters are not accepted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseContentInput {
    pub learning_outcomes: Option<Vec<String>>,
    pub requirements: Option<Vec<String>>,
    pub target_audience: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: String,
    pub short_description: Option<String>,
    pub thumbnail: Option<String>,
    pub trailer: Option<String>,
    pub category: String,
    pub subcategory: Option<String>,
    pub level: String,
    pub language: Option<String>,
    pub pricing: Option<PricingInput>,
    pub content: Option<CourseContentInput>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub thumbnail: Option<String>,
    pub trailer: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub level: Option<String>,
    pub language: Option<String>,
    pub pricing: Option<PricingInput>,
    pub content: Option<CourseContentInput>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseListQuery {
    pub category: Option<String>,
    pub level: Option<String>,
    pub search: Option<String>,
    pub instructor_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CourseList {
    pub courses: Vec<CourseResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    pub course: CourseResponse,
    pub lessons: Vec<LessonResponse>,
}

#[derive(Debug, Serialize)]
pub struct CourseEnvelope {
    pub message: String,
    pub course: CourseResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use CourseStatus::*;

    #[test]
    fn test_category_round_trip_strings() {
        assert_eq!("data-science".parse::<CourseCategory>(), Ok(CourseCategory::DataScience));
        assert!("cooking".parse::<CourseCategory>().unwrap_err().contains("data-science"));
    }

    #[test]
    fn test_forward_transitions() {
        assert!(Draft.can_transition_to(Review));
        assert!(Review.can_transition_to(Published));
        assert!(Published.can_transition_to(Archived));
        assert!(Published.can_transition_to(Draft));
        assert!(Archived.can_transition_to(Draft));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!Archived.can_transition_to(Published));
        assert!(!Draft.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Review));
        assert_eq!(
            Archived.check_transition(Published, 5),
            Err(TransitionError::NotAllowed { from: Archived, to: Published })
        );
    }

    #[test]
    fn test_publish_requires_lessons() {
        assert_eq!(Draft.check_transition(Published, 0), Err(TransitionError::NoLessons));
        assert_eq!(Review.check_transition(Published, 0), Err(TransitionError::NoLessons));
        assert!(Draft.check_transition(Published, 1).is_ok());
        // Staying published is not a new publication.
        assert!(Published.check_transition(Published, 0).is_ok());
    }

    #[test]
    fn test_toggle_target() {
        assert_eq!(Published.toggle_target(), Ok(Draft));
        assert_eq!(Draft.toggle_target(), Ok(Published));
        assert_eq!(Review.toggle_target(), Ok(Published));
        assert!(Archived.toggle_target().is_err());
    }
}
