//! Course endpoints: listing, authoring and the publish lifecycle.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::{query::QueryAs, sqlite::SqliteArguments, Sqlite, SqliteConnection};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiQuery};
use super::guard::{load_owned_course, require_course_author};
use super::metrics;
use super::validation::{
    validate_category, validate_description, validate_level, validate_pricing, validate_tags,
    validate_title,
};
use crate::db::{
    begin_write,
    common::{now, serialize_json_list},
    counters,
    slugs::{allocate, with_slug_retry, SlugScope, SlugWriteError},
    Course, CourseDetail, CourseEnvelope, CourseList, CourseListQuery, CourseResponse,
    CourseStatus, CourseWithInstructor, CreateCourseRequest, DbPool, Lesson, LessonResponse,
    Pagination, PricingType, TransitionError, UpdateCourseRequest, User,
    COURSE_WITH_INSTRUCTOR_SELECT,
};
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: i64 = 12;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Parse a positive integer query value, falling back on anything else
fn parse_positive(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

/// Escape LIKE wildcards so a search term matches literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Resolved list filters; `None` means "do not filter on this column"
#[derive(Debug, Default, PartialEq)]
struct CourseFilter {
    category: Option<String>,
    level: Option<String>,
    instructor_id: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

const FILTER_WHERE: &str = r#"
    WHERE (? IS NULL OR c.category = ?)
      AND (? IS NULL OR c.level = ?)
      AND (? IS NULL OR c.instructor_id = ?)
      AND (? IS NULL OR c.status = ?)
      AND (? IS NULL
           OR c.title LIKE ? ESCAPE '\'
           OR c.description LIKE ? ESCAPE '\'
           OR c.tags LIKE ? ESCAPE '\')
"#;

impl CourseFilter {
    fn from_query(q: &CourseListQuery) -> Result<Self, ApiError> {
        let keep = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "all")
                .map(str::to_string)
        };

        let status = match q.status.as_deref().map(str::trim) {
            None | Some("") => Some(CourseStatus::Published.as_str().to_string()),
            Some("all") => None,
            Some(raw) => {
                let status: CourseStatus = raw
                    .parse()
                    .map_err(|e: String| ApiError::validation_field("status", e))?;
                Some(status.as_str().to_string())
            }
        };

        Ok(Self {
            category: keep(&q.category),
            level: keep(&q.level),
            instructor_id: q
                .instructor_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            status,
            search: q
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(like_pattern),
        })
    }

    fn bind<'q, O>(
        &'q self,
        query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        query
            .bind(self.category.as_deref())
            .bind(self.category.as_deref())
            .bind(self.level.as_deref())
            .bind(self.level.as_deref())
            .bind(self.instructor_id.as_deref())
            .bind(self.instructor_id.as_deref())
            .bind(self.status.as_deref())
            .bind(self.status.as_deref())
            .bind(self.search.as_deref())
            .bind(self.search.as_deref())
            .bind(self.search.as_deref())
            .bind(self.search.as_deref())
    }
}

/// GET /api/courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<CourseListQuery>,
) -> Result<Json<CourseList>, ApiError> {
    let filter = CourseFilter::from_query(&query)?;
    let page = parse_positive(query.page.as_deref(), 1);
    let limit = parse_positive(query.limit.as_deref(), DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(limit);

    let list_sql = format!(
        "{} {} ORDER BY c.created_at DESC LIMIT ? OFFSET ?",
        COURSE_WITH_INSTRUCTOR_SELECT, FILTER_WHERE
    );
    let rows: Vec<CourseWithInstructor> = filter
        .bind(sqlx::query_as(&list_sql))
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    let count_sql = format!("SELECT COUNT(*) FROM courses c {}", FILTER_WHERE);
    let (total,): (i64,) = filter
        .bind(sqlx::query_as(&count_sql))
        .fetch_one(&state.db)
        .await?;

    Ok(Json(CourseList {
        courses: rows.into_iter().map(CourseResponse::from).collect(),
        pagination: Pagination::new(page, limit, total),
    }))
}

async fn load_course_response(pool: &DbPool, id: &str) -> Result<CourseResponse, ApiError> {
    let sql = format!("{} WHERE c.id = ?", COURSE_WITH_INSTRUCTOR_SELECT);
    let row: Option<CourseWithInstructor> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(CourseResponse::from)
        .ok_or_else(|| ApiError::not_found("Course not found"))
}

/// GET /api/courses/:id_or_slug
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<CourseDetail>, ApiError> {
    let sql = format!(
        "{} WHERE c.id = ? OR c.slug = ? LIMIT 1",
        COURSE_WITH_INSTRUCTOR_SELECT
    );
    let row: Option<CourseWithInstructor> = sqlx::query_as(&sql)
        .bind(&id_or_slug)
        .bind(&id_or_slug)
        .fetch_optional(&state.db)
        .await?;
    let course = row.ok_or_else(|| ApiError::not_found("Course not found"))?;

    let lessons: Vec<Lesson> = sqlx::query_as(
        "SELECT * FROM lessons WHERE course_id = ? ORDER BY sort_order, created_at",
    )
    .bind(&course.course.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(CourseDetail {
        course: course.into(),
        lessons: lessons.into_iter().map(LessonResponse::from).collect(),
    }))
}

/// Column values written by create and update
#[derive(Debug, Clone)]
struct CourseFields {
    title: String,
    description: String,
    short_description: Option<String>,
    thumbnail: Option<String>,
    trailer: Option<String>,
    category: String,
    subcategory: Option<String>,
    level: String,
    language: String,
    pricing_type: String,
    pricing_amount: f64,
    pricing_currency: String,
    learning_outcomes: String,
    requirements: String,
    target_audience: String,
    tags: String,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn validate_create_request(req: &CreateCourseRequest) -> Result<CourseFields, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_title(&req.title) {
        errors.add("title", e);
    }
    if let Err(e) = validate_description(&req.description) {
        errors.add("description", e);
    }
    if let Err(e) = validate_category(&req.category) {
        errors.add("category", e);
    }
    if let Err(e) = validate_level(&req.level) {
        errors.add("level", e);
    }

    let pricing = req.pricing.clone().unwrap_or_default();
    let pricing_type = pricing.pricing_type.unwrap_or_else(|| "free".to_string());
    let pricing_amount = pricing.amount.unwrap_or(0.0);
    if let Err(e) = validate_pricing(&pricing_type, pricing_amount) {
        errors.add("pricing", e);
    }

    let tags = req.tags.clone().unwrap_or_default();
    if let Err(e) = validate_tags(&tags) {
        errors.add("tags", e);
    }
    errors.finish()?;

    let content = req.content.clone().unwrap_or_default();
    Ok(CourseFields {
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        short_description: trimmed(req.short_description.as_deref()),
        thumbnail: trimmed(req.thumbnail.as_deref()),
        trailer: trimmed(req.trailer.as_deref()),
        category: req.category.clone(),
        subcategory: trimmed(req.subcategory.as_deref()),
        level: req.level.clone(),
        language: trimmed(req.language.as_deref()).unwrap_or_else(|| "English".to_string()),
        pricing_type,
        pricing_amount,
        pricing_currency: trimmed(pricing.currency.as_deref()).unwrap_or_else(|| "USD".to_string()),
        learning_outcomes: serialize_json_list(&content.learning_outcomes.unwrap_or_default()),
        requirements: serialize_json_list(&content.requirements.unwrap_or_default()),
        target_audience: serialize_json_list(&content.target_audience.unwrap_or_default()),
        tags: serialize_json_list(&tags),
    })
}

/// POST /api/courses
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(req): ApiJson<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseEnvelope>), ApiError> {
    require_course_author(&user)?;
    let fields = validate_create_request(&req)?;

    let db = &state.db;
    let fields_ref = &fields;
    let instructor_id = user.id.as_str();

    let (id, slug) = with_slug_retry(move || async move {
        let id = Uuid::new_v4().to_string();
        let ts = now();
        let mut tx = begin_write(db).await?;
        let slug = allocate(&mut tx, SlugScope::Courses { exclude: None }, &fields_ref.title).await?;

        sqlx::query(
            r#"
            INSERT INTO courses (
                id, title, slug, description, short_description, thumbnail, trailer,
                instructor_id, category, subcategory, level, language,
                pricing_type, pricing_amount, pricing_currency,
                learning_outcomes, requirements, target_audience, tags,
                status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&fields_ref.title)
        .bind(&slug)
        .bind(&fields_ref.description)
        .bind(&fields_ref.short_description)
        .bind(&fields_ref.thumbnail)
        .bind(&fields_ref.trailer)
        .bind(instructor_id)
        .bind(&fields_ref.category)
        .bind(&fields_ref.subcategory)
        .bind(&fields_ref.level)
        .bind(&fields_ref.language)
        .bind(&fields_ref.pricing_type)
        .bind(fields_ref.pricing_amount)
        .bind(&fields_ref.pricing_currency)
        .bind(&fields_ref.learning_outcomes)
        .bind(&fields_ref.requirements)
        .bind(&fields_ref.target_audience)
        .bind(&fields_ref.tags)
        .bind(&ts)
        .bind(&ts)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok::<_, SlugWriteError>((id, slug))
    })
    .await?;

    metrics::record_course_created();
    info!(course_id = %id, slug = %slug, instructor_id = %user.id, "Course created");

    let course = load_course_response(&state.db, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CourseEnvelope {
            message: "Course created successfully".to_string(),
            course,
        }),
    ))
}

fn merge_update(course: &Course, req: &UpdateCourseRequest) -> Result<CourseFields, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(title) = &req.title {
        if let Err(e) = validate_title(title) {
            errors.add("title", e);
        }
    }
    if let Some(description) = &req.description {
        if let Err(e) = validate_description(description) {
            errors.add("description", e);
        }
    }
    if let Some(category) = &req.category {
        if let Err(e) = validate_category(category) {
            errors.add("category", e);
        }
    }
    if let Some(level) = &req.level {
        if let Err(e) = validate_level(level) {
            errors.add("level", e);
        }
    }

    let pricing = req.pricing.clone().unwrap_or_default();
    let pricing_type = pricing
        .pricing_type
        .clone()
        .unwrap_or_else(|| course.pricing_type.clone());
    let pricing_amount = match pricing.amount {
        Some(amount) => amount,
        None if pricing_type == PricingType::Free.as_str() => 0.0,
        None => course.pricing_amount,
    };
    if let Err(e) = validate_pricing(&pricing_type, pricing_amount) {
        errors.add("pricing", e);
    }

    if let Some(tags) = &req.tags {
        if let Err(e) = validate_tags(tags) {
            errors.add("tags", e);
        }
    }
    errors.finish()?;

    let content = req.content.clone().unwrap_or_default();
    let list_or = |new: Option<Vec<String>>, old: &str| match new {
        Some(items) => serialize_json_list(&items),
        None => old.to_string(),
    };

    Ok(CourseFields {
        title: req
            .title
            .as_deref()
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| course.title.clone()),
        description: req
            .description
            .as_deref()
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| course.description.clone()),
        short_description: match &req.short_description {
            Some(s) => trimmed(Some(s.as_str())),
            None => course.short_description.clone(),
        },
        thumbnail: match &req.thumbnail {
            Some(s) => trimmed(Some(s.as_str())),
            None => course.thumbnail.clone(),
        },
        trailer: match &req.trailer {
            Some(s) => trimmed(Some(s.as_str())),
            None => course.trailer.clone(),
        },
        category: req.category.clone().unwrap_or_else(|| course.category.clone()),
        subcategory: match &req.subcategory {
            Some(s) => trimmed(Some(s.as_str())),
            None => course.subcategory.clone(),
        },
        level: req.level.clone().unwrap_or_else(|| course.level.clone()),
        language: trimmed(req.language.as_deref()).unwrap_or_else(|| course.language.clone()),
        pricing_type,
        pricing_amount,
        pricing_currency: trimmed(pricing.currency.as_deref())
            .unwrap_or_else(|| course.pricing_currency.clone()),
        learning_outcomes: list_or(content.learning_outcomes, &course.learning_outcomes),
        requirements: list_or(content.requirements, &course.requirements),
        target_audience: list_or(content.target_audience, &course.target_audience),
        tags: list_or(req.tags.clone(), &course.tags),
    })
}

/// `published_at` after moving from `from` to `to`
fn next_published_at(current: Option<&str>, from: CourseStatus, to: CourseStatus) -> Option<String> {
    match to {
        CourseStatus::Published if from != CourseStatus::Published => Some(now()),
        CourseStatus::Draft => None,
        _ => current.map(str::to_string),
    }
}

/// Validate a status move against a fresh lesson count inside `conn`'s transaction
async fn checked_transition(
    conn: &mut SqliteConnection,
    course: &Course,
    to: CourseStatus,
) -> Result<Result<Option<String>, TransitionError>, sqlx::Error> {
    let from = course.status_enum();
    let live = if to == CourseStatus::Published && from != to {
        counters::live_lesson_count(conn, &course.id).await?
    } else {
        0
    };
    Ok(from
        .check_transition(to, live)
        .map(|()| next_published_at(course.published_at.as_deref(), from, to)))
}

/// PUT /api/courses/:id
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
    ApiJson(req): ApiJson<UpdateCourseRequest>,
) -> Result<Json<CourseEnvelope>, ApiError> {
    let course = load_owned_course(&state.db, &user, &id).await?;
    let fields = merge_update(&course, &req)?;

    let target_status = match req.status.as_deref() {
        Some(raw) => raw
            .parse::<CourseStatus>()
            .map_err(|e| ApiError::validation_field("status", e))?,
        None => course.status_enum(),
    };
    // An unchanged title keeps its slug.
    let reslug = fields.title != course.title;

    let db = &state.db;
    let course_ref = &course;
    let fields_ref = &fields;

    with_slug_retry(move || async move {
        let mut tx = begin_write(db).await?;

        let published_at = match checked_transition(&mut tx, course_ref, target_status).await? {
            Ok(published_at) => published_at,
            Err(e) => return Ok(Err(ApiError::from(e))),
        };

        let slug = if reslug {
            allocate(
                &mut tx,
                SlugScope::Courses {
                    exclude: Some(course_ref.id.as_str()),
                },
                &fields_ref.title,
            )
            .await?
        } else {
            course_ref.slug.clone()
        };

        sqlx::query(
            r#"
            UPDATE courses SET
                title = ?, slug = ?, description = ?, short_description = ?, thumbnail = ?,
                trailer = ?, category = ?, subcategory = ?, level = ?, language = ?,
                pricing_type = ?, pricing_amount = ?, pricing_currency = ?,
                learning_outcomes = ?, requirements = ?, target_audience = ?, tags = ?,
                status = ?, published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields_ref.title)
        .bind(&slug)
        .bind(&fields_ref.description)
        .bind(&fields_ref.short_description)
        .bind(&fields_ref.thumbnail)
        .bind(&fields_ref.trailer)
        .bind(&fields_ref.category)
        .bind(&fields_ref.subcategory)
        .bind(&fields_ref.level)
        .bind(&fields_ref.language)
        .bind(&fields_ref.pricing_type)
        .bind(fields_ref.pricing_amount)
        .bind(&fields_ref.pricing_currency)
        .bind(&fields_ref.learning_outcomes)
        .bind(&fields_ref.requirements)
        .bind(&fields_ref.target_audience)
        .bind(&fields_ref.tags)
        .bind(target_status.as_str())
        .bind(&published_at)
        .bind(now())
        .bind(&course_ref.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok::<_, SlugWriteError>(Ok(()))
    })
    .await??;

    info!(course_id = %id, user_id = %user.id, status = %target_status, "Course updated");

    let course = load_course_response(&state.db, &id).await?;
    Ok(Json(CourseEnvelope {
        message: "Course updated successfully".to_string(),
        course,
    }))
}

/// DELETE /api/courses/:id
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
) -> Result<Json<serde_json::Value>, ApiError> {
    let course = load_owned_course(&state.db, &user, &id).await?;

    let mut tx = begin_write(&state.db).await?;
    let lessons = sqlx::query("DELETE FROM lessons WHERE course_id = ?")
        .bind(&course.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(&course.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(course_id = %course.id, lessons, user_id = %user.id, "Course deleted");

    Ok(Json(json!({ "message": "Course deleted successfully" })))
}

/// POST /api/courses/:id/publish
///
/// Published courses go back to draft; draft and review courses are published.
pub async fn toggle_publish(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
) -> Result<Json<CourseEnvelope>, ApiError> {
    let course = load_owned_course(&state.db, &user, &id).await?;
    let target = course.status_enum().toggle_target()?;

    let mut tx = begin_write(&state.db).await?;
    let published_at = checked_transition(&mut tx, &course, target).await??;
    sqlx::query("UPDATE courses SET status = ?, published_at = ?, updated_at = ? WHERE id = ?")
        .bind(target.as_str())
        .bind(&published_at)
        .bind(now())
        .bind(&course.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    metrics::record_publish_toggle(target);
    info!(course_id = %course.id, from = %course.status_enum(), to = %target, "Course publish toggled");

    let message = if target == CourseStatus::Published {
        "Course published successfully"
    } else {
        "Course unpublished successfully"
    };
    let course = load_course_response(&state.db, &id).await?;
    Ok(Json(CourseEnvelope {
        message: message.to_string(),
        course,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive_is_lenient() {
        assert_eq!(parse_positive(None, 12), 12);
        assert_eq!(parse_positive(Some("3"), 1), 3);
        assert_eq!(parse_positive(Some("abc"), 1), 1);
        assert_eq!(parse_positive(Some("0"), 1), 1);
        assert_eq!(parse_positive(Some("-4"), 12), 12);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }

    #[test]
    fn test_filter_defaults_to_published() {
        let filter = CourseFilter::from_query(&CourseListQuery::default()).unwrap();
        assert_eq!(filter.status.as_deref(), Some("published"));
        assert!(filter.category.is_none());
    }

    #[test]
    fn test_filter_all_disables_columns() {
        let q = CourseListQuery {
            category: Some("all".into()),
            level: Some("all".into()),
            status: Some("all".into()),
            ..Default::default()
        };
        assert_eq!(CourseFilter::from_query(&q).unwrap(), CourseFilter::default());

        let q = CourseListQuery {
            status: Some("retired".into()),
            ..Default::default()
        };
        assert!(CourseFilter::from_query(&q).is_err());
    }

    #[test]
    fn test_next_published_at() {
        use CourseStatus::*;
        assert!(next_published_at(None, Draft, Published).is_some());
        assert_eq!(next_published_at(Some("t"), Published, Draft), None);
        assert_eq!(next_published_at(Some("t"), Published, Archived).as_deref(), Some("t"));
        assert_eq!(next_published_at(Some("t"), Published, Published).as_deref(), Some("t"));
    }
}
