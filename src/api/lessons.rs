//! Lesson endpoints. Every write adjusts the parent course's counters in the
//! same transaction.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiQuery};
use super::guard::{find_course, load_owned_lesson, require_owner_or_admin};
use super::metrics;
use super::validation::{validate_duration, validate_lesson_type, validate_order, validate_title};
use crate::db::{
    begin_write,
    common::{now, serialize_json_list},
    counters::{self, CounterDelta},
    slugs::{allocate, with_slug_retry, SlugScope, SlugWriteError},
    CourseRef, CreateLessonRequest, DbPool, Lesson, LessonContentInput, LessonDetail,
    LessonEnvelope, LessonList, LessonListQuery, LessonResponse, LessonSummary, LessonType,
    UpdateLessonRequest, User,
};
use crate::AppState;

fn course_id_param(query: &LessonListQuery) -> Option<&str> {
    query
        .course_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// GET /api/lessons?courseId=
pub async fn list_lessons(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LessonListQuery>,
) -> Result<Json<LessonList>, ApiError> {
    let course_id = course_id_param(&query)
        .ok_or_else(|| ApiError::validation_field("courseId", "Course ID is required"))?;

    let lessons: Vec<Lesson> = sqlx::query_as(
        "SELECT * FROM lessons WHERE course_id = ? ORDER BY sort_order, created_at",
    )
    .bind(course_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(LessonList {
        lessons: lessons.into_iter().map(LessonSummary::from).collect(),
    }))
}

/// GET /api/lessons/:id_or_slug
///
/// Slugs are only unique within a course; pass `courseId` to pick the
/// course, otherwise the oldest lesson with that slug wins.
pub async fn get_lesson(
    State(state): State<Arc<AppState>>,
    Path(id_or_slug): Path<String>,
    ApiQuery(query): ApiQuery<LessonListQuery>,
) -> Result<Json<LessonDetail>, ApiError> {
    let course_id = course_id_param(&query);
    let lesson: Option<Lesson> = sqlx::query_as(
        r#"
        SELECT * FROM lessons
        WHERE (id = ? OR slug = ?) AND (? IS NULL OR course_id = ?)
        ORDER BY (id = ?) DESC, created_at
        LIMIT 1
        "#,
    )
    .bind(&id_or_slug)
    .bind(&id_or_slug)
    .bind(course_id)
    .bind(course_id)
    .bind(&id_or_slug)
    .fetch_optional(&state.db)
    .await?;
    let lesson = lesson.ok_or_else(|| ApiError::not_found("Lesson not found"))?;

    let course: CourseRef = sqlx::query_as("SELECT id, title, slug FROM courses WHERE id = ?")
        .bind(&lesson.course_id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(LessonDetail {
        lesson: lesson.into(),
        course,
    }))
}

async fn load_lesson_response(pool: &DbPool, id: &str) -> Result<LessonResponse, ApiError> {
    let lesson: Option<Lesson> = sqlx::query_as("SELECT * FROM lessons WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    lesson
        .map(LessonResponse::from)
        .ok_or_else(|| ApiError::not_found("Lesson not found"))
}

fn validate_content(content: &LessonContentInput, errors: &mut ValidationErrorBuilder) {
    if let Some(duration) = content.duration {
        if let Err(e) = validate_duration(duration) {
            errors.add("content.duration", e);
        }
    }
    if let Some(attachments) = &content.attachments {
        if attachments
            .iter()
            .any(|a| a.name.trim().is_empty() || a.url.trim().is_empty())
        {
            errors.add("content.attachments", "Attachments need a name and a url");
        }
    }
}

/// Column values written by create and update
#[derive(Debug, Clone)]
struct LessonFields {
    title: String,
    order: Option<i64>,
    lesson_type: String,
    video_url: String,
    video_id: String,
    duration: i64,
    transcript: String,
    text_content: String,
    attachments: String,
    is_free: bool,
    is_published: bool,
}

fn validate_create_request(req: &CreateLessonRequest) -> Result<LessonFields, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_title(&req.title) {
        errors.add("title", e);
    }
    if req.course_id.trim().is_empty() {
        errors.add("courseId", "Course ID is required");
    }
    let lesson_type = match req.lesson_type.as_deref() {
        None => LessonType::default(),
        Some(raw) => validate_lesson_type(raw).unwrap_or_else(|e| {
            errors.add("type", e);
            LessonType::default()
        }),
    };
    if let Some(order) = req.order {
        if let Err(e) = validate_order(order) {
            errors.add("order", e);
        }
    }
    let content = req.content.clone().unwrap_or_default();
    validate_content(&content, &mut errors);
    errors.finish()?;

    Ok(LessonFields {
        title: req.title.trim().to_string(),
        order: req.order,
        lesson_type: lesson_type.as_str().to_string(),
        video_url: content.video_url.unwrap_or_default(),
        video_id: content.video_id.unwrap_or_default(),
        duration: content.duration.unwrap_or(0),
        transcript: content.transcript.unwrap_or_default(),
        text_content: content.text_content.unwrap_or_default(),
        attachments: serialize_json_list(&content.attachments.unwrap_or_default()),
        is_free: req.is_free.unwrap_or(false),
        is_published: req.is_published.unwrap_or(false),
    })
}

/// POST /api/lessons
pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(req): ApiJson<CreateLessonRequest>,
) -> Result<(StatusCode, Json<LessonEnvelope>), ApiError> {
    let fields = validate_create_request(&req)?;
    let course = find_course(&state.db, req.course_id.trim()).await?;
    require_owner_or_admin(&user, &course.instructor_id)?;

    let db = &state.db;
    let fields_ref = &fields;
    let course_id = course.id.as_str();

    let id = with_slug_retry(move || async move {
        let id = Uuid::new_v4().to_string();
        let ts = now();
        let mut tx = begin_write(db).await?;

        let slug = allocate(&mut tx, SlugScope::Lessons { course_id, exclude: None }, &fields_ref.title)
            .await?;
        let order = match fields_ref.order {
            Some(order) => order,
            None => {
                let (next,): (i64,) = sqlx::query_as(
                    "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM lessons WHERE course_id = ?",
                )
                .bind(course_id)
                .fetch_one(&mut *tx)
                .await?;
                next
            }
        };

        sqlx::query(
            r#"
            INSERT INTO lessons (
                id, title, slug, course_id, sort_order, lesson_type,
                video_url, video_id, duration, transcript, text_content, attachments,
                is_free, is_published, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&fields_ref.title)
        .bind(&slug)
        .bind(course_id)
        .bind(order)
        .bind(&fields_ref.lesson_type)
        .bind(&fields_ref.video_url)
        .bind(&fields_ref.video_id)
        .bind(fields_ref.duration)
        .bind(&fields_ref.transcript)
        .bind(&fields_ref.text_content)
        .bind(&fields_ref.attachments)
        .bind(fields_ref.is_free)
        .bind(fields_ref.is_published)
        .bind(&ts)
        .bind(&ts)
        .execute(&mut *tx)
        .await?;

        counters::apply(&mut tx, course_id, CounterDelta::lesson_added(fields_ref.duration)).await?;

        tx.commit().await?;
        Ok::<_, SlugWriteError>(id)
    })
    .await?;

    metrics::record_lesson_created();
    info!(lesson_id = %id, course_id = %course.id, duration = fields.duration, "Lesson created");

    let lesson = load_lesson_response(&state.db, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(LessonEnvelope {
            message: "Lesson created successfully".to_string(),
            lesson,
        }),
    ))
}

fn merge_update(lesson: &Lesson, req: &UpdateLessonRequest) -> Result<LessonFields, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(title) = &req.title {
        if let Err(e) = validate_title(title) {
            errors.add("title", e);
        }
    }
    let lesson_type = match req.lesson_type.as_deref() {
        None => lesson.lesson_type.clone(),
        Some(raw) => match validate_lesson_type(raw) {
            Ok(t) => t.as_str().to_string(),
            Err(e) => {
                errors.add("type", e);
                lesson.lesson_type.clone()
            }
        },
    };
    if let Some(order) = req.order {
        if let Err(e) = validate_order(order) {
            errors.add("order", e);
        }
    }
    let content = req.content.clone().unwrap_or_default();
    validate_content(&content, &mut errors);
    errors.finish()?;

    Ok(LessonFields {
        title: req
            .title
            .as_deref()
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| lesson.title.clone()),
        order: Some(req.order.unwrap_or(lesson.sort_order)),
        lesson_type,
        video_url: content.video_url.unwrap_or_else(|| lesson.video_url.clone()),
        video_id: content.video_id.unwrap_or_else(|| lesson.video_id.clone()),
        // A supplied zero is a real value, not "unchanged".
        duration: content.duration.unwrap_or(lesson.duration),
        transcript: content.transcript.unwrap_or_else(|| lesson.transcript.clone()),
        text_content: content
            .text_content
            .unwrap_or_else(|| lesson.text_content.clone()),
        attachments: match content.attachments {
            Some(items) => serialize_json_list(&items),
            None => lesson.attachments.clone(),
        },
        is_free: req.is_free.unwrap_or(lesson.is_free),
        is_published: req.is_published.unwrap_or(lesson.is_published),
    })
}

/// PUT /api/lessons/:id
pub async fn update_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
    ApiJson(req): ApiJson<UpdateLessonRequest>,
) -> Result<Json<LessonEnvelope>, ApiError> {
    let (lesson, _course) = load_owned_lesson(&state.db, &user, &id).await?;
    let fields = merge_update(&lesson, &req)?;
    let reslug = fields.title != lesson.title;

    let db = &state.db;
    let lesson_ref = &lesson;
    let fields_ref = &fields;

    let delta = with_slug_retry(move || async move {
        let mut tx = begin_write(db).await?;

        // Re-read inside the transaction so the delta matches what is replaced.
        let (old_duration,): (i64,) = sqlx::query_as("SELECT duration FROM lessons WHERE id = ?")
            .bind(&lesson_ref.id)
            .fetch_one(&mut *tx)
            .await?;

        let slug = if reslug {
            allocate(
                &mut tx,
                SlugScope::Lessons {
                    course_id: &lesson_ref.course_id,
                    exclude: Some(lesson_ref.id.as_str()),
                },
                &fields_ref.title,
            )
            .await?
        } else {
            lesson_ref.slug.clone()
        };

        sqlx::query(
            r#"
            UPDATE lessons SET
                title = ?, slug = ?, sort_order = ?, lesson_type = ?,
                video_url = ?, video_id = ?, duration = ?, transcript = ?, text_content = ?,
                attachments = ?, is_free = ?, is_published = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields_ref.title)
        .bind(&slug)
        .bind(fields_ref.order)
        .bind(&fields_ref.lesson_type)
        .bind(&fields_ref.video_url)
        .bind(&fields_ref.video_id)
        .bind(fields_ref.duration)
        .bind(&fields_ref.transcript)
        .bind(&fields_ref.text_content)
        .bind(&fields_ref.attachments)
        .bind(fields_ref.is_free)
        .bind(fields_ref.is_published)
        .bind(now())
        .bind(&lesson_ref.id)
        .execute(&mut *tx)
        .await?;

        let delta = CounterDelta::duration_changed(old_duration, fields_ref.duration);
        counters::apply(&mut tx, &lesson_ref.course_id, delta).await?;

        tx.commit().await?;
        Ok::<_, SlugWriteError>(delta)
    })
    .await?;

    metrics::record_lesson_updated();
    info!(lesson_id = %id, course_id = %lesson.course_id, duration_delta = delta.duration, "Lesson updated");

    let lesson = load_lesson_response(&state.db, &id).await?;
    Ok(Json(LessonEnvelope {
        message: "Lesson updated successfully".to_string(),
        lesson,
    }))
}

/// DELETE /api/lessons/:id
pub async fn delete_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (lesson, _course) = load_owned_lesson(&state.db, &user, &id).await?;

    let mut tx = begin_write(&state.db).await?;
    let removed: Option<(i64,)> =
        sqlx::query_as("DELETE FROM lessons WHERE id = ? RETURNING duration")
            .bind(&lesson.id)
            .fetch_optional(&mut *tx)
            .await?;
    let (duration,) = removed.ok_or_else(|| ApiError::not_found("Lesson not found"))?;
    counters::apply(&mut tx, &lesson.course_id, CounterDelta::lesson_removed(duration)).await?;
    tx.commit().await?;

    metrics::record_lesson_deleted();
    info!(lesson_id = %lesson.id, course_id = %lesson.course_id, duration, "Lesson deleted");

    Ok(Json(json!({ "message": "Lesson deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults() {
        let req: CreateLessonRequest =
            serde_json::from_str(r#"{"title":" Intro ","courseId":"c1"}"#).unwrap();
        let fields = validate_create_request(&req).unwrap();
        assert_eq!(fields.title, "Intro");
        assert_eq!(fields.lesson_type, "video");
        assert_eq!(fields.duration, 0);
        assert_eq!(fields.order, None);
        assert_eq!(fields.attachments, "[]");
        assert!(!fields.is_published);
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let req: CreateLessonRequest = serde_json::from_str(
            r#"{"title":"","courseId":"","type":"podcast","content":{"duration":-5}}"#,
        )
        .unwrap();
        let err = validate_create_request(&req).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("4 fields"));
    }
}
