//! Slug allocation against stored courses and lessons.
//!
//! `allocate` reads the taken slugs inside the caller's transaction; the
//! unique indexes on `courses.slug` and `lessons(course_id, slug)` catch any
//! writer that slipped in between, and `with_slug_retry` re-runs the whole
//! write when that happens. Writers open their transactions with
//! `begin_write` so the read and the insert hold the same write lock.

use std::collections::HashSet;
use std::future::Future;

use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::warn;

use super::{is_busy, is_unique_violation};
use crate::slug::{self, SlugError};

/// Attempts made by `with_slug_retry` before the collision is surfaced
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Where a slug must be unique
#[derive(Debug, Clone, Copy)]
pub enum SlugScope<'a> {
    /// All courses, optionally ignoring the course being renamed
    Courses { exclude: Option<&'a str> },
    /// Lessons of one course, optionally ignoring the lesson being renamed
    Lessons {
        course_id: &'a str,
        exclude: Option<&'a str>,
    },
}

#[derive(Debug, Error)]
pub enum SlugWriteError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl SlugWriteError {
    /// A lost race: either the unique index rejected the slug or the write
    /// lock was still held when the busy timeout ran out.
    fn is_collision(&self) -> bool {
        matches!(self, SlugWriteError::Database(e) if is_unique_violation(e) || is_busy(e))
    }
}

async fn taken_slugs(
    conn: &mut SqliteConnection,
    scope: SlugScope<'_>,
    base: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    // LIKE may over-match on `_`; exact comparison happens in the set.
    let pattern = format!("{}-%", base);
    let rows: Vec<(String,)> = match scope {
        SlugScope::Courses { exclude } => {
            sqlx::query_as(
                "SELECT slug FROM courses WHERE (slug = ? OR slug LIKE ?) AND (? IS NULL OR id != ?)",
            )
            .bind(base)
            .bind(&pattern)
            .bind(exclude)
            .bind(exclude)
            .fetch_all(&mut *conn)
            .await?
        }
        SlugScope::Lessons { course_id, exclude } => {
            sqlx::query_as(
                "SELECT slug FROM lessons WHERE course_id = ? AND (slug = ? OR slug LIKE ?) AND (? IS NULL OR id != ?)",
            )
            .bind(course_id)
            .bind(base)
            .bind(&pattern)
            .bind(exclude)
            .bind(exclude)
            .fetch_all(&mut *conn)
            .await?
        }
    };
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

/// Pick the first free slug for `title` within `scope`
pub async fn allocate(
    conn: &mut SqliteConnection,
    scope: SlugScope<'_>,
    title: &str,
) -> Result<String, SlugWriteError> {
    let base = slug::derive(title);
    let taken = taken_slugs(conn, scope, &base).await?;
    Ok(slug::first_free(title, |c| taken.contains(c))?)
}

/// Run a slug-allocating write, retrying when it loses a race.
///
/// `op` must open and commit its own transaction so each attempt sees the
/// rows that beat it.
pub async fn with_slug_retry<T, F, Fut>(mut op: F) -> Result<T, SlugWriteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SlugWriteError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_collision() && attempt < MAX_WRITE_ATTEMPTS => {
                warn!(attempt, "Slug collided with a concurrent write, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed(pool: &crate::db::DbPool) {
        sqlx::query("INSERT INTO users (id, name, email, password_hash) VALUES ('u1', 'U', 'u@x.io', 'h')")
            .execute(pool)
            .await
            .unwrap();
        for (id, slug) in [("c1", "intro-to-python"), ("c2", "intro-to-python-1"), ("c3", "other")] {
            sqlx::query(
                "INSERT INTO courses (id, title, slug, description, instructor_id, category, level) \
                 VALUES (?, 'T', ?, 'D', 'u1', 'programming', 'beginner')",
            )
            .bind(id)
            .bind(slug)
            .execute(pool)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_allocate_course_slug_skips_taken() {
        let pool = test_pool().await;
        seed(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let slug = allocate(&mut conn, SlugScope::Courses { exclude: None }, "Intro to Python")
            .await
            .unwrap();
        assert_eq!(slug, "intro-to-python-2");

        let fresh = allocate(&mut conn, SlugScope::Courses { exclude: None }, "Brand New")
            .await
            .unwrap();
        assert_eq!(fresh, "brand-new");
    }

    #[tokio::test]
    async fn test_allocate_ignores_excluded_row() {
        let pool = test_pool().await;
        seed(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let slug = allocate(&mut conn, SlugScope::Courses { exclude: Some("c1") }, "Intro to Python")
            .await
            .unwrap();
        assert_eq!(slug, "intro-to-python");
    }

    #[tokio::test]
    async fn test_lesson_slugs_are_per_course() {
        let pool = test_pool().await;
        seed(&pool).await;
        sqlx::query(
            "INSERT INTO lessons (id, title, slug, course_id, sort_order) VALUES ('l1', 'Introduction', 'introduction', 'c1', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let same_course = allocate(
            &mut conn,
            SlugScope::Lessons { course_id: "c1", exclude: None },
            "Introduction",
        )
        .await
        .unwrap();
        assert_eq!(same_course, "introduction-1");

        let other_course = allocate(
            &mut conn,
            SlugScope::Lessons { course_id: "c2", exclude: None },
            "Introduction",
        )
        .await
        .unwrap();
        assert_eq!(other_course, "introduction");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_collision() {
        let pool = test_pool().await;
        seed(&pool).await;
        let pool_ref = &pool;
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let attempts_ref = &attempts;

        let slug = with_slug_retry(move || async move {
            let n = attempts_ref.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut tx = crate::db::begin_write(pool_ref).await?;
            // The first attempt writes a stale slug, as if a racer won.
            let slug = if n == 0 {
                "other".to_string()
            } else {
                allocate(&mut *tx, SlugScope::Courses { exclude: None }, "Other").await?
            };
            sqlx::query(
                "INSERT INTO courses (id, title, slug, description, instructor_id, category, level) \
                 VALUES (?, 'Other', ?, 'D', 'u1', 'design', 'beginner')",
            )
            .bind(format!("n{}", n))
            .bind(&slug)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<_, SlugWriteError>(slug)
        })
        .await
        .unwrap();

        assert_eq!(slug, "other-1");
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let pool = test_pool().await;
        seed(&pool).await;
        let pool_ref = &pool;

        let err = with_slug_retry(move || async move {
            sqlx::query(
                "INSERT INTO courses (id, title, slug, description, instructor_id, category, level) \
                 VALUES (lower(hex(randomblob(8))), 'Other', 'other', 'D', 'u1', 'design', 'beginner')",
            )
            .execute(pool_ref)
            .await?;
            Ok::<_, SlugWriteError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SlugWriteError::Database(_)));
    }
}
