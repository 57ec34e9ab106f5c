//! Denormalized lesson counters on `courses`.
//!
//! `total_lessons` and `total_duration` are adjusted by deltas in the same
//! transaction as the lesson write that causes them. `reconcile` rebuilds
//! them from the lessons table when they have drifted.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use super::models::now;
use super::{begin_write, DbPool};

/// Change to apply to one course's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub lessons: i64,
    pub duration: i64,
}

impl CounterDelta {
    pub fn lesson_added(duration: i64) -> Self {
        Self {
            lessons: 1,
            duration,
        }
    }

    pub fn lesson_removed(duration: i64) -> Self {
        Self {
            lessons: -1,
            duration: -duration,
        }
    }

    pub fn duration_changed(old: i64, new: i64) -> Self {
        Self {
            lessons: 0,
            duration: new - old,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.lessons == 0 && self.duration == 0
    }
}

/// Apply `delta` to the course row. Fails with `RowNotFound` when the course
/// is gone, which rolls back the caller's transaction.
pub async fn apply(
    conn: &mut SqliteConnection,
    course_id: &str,
    delta: CounterDelta,
) -> Result<(), sqlx::Error> {
    if delta.is_zero() {
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        UPDATE courses
        SET total_lessons = total_lessons + ?,
            total_duration = total_duration + ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(delta.lessons)
    .bind(delta.duration)
    .bind(now())
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Fresh lesson count, used by the publish guard instead of the counter
pub async fn live_lesson_count(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lessons WHERE course_id = ?")
        .bind(course_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// A course whose stored counters disagree with its lessons
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub course_id: String,
    pub title: String,
    pub stored_lessons: i64,
    pub stored_duration: i64,
    pub live_lessons: i64,
    pub live_duration: i64,
}

async fn drifted(conn: &mut SqliteConnection) -> Result<Vec<CounterDrift>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT c.id AS course_id,
               c.title AS title,
               c.total_lessons AS stored_lessons,
               c.total_duration AS stored_duration,
               COALESCE(l.live_lessons, 0) AS live_lessons,
               COALESCE(l.live_duration, 0) AS live_duration
        FROM courses c
        LEFT JOIN (
            SELECT course_id, COUNT(*) AS live_lessons, SUM(duration) AS live_duration
            FROM lessons
            GROUP BY course_id
        ) l ON l.course_id = c.id
        WHERE c.total_lessons != COALESCE(l.live_lessons, 0)
           OR c.total_duration != COALESCE(l.live_duration, 0)
        ORDER BY c.created_at
        "#,
    )
    .fetch_all(&mut *conn)
    .await
}

/// List drifted courses without changing anything
pub async fn find_drift(pool: &DbPool) -> Result<Vec<CounterDrift>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    drifted(&mut conn).await
}

/// Rewrite every drifted course's counters from its live lessons and return
/// what was fixed.
pub async fn reconcile(pool: &DbPool) -> Result<Vec<CounterDrift>, sqlx::Error> {
    let mut tx = begin_write(pool).await?;
    let drift = drifted(&mut tx).await?;

    let ts = now();
    for d in &drift {
        warn!(
            course_id = %d.course_id,
            stored_lessons = d.stored_lessons,
            live_lessons = d.live_lessons,
            stored_duration = d.stored_duration,
            live_duration = d.live_duration,
            "Course counters drifted, rewriting"
        );
        sqlx::query(
            "UPDATE courses SET total_lessons = ?, total_duration = ?, updated_at = ? WHERE id = ?",
        )
        .bind(d.live_lessons)
        .bind(d.live_duration)
        .bind(&ts)
        .bind(&d.course_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(fixed = drift.len(), "Counter reconciliation finished");
    Ok(drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_course(pool: &DbPool) {
        sqlx::query("INSERT INTO users (id, name, email, password_hash) VALUES ('u1', 'U', 'u@x.io', 'h')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO courses (id, title, slug, description, instructor_id, category, level) \
             VALUES ('c1', 'T', 't', 'D', 'u1', 'design', 'beginner')",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    async fn add_lesson(pool: &DbPool, id: &str, duration: i64) {
        sqlx::query(
            "INSERT INTO lessons (id, title, slug, course_id, sort_order, duration) VALUES (?, ?, ?, 'c1', 1, ?)",
        )
        .bind(id)
        .bind(id)
        .bind(id)
        .bind(duration)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn stored(pool: &DbPool) -> (i64, i64) {
        sqlx::query_as("SELECT total_lessons, total_duration FROM courses WHERE id = 'c1'")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_delta_constructors() {
        assert_eq!(CounterDelta::lesson_added(60), CounterDelta { lessons: 1, duration: 60 });
        assert_eq!(CounterDelta::lesson_removed(60), CounterDelta { lessons: -1, duration: -60 });
        assert_eq!(CounterDelta::duration_changed(60, 0).duration, -60);
        assert!(CounterDelta::duration_changed(5, 5).is_zero());
    }

    #[tokio::test]
    async fn test_apply_adjusts_counters() {
        let pool = test_pool().await;
        seed_course(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        apply(&mut conn, "c1", CounterDelta::lesson_added(120)).await.unwrap();
        apply(&mut conn, "c1", CounterDelta::lesson_added(30)).await.unwrap();
        apply(&mut conn, "c1", CounterDelta::duration_changed(30, 0)).await.unwrap();
        drop(conn);

        assert_eq!(stored(&pool).await, (2, 120));
    }

    #[tokio::test]
    async fn test_apply_missing_course_is_row_not_found() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let err = apply(&mut conn, "nope", CounterDelta::lesson_added(1)).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn test_live_lesson_count() {
        let pool = test_pool().await;
        seed_course(&pool).await;
        add_lesson(&pool, "a", 100).await;
        add_lesson(&pool, "b", 20).await;
        let mut conn = pool.acquire().await.unwrap();

        assert_eq!(live_lesson_count(&mut conn, "c1").await.unwrap(), 2);
        assert_eq!(live_lesson_count(&mut conn, "other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift() {
        let pool = test_pool().await;
        seed_course(&pool).await;
        // Lessons inserted behind the counters' back.
        add_lesson(&pool, "a", 100).await;
        add_lesson(&pool, "b", 20).await;

        let drift = find_drift(&pool).await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].stored_lessons, 0);
        assert_eq!(drift[0].live_duration, 120);

        let fixed = reconcile(&pool).await.unwrap();
        assert_eq!(fixed.len(), 1);
        assert_eq!(stored(&pool).await, (2, 120));
        assert!(find_drift(&pool).await.unwrap().is_empty());
    }
}
