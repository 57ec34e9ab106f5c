//! Authorization checks shared by the course, lesson and admin handlers.
//!
//! Authentication itself happens in the `User` extractor, so every function
//! here runs with a known caller and only decides whether that caller may
//! act.

use super::error::ApiError;
use crate::db::{Course, DbPool, Lesson, User};

/// Only instructors and admins author courses
pub fn require_course_author(user: &User) -> Result<(), ApiError> {
    if user.role_enum().can_author_courses() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only instructors can create courses"))
    }
}

pub fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.role_enum().is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}

pub fn require_owner_or_admin(user: &User, owner_id: &str) -> Result<(), ApiError> {
    if user.can_manage(owner_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to modify this resource",
        ))
    }
}

pub async fn find_course(pool: &DbPool, id: &str) -> Result<Course, ApiError> {
    let course: Option<Course> = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    course.ok_or_else(|| ApiError::not_found("Course not found"))
}

/// Load a course the caller may modify
pub async fn load_owned_course(pool: &DbPool, user: &User, id: &str) -> Result<Course, ApiError> {
    let course = find_course(pool, id).await?;
    require_owner_or_admin(user, &course.instructor_id)?;
    Ok(course)
}

/// Load a lesson the caller may modify; ownership comes from the parent course
pub async fn load_owned_lesson(
    pool: &DbPool,
    user: &User,
    id: &str,
) -> Result<(Lesson, Course), ApiError> {
    let lesson: Option<Lesson> = sqlx::query_as("SELECT * FROM lessons WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let lesson = lesson.ok_or_else(|| ApiError::not_found("Lesson not found"))?;

    let course = find_course(pool, &lesson.course_id).await?;
    require_owner_or_admin(user, &course.instructor_id)?;
    Ok((lesson, course))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn user(id: &str, role: &str) -> User {
        User {
            id: id.to_string(),
            name: "U".to_string(),
            email: format!("{}@example.com", id),
            password_hash: String::new(),
            image: None,
            role: role.to_string(),
            profile: None,
            preferences: None,
            is_email_verified: false,
            last_active: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_course_authoring_roles() {
        assert!(require_course_author(&user("a", "instructor")).is_ok());
        assert!(require_course_author(&user("a", "admin")).is_ok());
        let err = require_course_author(&user("a", "student")).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_owner_or_admin() {
        assert!(require_owner_or_admin(&user("owner", "instructor"), "owner").is_ok());
        assert!(require_owner_or_admin(&user("root", "admin"), "owner").is_ok());
        assert!(require_owner_or_admin(&user("other", "instructor"), "owner").is_err());
        assert!(require_admin(&user("other", "instructor")).is_err());
    }

    #[tokio::test]
    async fn test_load_owned_lesson_checks_parent_course() {
        let pool = crate::db::test_pool().await;
        for (id, role) in [("owner", "instructor"), ("other", "instructor")] {
            sqlx::query("INSERT INTO users (id, name, email, password_hash, role) VALUES (?, 'U', ?, 'h', ?)")
                .bind(id)
                .bind(format!("{}@x.io", id))
                .bind(role)
                .execute(&pool)
                .await
                .unwrap();
        }
        sqlx::query(
            "INSERT INTO courses (id, title, slug, description, instructor_id, category, level) \
             VALUES ('c1', 'T', 't', 'D', 'owner', 'design', 'beginner')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO lessons (id, title, slug, course_id, sort_order) VALUES ('l1', 'L', 'l', 'c1', 1)")
            .execute(&pool)
            .await
            .unwrap();

        let (lesson, course) = load_owned_lesson(&pool, &user("owner", "instructor"), "l1")
            .await
            .unwrap();
        assert_eq!((lesson.id.as_str(), course.id.as_str()), ("l1", "c1"));

        let err = load_owned_lesson(&pool, &user("other", "instructor"), "l1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = load_owned_course(&pool, &user("owner", "instructor"), "missing")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
