//! Access control for the browser-facing pages served from the static
//! front-end. Denied requests are redirected instead of getting an error.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::db::{User, UserRole};
use crate::AppState;

/// Who may load a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAccess {
    Public,
    SignedIn,
    Instructor,
    Admin,
}

pub const SIGNIN_PATH: &str = "/signin";
pub const DASHBOARD_PATH: &str = "/dashboard";

pub fn required_access(path: &str) -> PageAccess {
    if path.starts_with("/admin") {
        PageAccess::Admin
    } else if path.starts_with("/instructor") {
        PageAccess::Instructor
    } else if path.starts_with("/dashboard") || path.starts_with("/learn") {
        PageAccess::SignedIn
    } else {
        PageAccess::Public
    }
}

/// Where to send a caller who may not see the page, or `None` to let it through
pub fn redirect_for(access: PageAccess, user: Option<&User>) -> Option<&'static str> {
    let role = user.map(User::role_enum);
    match access {
        PageAccess::Public => None,
        PageAccess::SignedIn => role.is_none().then_some(SIGNIN_PATH),
        PageAccess::Instructor => match role {
            Some(r) if r.has_at_least(UserRole::Instructor) => None,
            _ => Some(DASHBOARD_PATH),
        },
        PageAccess::Admin => match role {
            Some(UserRole::Admin) => None,
            _ => Some(DASHBOARD_PATH),
        },
    }
}

/// Middleware guarding page routes
pub async fn page_guard(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let access = required_access(request.uri().path());
    if access == PageAccess::Public {
        return next.run(request).await;
    }

    let user = match super::auth::current_user(&state.db, &state.config.auth, request.headers()).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    match redirect_for(access, user.as_ref()) {
        Some(target) => {
            tracing::debug!(path = %request.uri().path(), target, "Page access denied");
            Redirect::temporary(target).into_response()
        }
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> User {
        User {
            id: "u1".to_string(),
            name: "U".to_string(),
            email: "u@example.com".to_string(),
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
    fn test_required_access() {
        assert_eq!(required_access("/admin/users"), PageAccess::Admin);
        assert_eq!(required_access("/instructor/courses/new"), PageAccess::Instructor);
        assert_eq!(required_access("/dashboard"), PageAccess::SignedIn);
        assert_eq!(required_access("/learn/intro-to-python"), PageAccess::SignedIn);
        assert_eq!(required_access("/courses/intro-to-python"), PageAccess::Public);
        assert_eq!(required_access("/"), PageAccess::Public);
    }

    #[test]
    fn test_redirects() {
        assert_eq!(redirect_for(PageAccess::SignedIn, None), Some(SIGNIN_PATH));
        assert_eq!(redirect_for(PageAccess::SignedIn, Some(&user("student"))), None);

        assert_eq!(redirect_for(PageAccess::Instructor, None), Some(DASHBOARD_PATH));
        assert_eq!(redirect_for(PageAccess::Instructor, Some(&user("student"))), Some(DASHBOARD_PATH));
        assert_eq!(redirect_for(PageAccess::Instructor, Some(&user("instructor"))), None);
        assert_eq!(redirect_for(PageAccess::Instructor, Some(&user("admin"))), None);

        assert_eq!(redirect_for(PageAccess::Admin, Some(&user("instructor"))), Some(DASHBOARD_PATH));
        assert_eq!(redirect_for(PageAccess::Admin, Some(&user("admin"))), None);
    }
}
