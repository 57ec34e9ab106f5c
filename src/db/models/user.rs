//! User, role and profile models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::parse_json_object;

/// Platform roles, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Browses and takes courses
    Student,
    /// Authors courses and lessons
    Instructor,
    /// Manages everything on the platform
    Admin,
}

impl UserRole {
    /// Get the permission level (higher = more permissions)
    pub fn level(&self) -> u8 {
        match self {
            UserRole::Admin => 3,
            UserRole::Instructor => 2,
            UserRole::Student => 1,
        }
    }

    /// Check if this role has at least the specified permission level
    pub fn has_at_least(&self, required: UserRole) -> bool {
        self.level() >= required.level()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Check if the role may create courses
    pub fn can_author_courses(&self) -> bool {
        self.has_at_least(UserRole::Instructor)
    }

    /// Roles a visitor may pick for themselves at registration
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, UserRole::Student | UserRole::Instructor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Instructor => "instructor",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(UserRole::Student),
            "instructor" => Ok(UserRole::Instructor),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl From<String> for UserRole {
    fn from(s: String) -> Self {
        // Unknown values get the least privilege.
        s.parse().unwrap_or(UserRole::Student)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub image: Option<String>,
    pub role: String,
    /// JSON-encoded `UserProfile`
    pub profile: Option<String>,
    /// JSON-encoded `UserPreferences`
    pub preferences: Option<String>,
    pub is_email_verified: bool,
    pub last_active: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role_enum(&self) -> UserRole {
        UserRole::from(self.role.clone())
    }

    /// The one ownership rule: the owner or any admin may change a resource.
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.id == owner_id || self.role_enum().is_admin()
    }

    pub fn profile(&self) -> UserProfile {
        parse_json_object(self.profile.as_deref())
    }

    pub fn preferences(&self) -> UserPreferences {
        parse_json_object(self.preferences.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub experience: Option<String>,
    pub social_links: SocialLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialLinks {
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStyle {
    #[default]
    Visual,
    Auditory,
    Kinesthetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub email: bool,
    pub push: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub theme: Theme,
    pub notifications: NotificationPreferences,
    pub learning_style: LearningStyle,
}

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub role: UserRole,
    pub profile: UserProfile,
    pub preferences: UserPreferences,
    pub is_email_verified: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.role_enum(),
            profile: user.profile(),
            preferences: user.preferences(),
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub image: Option<String>,
    pub profile: Option<UserProfile>,
    pub preferences: Option<UserPreferences>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: &str) -> User {
        User {
            id: id.to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
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
    fn test_role_hierarchy() {
        assert!(UserRole::Admin.has_at_least(UserRole::Instructor));
        assert!(UserRole::Instructor.can_author_courses());
        assert!(!UserRole::Student.can_author_courses());
        assert!(!UserRole::Admin.is_self_assignable());
    }

    #[test]
    fn test_unknown_role_is_least_privileged() {
        assert_eq!(UserRole::from("superuser".to_string()), UserRole::Student);
        assert_eq!(UserRole::from("ADMIN".to_string()), UserRole::Admin);
    }

    #[test]
    fn test_can_manage() {
        let owner = user("u1", "instructor");
        let other = user("u2", "instructor");
        let admin = user("u3", "admin");

        assert!(owner.can_manage("u1"));
        assert!(!other.can_manage("u1"));
        assert!(admin.can_manage("u1"));
    }

    #[test]
    fn test_preferences_default_when_missing() {
        let mut u = user("u1", "student");
        assert_eq!(u.preferences(), UserPreferences::default());
        assert!(u.preferences().notifications.email);

        u.preferences = Some(r#"{"theme":"dark","learningStyle":"auditory"}"#.to_string());
        let prefs = u.preferences();
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.learning_style, LearningStyle::Auditory);
        assert!(prefs.notifications.push);
    }
}
