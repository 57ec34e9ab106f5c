//! Input validation for API requests.
//!
//! Each function checks one field and returns a human-readable message on
//! failure. Handlers collect them with `ValidationErrorBuilder` from the
//! `error` module so a response can report several fields at once.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{CourseCategory, CourseLevel, LessonType, PricingType};

lazy_static! {
    /// Pragmatic email shape check: something@something.tld
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$"
    ).unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LEN: usize = 50;
/// Longest accepted lesson, in seconds. Keeps course totals well inside i64.
pub const MAX_DURATION: i64 = i32::MAX as i64;

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name is too long (max {} characters)", MAX_NAME_LEN));
    }
    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Please enter a valid email".to_string());
    }
    Ok(())
}

/// Validate a new password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    Ok(())
}

/// Validate a course or lesson title
pub fn validate_title(title: &str) -> Result<(), String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("Title is required".to_string());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("Title is too long (max {} characters)", MAX_TITLE_LEN));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("Description is required".to_string());
    }
    Ok(())
}

pub fn validate_category(category: &str) -> Result<CourseCategory, String> {
    if category.is_empty() {
        return Err("Category is required".to_string());
    }
    category.parse()
}

pub fn validate_level(level: &str) -> Result<CourseLevel, String> {
    if level.is_empty() {
        return Err("Level is required".to_string());
    }
    level.parse()
}

pub fn validate_lesson_type(kind: &str) -> Result<LessonType, String> {
    kind.parse()
}

/// Validate a price. Paid courses must cost something.
pub fn validate_pricing(pricing_type: &str, amount: f64) -> Result<PricingType, String> {
    let kind: PricingType = pricing_type.parse()?;
    if !amount.is_finite() || amount < 0.0 {
        return Err("Price cannot be negative".to_string());
    }
    if kind == PricingType::Paid && amount <= 0.0 {
        return Err("Paid courses need a price greater than zero".to_string());
    }
    Ok(kind)
}

/// Validate a lesson duration in seconds
pub fn validate_duration(duration: i64) -> Result<(), String> {
    if duration < 0 {
        return Err("Duration cannot be negative".to_string());
    }
    if duration > MAX_DURATION {
        return Err(format!("Duration is too long (max {} seconds)", MAX_DURATION));
    }
    Ok(())
}

/// Validate a lesson position; positions start at 1
pub fn validate_order(order: i64) -> Result<(), String> {
    if order < 1 {
        return Err("Order must be at least 1".to_string());
    }
    Ok(())
}

pub fn validate_tags(tags: &[String]) -> Result<(), String> {
    if tags.len() > MAX_TAGS {
        return Err(format!("Too many tags (max {})", MAX_TAGS));
    }
    for tag in tags {
        if tag.trim().is_empty() {
            return Err("Tags cannot be empty".to_string());
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(format!("Tag '{}' is too long (max {} characters)", tag, MAX_TAG_LEN));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.io").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Intro to Python").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_enums() {
        assert_eq!(validate_category("data-science"), Ok(CourseCategory::DataScience));
        assert!(validate_category("").unwrap_err().contains("required"));
        assert!(validate_level("expert").is_err());
        assert_eq!(validate_lesson_type("quiz"), Ok(LessonType::Quiz));
        assert!(validate_lesson_type("podcast").is_err());
    }

    #[test]
    fn test_validate_pricing() {
        assert_eq!(validate_pricing("free", 0.0), Ok(PricingType::Free));
        assert_eq!(validate_pricing("paid", 19.99), Ok(PricingType::Paid));
        assert!(validate_pricing("paid", 0.0).is_err());
        assert!(validate_pricing("free", -1.0).is_err());
        assert!(validate_pricing("donation", 5.0).is_err());
    }

    #[test]
    fn test_validate_duration_and_order() {
        assert!(validate_duration(0).is_ok());
        assert!(validate_duration(-1).is_err());
        assert!(validate_duration(MAX_DURATION).is_ok());
        assert!(validate_duration(MAX_DURATION + 1).is_err());
        assert!(validate_duration(i64::MAX).is_err());
        assert!(validate_order(1).is_ok());
        assert!(validate_order(0).is_err());
    }

    #[test]
    fn test_validate_tags() {
        assert!(validate_tags(&["rust".to_string()]).is_ok());
        assert!(validate_tags(&[" ".to_string()]).is_err());
        let many: Vec<String> = (0..=MAX_TAGS).map(|i| format!("t{}", i)).collect();
        assert!(validate_tags(&many).is_err());
    }
}
