//! Common types and utilities shared across models.

use serde::{de::DeserializeOwned, Serialize};

/// Current time as an RFC 3339 string, the timestamp format stored in every table
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Helper to parse a JSON array column, tolerating NULL or malformed data
pub fn parse_json_list<T: DeserializeOwned>(json: &str) -> Vec<T> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Helper to serialize a list for a JSON column
pub fn serialize_json_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Helper to parse an optional JSON object column, falling back to defaults
pub fn parse_json_object<T: DeserializeOwned + Default>(json: Option<&str>) -> T {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// Page metadata returned alongside list results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_courses: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            current_page: page,
            total_pages,
            total_courses: total,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(1, 12, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(!p.has_prev_page);

        let p = Pagination::new(3, 12, 25);
        assert!(!p.has_next_page);
        assert!(p.has_prev_page);

        let p = Pagination::new(1, 12, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page);
    }

    #[test]
    fn test_json_list_helpers() {
        let tags = vec!["rust".to_string(), "web".to_string()];
        let json = serialize_json_list(&tags);
        assert_eq!(parse_json_list::<String>(&json), tags);
        assert!(parse_json_list::<String>("not json").is_empty());
    }
}
