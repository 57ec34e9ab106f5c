//! URL slug derivation and candidate generation.
//!
//! Scope-aware allocation against storage lives in `db::slugs`; this module
//! is pure so it can be reasoned about without a database.

use thiserror::Error;

/// Slug used when a title has no sluggable characters at all
pub const FALLBACK_SLUG: &str = "untitled";

/// Highest numeric suffix tried before giving up
pub const MAX_SUFFIX: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("No free slug for \"{base}\" after {MAX_SUFFIX} attempts")]
    Exhausted { base: String },
}

/// Derive the base slug for a title.
///
/// Lower-cases, drops everything except `[a-z0-9_]` and spaces, then joins
/// the remaining words with single hyphens.
pub fn derive(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == ' ')
        .collect();

    let slug = kept
        .split(' ')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Candidate slugs for `base`: `base`, `base-1`, ... `base-MAX_SUFFIX`
pub fn candidates(base: &str) -> Candidates<'_> {
    Candidates { base, next: 0 }
}

#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    base: &'a str,
    next: u32,
}

impl Iterator for Candidates<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next > MAX_SUFFIX {
            return None;
        }
        let candidate = match self.next {
            0 => self.base.to_string(),
            n => format!("{}-{}", self.base, n),
        };
        self.next += 1;
        Some(candidate)
    }
}

/// First candidate for `title` that `taken` does not report as used
pub fn first_free(title: &str, mut taken: impl FnMut(&str) -> bool) -> Result<String, SlugError> {
    let base = derive(title);
    candidates(&base)
        .find(|c| !taken(c))
        .ok_or(SlugError::Exhausted { base })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_basic_titles() {
        assert_eq!(derive("Intro to Python"), "intro-to-python");
        assert_eq!(derive("  Rust   for  Everyone  "), "rust-for-everyone");
        assert_eq!(derive("C++ & Data_Structures 101!"), "c-data_structures-101");
    }

    #[test]
    fn test_derive_drops_hyphens_and_unicode() {
        assert_eq!(derive("Self-Paced Café"), "selfpaced-caf");
    }

    #[test]
    fn test_symbol_only_title_falls_back() {
        assert_eq!(derive("!!! ???"), FALLBACK_SLUG);
        assert_eq!(derive(""), FALLBACK_SLUG);
    }

    #[test]
    fn test_candidates_do_not_compound() {
        let got: Vec<String> = candidates("intro").take(3).collect();
        assert_eq!(got, vec!["intro", "intro-1", "intro-2"]);
        assert_eq!(candidates("intro").count(), MAX_SUFFIX as usize + 1);
    }

    #[test]
    fn test_first_free_skips_taken() {
        let taken: HashSet<&str> = ["intro-to-python", "intro-to-python-1"].into();
        let slug = first_free("Intro to Python", |c| taken.contains(c)).unwrap();
        assert_eq!(slug, "intro-to-python-2");
    }

    #[test]
    fn test_first_free_is_bounded() {
        let err = first_free("busy", |_| true).unwrap_err();
        assert_eq!(err, SlugError::Exhausted { base: "busy".to_string() });
    }
}
