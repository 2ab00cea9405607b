//! LIKE pattern matching.
//!
//! One canonical matcher shared by in-memory predicate evaluation and the
//! lowered store filter, so both paths agree on every string.
//!
//! SQL LIKE with two wildcards:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! Matching is **case-sensitive** and operates on Unicode scalar values.

use alloc::vec::Vec;

/// SQL LIKE pattern matching.
///
/// ```
/// use vellum_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    like_chars(value, &p)
}

/// A LIKE pattern split into characters once, for repeated matching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikePattern {
    chars: Vec<char>,
}

impl LikePattern {
    /// Prepares a pattern.
    pub fn new(pattern: &str) -> Self {
        Self {
            chars: pattern.chars().collect(),
        }
    }

    /// Matches `value` against the prepared pattern.
    #[inline]
    pub fn matches(&self, value: &str) -> bool {
        like_chars(value, &self.chars)
    }
}

/// Greedy matcher with single-point backtracking on the last `%`.
fn like_chars(value: &str, p: &[char]) -> bool {
    let v: Vec<char> = value.chars().collect();
    let (mut vi, mut pi) = (0usize, 0usize);
    // position of the last '%' seen and the value index it was tried at
    let mut star: Option<(usize, usize)> = None;

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == v[vi])) {
            vi += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, vi));
            pi += 1;
        } else if let Some((sp, sv)) = star {
            pi = sp + 1;
            vi = sv + 1;
            star = Some((sp, sv + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}
