//! Glob-pattern path matcher: literal segments, `{name}` captures, `*` and
//! `**` wildcards (§4.1).
//!
//! Grounded on the teacher's `utils::route_matcher` (regex-compiled dynamic
//! routes with `{param}` capture), generalized to segment-wildcard syntax and
//! an explicit specificity score instead of "most captured params wins".

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
    Single,
    MultiAny,
}

/// A compiled glob pattern plus its precomputed specificity score (§4.1).
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub raw: String,
    segments: Vec<Segment>,
    pub specificity: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("`**` must be the final segment of the pattern")]
    MultiAnyNotLast,
    #[error("empty path segment in pattern")]
    EmptySegment,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() {
            vec![]
        } else {
            trimmed.split('/').collect()
        };

        let mut segments = Vec::with_capacity(parts.len());
        let mut specificity: i64 = 0;

        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(PatternError::EmptySegment);
            }
            let segment = if part == &"**" {
                if i != parts.len() - 1 {
                    return Err(PatternError::MultiAnyNotLast);
                }
                specificity -= 3;
                Segment::MultiAny
            } else if part == &"*" {
                specificity -= 2;
                Segment::Single
            } else if part.starts_with('{') && part.ends_with('}') {
                specificity -= 1;
                Segment::Capture(part[1..part.len() - 1].to_string())
            } else {
                specificity += 1;
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(CompiledPattern {
            raw: pattern.to_string(),
            segments,
            specificity,
        })
    }

    /// Attempts to match `path` against this pattern, returning captured
    /// `{name}` variables in order on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let trimmed = path.trim_matches('/');
        let path_parts: Vec<&str> = if trimmed.is_empty() {
            vec![]
        } else {
            trimmed.split('/').collect()
        };

        let mut variables = HashMap::new();
        match_segments(&self.segments, &path_parts, &mut variables).then_some(variables)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str], vars: &mut HashMap<String, String>) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(Segment::MultiAny) => true,
        Some(seg) => {
            let Some((head, rest_path)) = path.split_first() else {
                return false;
            };
            let consumed = match seg {
                Segment::Literal(lit) => lit == head,
                Segment::Single => true,
                Segment::Capture(name) => {
                    vars.insert(name.clone(), (*head).to_string());
                    true
                }
                Segment::MultiAny => unreachable!(),
            };
            consumed && match_segments(&pattern[1..], rest_path, vars)
        }
    }
}

/// Method-set membership; the literal `"*"` entry matches any method (§4.1).
pub fn method_matches(methods: &std::collections::HashSet<String>, method: &str) -> bool {
    methods.iter().any(|m| m == "*" || m.eq_ignore_ascii_case(method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_path() {
        let p = CompiledPattern::compile("/api/ping").unwrap();
        assert!(p.matches("/api/ping").is_some());
        assert!(p.matches("/api/pong").is_none());
    }

    #[test]
    fn captures_named_variable() {
        let p = CompiledPattern::compile("/api/v2/users/{id}").unwrap();
        let vars = p.matches("/api/v2/users/42").unwrap();
        assert_eq!(vars.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn single_wildcard_matches_one_segment_only() {
        let p = CompiledPattern::compile("/files/*/name").unwrap();
        assert!(p.matches("/files/a/name").is_some());
        assert!(p.matches("/files/a/b/name").is_none());
    }

    #[test]
    fn multi_wildcard_matches_zero_or_more_trailing_segments() {
        let p = CompiledPattern::compile("/users/**").unwrap();
        assert!(p.matches("/users").is_some());
        assert!(p.matches("/users/1/posts/2").is_some());
    }

    #[test]
    fn multi_any_must_be_last() {
        assert_eq!(
            CompiledPattern::compile("/users/**/posts"),
            Err(PatternError::MultiAnyNotLast)
        );
    }

    #[test]
    fn specificity_ranks_literal_over_capture_over_wildcards() {
        let literal = CompiledPattern::compile("/api/v2/users/profile").unwrap();
        let capture = CompiledPattern::compile("/api/v2/users/{id}").unwrap();
        let single = CompiledPattern::compile("/api/v2/users/*").unwrap();
        let multi = CompiledPattern::compile("/api/v2/users/**").unwrap();
        assert!(literal.specificity > capture.specificity);
        assert!(capture.specificity > single.specificity);
        assert!(single.specificity > multi.specificity);
    }

    #[test]
    fn method_wildcard_matches_any_method() {
        let methods: std::collections::HashSet<String> = ["*".to_string()].into_iter().collect();
        assert!(method_matches(&methods, "DELETE"));
    }
}
