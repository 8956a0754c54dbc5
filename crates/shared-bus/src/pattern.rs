//! Subscription patterns.
//!
//! A pattern is a dotted name whose segments are literals, `*` (exactly one
//! segment) or `**` (zero or more segments). `gs.up.*` matches
//! `gs.up.receive` but not `gs.up.forward.attempt`; `gs.**` matches both.

use std::fmt;
use std::str::FromStr;

use crate::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

fn is_name_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl Pattern {
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        let invalid = |reason: &str| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }
        let segments = pattern
            .split('.')
            .map(|segment| match segment {
                "*" => Ok(Segment::One),
                "**" => Ok(Segment::Any),
                s if s.contains('*') => Err(invalid("wildcards must span a whole segment")),
                s if is_name_segment(s) => Ok(Segment::Literal(s.to_string())),
                "" => Err(invalid("empty segment")),
                _ => Err(invalid("segments may only contain [a-z0-9_]")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern names exactly one event.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    pub fn matches(&self, name: &str) -> bool {
        let parts: Vec<&str> = name.split('.').collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((Segment::Any, rest)) => (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..])),
        Some((Segment::One, rest)) => !parts.is_empty() && match_segments(rest, &parts[1..]),
        Some((Segment::Literal(literal), rest)) => {
            parts.first() == Some(&literal.as_str()) && match_segments(rest, &parts[1..])
        }
    }
}

/// Whether `name` is a valid event name.
pub fn is_valid_name(name: &str) -> bool {
    name.split('.').all(is_name_segment)
}

impl FromStr for Pattern {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_literal() {
        let p = Pattern::parse("gs.up.receive").unwrap();
        assert!(p.is_literal());
        assert!(p.matches("gs.up.receive"));
        assert!(!p.matches("gs.up.receive.extra"));
        assert!(!p.matches("gs.up"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let p = Pattern::parse("gs.up.*").unwrap();
        assert!(!p.is_literal());
        assert!(p.matches("gs.up.receive"));
        assert!(p.matches("gs.up.drop"));
        assert!(!p.matches("gs.up"));
        assert!(!p.matches("gs.up.forward.attempt"));
    }

    #[test]
    fn test_multi_segment_wildcard() {
        let p = Pattern::parse("gs.**").unwrap();
        assert!(p.matches("gs"));
        assert!(p.matches("gs.up.receive"));
        assert!(!p.matches("ns.up.receive"));

        let p = Pattern::parse("**.receive").unwrap();
        assert!(p.matches("gs.up.receive"));
        assert!(p.matches("receive"));
        assert!(!p.matches("gs.up.drop"));
    }

    #[test]
    fn test_invalid_patterns() {
        for pattern in ["", "gs.up*", "gs..up", "GS.up", "gs.up-down", "gs.*x"] {
            assert!(
                matches!(Pattern::parse(pattern), Err(BusError::InvalidPattern { .. })),
                "{pattern} should be invalid"
            );
        }
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("gs.up.receive"));
        assert!(is_valid_name("fs.write"));
        assert!(is_valid_name("as_1.up_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("gs."));
        assert!(!is_valid_name("gs.Up"));
        assert!(!is_valid_name("gs.*"));
    }

    proptest! {
        #[test]
        fn prop_names_match_themselves(name in "[a-z0-9_]{1,5}(\\.[a-z0-9_]{1,5}){0,4}") {
            let pattern = Pattern::parse(&name).unwrap();
            prop_assert!(pattern.matches(&name));
            prop_assert!(Pattern::parse("**").unwrap().matches(&name));
        }
    }
}
