//! Glob matching for [`crate::model::TagFilter`] (spec.md §4.1 `list`).
//!
//! A small hand-rolled `*`/`?` matcher, kept local rather than pulling in a
//! glob crate for a single bounded string operation — the same call the
//! teacher makes for its own small, well-bounded pattern matching in
//! `storage/util.rs`.

use crate::model::{TagDefinition, TagFilter, TagFilterField};

fn field_value<'a>(def: &'a TagDefinition, field: TagFilterField) -> &'a str {
    match field {
        TagFilterField::Name => &def.name,
        TagFilterField::Description => &def.description,
        TagFilterField::Units => &def.units,
    }
}

/// Whether `def` matches `filter`.
pub fn matches(filter: &TagFilter, def: &TagDefinition) -> bool {
    match filter {
        TagFilter::Any => true,
        TagFilter::Glob { field, pattern } => {
            glob_match(&pattern.to_ascii_lowercase(), &field_value(def, *field).to_ascii_lowercase())
        }
        TagFilter::And(clauses) => clauses.iter().all(|c| matches(c, def)),
        TagFilter::Or(clauses) => clauses.iter().any(|c| matches(c, def)),
    }
}

/// `*` matches any run of characters (including none); `?` matches exactly
/// one character. Matching is on already-lowercased input (case-insensitive
/// per spec.md §4.1).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let mut memo = vec![vec![None; t.len() + 1]; p.len() + 1];
    glob_match_rec(&p, &t, 0, 0, &mut memo)
}

fn glob_match_rec(p: &[char], t: &[char], pi: usize, ti: usize, memo: &mut Vec<Vec<Option<bool>>>) -> bool {
    if let Some(cached) = memo[pi][ti] {
        return cached;
    }
    let result = if pi == p.len() {
        ti == t.len()
    } else {
        match p[pi] {
            '*' => {
                (ti..=t.len()).any(|k| glob_match_rec(p, t, pi + 1, k, memo))
            }
            '?' => ti < t.len() && glob_match_rec(p, t, pi + 1, ti + 1, memo),
            c => ti < t.len() && t[ti] == c && glob_match_rec(p, t, pi + 1, ti + 1, memo),
        }
    };
    memo[pi][ti] = Some(result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("reactor.*", "reactor.temp"));
        assert!(glob_match("*.temp", "reactor.temp"));
        assert!(!glob_match("reactor.*", "boiler.temp"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_match("tag?", "tag1"));
        assert!(!glob_match("tag?", "tag12"));
    }

    #[test]
    fn empty_pattern_matches_empty_text_only() {
        assert!(glob_match("", ""));
        assert!(!glob_match("", "x"));
    }

    #[test]
    fn and_or_clauses_compose() {
        let def = TagDefinition {
            id: crate::model::uuid_like::TagId::new(),
            name: "Reactor.Temp".into(),
            data_type: crate::model::DataType::FloatingPoint,
            units: "degC".into(),
            description: "primary reactor".into(),
            state_set_name: None,
            exception_cfg: crate::model::FilterConfig::disabled(),
            compression_cfg: crate::model::FilterConfig::disabled(),
            metadata: crate::model::Metadata {
                created_at: chrono::Utc::now(),
                creator: "t".into(),
                modified_at: chrono::Utc::now(),
                modifier: "t".into(),
            },
            security: crate::model::Security {
                owner: "t".into(),
                policies: vec![],
            },
        };
        let and_filter = TagFilter::And(vec![
            TagFilter::Glob { field: TagFilterField::Name, pattern: "reactor.*".into() },
            TagFilter::Glob { field: TagFilterField::Units, pattern: "degc".into() },
        ]);
        assert!(matches(&and_filter, &def));
        let or_filter = TagFilter::Or(vec![
            TagFilter::Glob { field: TagFilterField::Name, pattern: "boiler.*".into() },
            TagFilter::Glob { field: TagFilterField::Description, pattern: "*reactor*".into() },
        ]);
        assert!(matches(&or_filter, &def));
    }
}
