// ecmctl - CLI for the Cradlepoint ECM device-management API
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Glob search compilation.
//!
//! The ECM filter API only understands `exact`, `startswith` and `endswith`
//! refinements, while user searches use a richer glob dialect (`*`, `?`,
//! `{a,b,c}` alternation). A pattern therefore compiles into two halves:
//! a [`FilterSet`] that narrows the server query without ever excluding a
//! genuine match, and a [`Predicate`] that decides full compliance on each
//! fetched record. The filters are purely a latency optimization; pagers
//! always re-check candidates with the predicate.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Pattern constructs outside the supported dialect. The compiler refuses to
/// guess a semantics for these rather than silently extending the grammar.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("unbalanced braces in pattern `{0}`")]
    UnbalancedBraces(String),
    #[error("nested alternation is not supported: `{0}`")]
    NestedAlternation(String),
    #[error("only one {{...}} group is supported per pattern: `{0}`")]
    MultipleAlternations(String),
    #[error("`*` inside an alternation group is not supported: `{0}`")]
    StarInAlternative(String),
    #[error("alternation only combines with a single leading or trailing `*`: `{0}`")]
    MixedWildcards(String),
}

/// Server-side query refinement derived from a glob pattern. Keys follow the
/// ECM filter convention `<field>__<operator>`. An empty set means the
/// pattern cannot narrow the query and every candidate must be tested
/// locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    params: BTreeMap<String, String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Key/value pairs suitable for direct inclusion in a query string.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn insert(&mut self, field: &str, operator: &str, value: &str) {
        self.params
            .insert(format!("{field}__{operator}"), value.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok {
    Lit(char),
    /// `*`: zero or more arbitrary characters.
    AnyRun,
    /// `?`: exactly one arbitrary character.
    AnyOne,
}

/// Exact client-side matcher for one (field, pattern) pair. Total over any
/// record shape: a missing, null or non-string field value is a non-match,
/// never an error.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: String,
    alternatives: Vec<Vec<Tok>>,
}

impl Predicate {
    /// True when the record's field value matches the compiled pattern.
    pub fn matches(&self, record: &Value) -> bool {
        match field_value(record, &self.field) {
            Some(Value::String(s)) => self.matches_str(s),
            _ => false,
        }
    }

    /// Match a bare string value against the compiled pattern.
    pub fn matches_str(&self, value: &str) -> bool {
        self.alternatives.iter().any(|toks| glob_match(toks, value))
    }
}

/// Look up `path` in a record: direct key first, then dotted-path descent
/// into nested objects, so flat dotted-key maps and nested payloads both
/// work.
pub fn field_value<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(v) = record.get(path) {
        return Some(v);
    }
    let mut current = record;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Compile a glob `pattern` over `field` into a server [`FilterSet`] and an
/// exact client [`Predicate`].
///
/// Filter derivation: a pattern with no metacharacters maps to `exact`;
/// otherwise the literal head before the first metacharacter maps to
/// `startswith` and the literal tail after the last one to `endswith`, each
/// only when non-empty. The filters over-approximate (they may admit records
/// the predicate rejects) but never exclude a true match.
pub fn compile(field: &str, pattern: &str) -> Result<(FilterSet, Predicate), PatternError> {
    let group = extract_group(pattern)?;

    if let Some(g) = &group {
        let prefix = &pattern[..g.start];
        let suffix = &pattern[g.end..];
        let stars = prefix.matches('*').count() + suffix.matches('*').count();
        let edge = match stars {
            0 => true,
            1 => prefix.starts_with('*') || suffix.ends_with('*'),
            _ => false,
        };
        if !edge {
            return Err(PatternError::MixedWildcards(pattern.to_string()));
        }
    }

    let mut filters = FilterSet::default();
    let spans = meta_spans(pattern, group.as_ref());
    match (spans.first(), spans.last()) {
        (Some(&(first, _)), Some(&(_, last))) => {
            let head = &pattern[..first];
            let tail = &pattern[last..];
            if !head.is_empty() {
                filters.insert(field, "startswith", head);
            }
            if !tail.is_empty() {
                filters.insert(field, "endswith", tail);
            }
        }
        _ => filters.insert(field, "exact", pattern),
    }

    let expanded: Vec<String> = match &group {
        Some(g) => g
            .alternatives
            .iter()
            .map(|alt| format!("{}{}{}", &pattern[..g.start], alt, &pattern[g.end..]))
            .collect(),
        None => vec![pattern.to_string()],
    };

    let predicate = Predicate {
        field: field.to_string(),
        alternatives: expanded.iter().map(|p| tokenize(p)).collect(),
    };
    Ok((filters, predicate))
}

struct Group {
    /// Byte offset of the opening brace.
    start: usize,
    /// Byte offset one past the closing brace.
    end: usize,
    alternatives: Vec<String>,
}

fn extract_group(pattern: &str) -> Result<Option<Group>, PatternError> {
    let mut open: Option<usize> = None;
    let mut group: Option<Group> = None;
    for (i, ch) in pattern.char_indices() {
        match ch {
            '{' => {
                if open.is_some() {
                    return Err(PatternError::NestedAlternation(pattern.to_string()));
                }
                if group.is_some() {
                    return Err(PatternError::MultipleAlternations(pattern.to_string()));
                }
                open = Some(i);
            }
            '}' => {
                let start = open
                    .take()
                    .ok_or_else(|| PatternError::UnbalancedBraces(pattern.to_string()))?;
                let body = &pattern[start + 1..i];
                if body.contains('*') {
                    return Err(PatternError::StarInAlternative(pattern.to_string()));
                }
                group = Some(Group {
                    start,
                    end: i + 1,
                    alternatives: body.split(',').map(str::to_string).collect(),
                });
            }
            _ => {}
        }
    }
    if open.is_some() {
        return Err(PatternError::UnbalancedBraces(pattern.to_string()));
    }
    Ok(group)
}

/// Byte spans of every metacharacter, in pattern order. The whole `{...}`
/// group counts as one span.
fn meta_spans(pattern: &str, group: Option<&Group>) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for (i, ch) in pattern.char_indices() {
        if let Some(g) = group {
            if i == g.start {
                spans.push((g.start, g.end));
            }
            if i >= g.start && i < g.end {
                continue;
            }
        }
        if ch == '*' || ch == '?' {
            spans.push((i, i + ch.len_utf8()));
        }
    }
    spans
}

fn tokenize(pattern: &str) -> Vec<Tok> {
    pattern
        .chars()
        .map(|ch| match ch {
            '*' => Tok::AnyRun,
            '?' => Tok::AnyOne,
            other => Tok::Lit(other),
        })
        .collect()
}

/// Case-sensitive glob match with iterative `*` backtracking.
fn glob_match(tokens: &[Tok], value: &str) -> bool {
    let chars: Vec<char> = value.chars().collect();
    let mut t = 0;
    let mut c = 0;
    let mut backtrack: Option<(usize, usize)> = None;
    while c < chars.len() {
        match tokens.get(t) {
            Some(Tok::AnyRun) => {
                backtrack = Some((t, c));
                t += 1;
            }
            Some(Tok::AnyOne) => {
                t += 1;
                c += 1;
            }
            Some(Tok::Lit(l)) if *l == chars[c] => {
                t += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((bt, bc)) => {
                    backtrack = Some((bt, bc + 1));
                    t = bt + 1;
                    c = bc + 1;
                }
                None => return false,
            },
        }
    }
    while let Some(Tok::AnyRun) = tokens.get(t) {
        t += 1;
    }
    t == tokens.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn glob(pattern: &str) -> (FilterSet, Predicate) {
        compile("foo", pattern).unwrap()
    }

    fn test_value(predicate: &Predicate, value: &str) -> bool {
        predicate.matches(&json!({ "foo": value }))
    }

    #[test]
    fn exact_pattern() {
        let (filters, test) = glob("bar");
        assert_eq!(filters.get("foo__exact"), Some("bar"));
        assert_eq!(filters.len(), 1);
        assert!(test_value(&test, "bar"));
        assert!(!test_value(&test, "baz"));
    }

    #[test]
    fn just_star() {
        let (filters, test) = glob("*");
        assert!(filters.is_empty());
        assert!(test_value(&test, "bar"));
        assert!(test_value(&test, ""));
    }

    #[test]
    fn just_qmark() {
        let (filters, test) = glob("?");
        assert!(filters.is_empty());
        assert!(!test_value(&test, "no"));
        assert!(test_value(&test, "y"));
        assert!(!test_value(&test, ""));
    }

    #[test]
    fn prefix_with_star_tail() {
        let (filters, test) = glob("bar*");
        assert_eq!(filters.get("foo__startswith"), Some("bar"));
        assert_eq!(filters.len(), 1);
        assert!(!test_value(&test, "foobar"));
        assert!(test_value(&test, "barfoo"));
        assert!(test_value(&test, "bar"));
    }

    #[test]
    fn suffix_with_star_head() {
        let (filters, test) = glob("*bar");
        assert_eq!(filters.get("foo__endswith"), Some("bar"));
        assert_eq!(filters.len(), 1);
        assert!(test_value(&test, "foobar"));
        assert!(!test_value(&test, "barfoo"));
        assert!(test_value(&test, "bar"));
    }

    #[test]
    fn star_on_both_sides() {
        let (filters, test) = glob("*bar*");
        assert!(filters.is_empty());
        assert!(!test_value(&test, "ba"));
        assert!(!test_value(&test, "baz"));
        assert!(test_value(&test, "bar"));
        assert!(test_value(&test, "foobar"));
        assert!(test_value(&test, "barfoo"));
        assert!(test_value(&test, "foobarbaz"));
    }

    #[test]
    fn interior_star_keeps_both_filters() {
        let (filters, test) = glob("bar*baz");
        assert_eq!(filters.get("foo__startswith"), Some("bar"));
        assert_eq!(filters.get("foo__endswith"), Some("baz"));
        assert!(test_value(&test, "barbaz"));
        assert!(test_value(&test, "bar-x-baz"));
        assert!(!test_value(&test, "barba"));
    }

    #[test]
    fn qmark_matches_exactly_one_char() {
        let (filters, test) = glob("b?r");
        assert_eq!(filters.get("foo__startswith"), Some("b"));
        assert_eq!(filters.get("foo__endswith"), Some("r"));
        assert!(test_value(&test, "bar"));
        assert!(test_value(&test, "bZr"));
        assert!(!test_value(&test, "br"));
        assert!(!test_value(&test, "baar"));
    }

    #[test]
    fn alternation_matches_whole_value() {
        let (filters, test) = glob("{a,bb,ccc}");
        assert!(filters.is_empty());
        assert!(test_value(&test, "a"));
        assert!(test_value(&test, "bb"));
        assert!(test_value(&test, "ccc"));
        assert!(!test_value(&test, "accc"));
        assert!(!test_value(&test, "aa"));
        assert!(!test_value(&test, "b"));
    }

    #[test]
    fn alternation_with_leading_star_is_suffix_match() {
        let (filters, test) = glob("*{a,bb}");
        assert!(filters.is_empty());
        assert!(test_value(&test, "a"));
        assert!(test_value(&test, "bbb"));
        assert!(test_value(&test, "abb"));
        assert!(!test_value(&test, "b"));
        assert!(!test_value(&test, "accc"));
    }

    #[test]
    fn alternation_with_trailing_star_is_prefix_match() {
        let (filters, test) = glob("{a,bb}*");
        assert!(filters.is_empty());
        assert!(test_value(&test, "a"));
        assert!(test_value(&test, "abb"));
        assert!(test_value(&test, "bba"));
        assert!(!test_value(&test, "b"));
    }

    #[test]
    fn qmark_inside_alternative() {
        let (filters, test) = glob("{a,b?b}");
        assert!(filters.is_empty());
        assert!(test_value(&test, "a"));
        assert!(test_value(&test, "bab"));
        assert!(test_value(&test, "bZb"));
        assert!(test_value(&test, "b?b"));
        assert!(!test_value(&test, "ab"));
        assert!(!test_value(&test, "bbba"));
    }

    #[test]
    fn alternation_with_literal_prefix_narrows() {
        let (filters, test) = glob("cr{100,300}");
        assert_eq!(filters.get("foo__startswith"), Some("cr"));
        assert!(test_value(&test, "cr100"));
        assert!(test_value(&test, "cr300"));
        assert!(!test_value(&test, "cr200"));
        assert!(!test_value(&test, "100"));
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert_eq!(
            compile("foo", "{a,b").unwrap_err(),
            PatternError::UnbalancedBraces("{a,b".into())
        );
        assert_eq!(
            compile("foo", "a}b").unwrap_err(),
            PatternError::UnbalancedBraces("a}b".into())
        );
    }

    #[test]
    fn rejects_nested_and_multiple_groups() {
        assert_eq!(
            compile("foo", "{a,{b,c}}").unwrap_err(),
            PatternError::NestedAlternation("{a,{b,c}}".into())
        );
        assert_eq!(
            compile("foo", "{a,b}{c,d}").unwrap_err(),
            PatternError::MultipleAlternations("{a,b}{c,d}".into())
        );
    }

    #[test]
    fn rejects_star_inside_alternative() {
        assert_eq!(
            compile("foo", "{a*,b}").unwrap_err(),
            PatternError::StarInAlternative("{a*,b}".into())
        );
    }

    #[test]
    fn rejects_alternation_with_stars_on_both_sides() {
        assert_eq!(
            compile("foo", "*{a,b}*").unwrap_err(),
            PatternError::MixedWildcards("*{a,b}*".into())
        );
        assert_eq!(
            compile("foo", "x*{a,b}").unwrap_err(),
            PatternError::MixedWildcards("x*{a,b}".into())
        );
    }

    #[test]
    fn filters_agree_with_predicate_on_single_operator_patterns() {
        // exact / startswith / endswith filters must select precisely the
        // values the predicate accepts.
        let values = ["bar", "barfoo", "foobar", "", "ba", "xbarx"];
        let cases: [(&str, Box<dyn Fn(&str) -> bool>); 3] = [
            ("bar", Box::new(|v: &str| v == "bar")),
            ("bar*", Box::new(|v: &str| v.starts_with("bar"))),
            ("*bar", Box::new(|v: &str| v.ends_with("bar"))),
        ];
        for (pattern, server_side) in cases {
            let (filters, test) = glob(pattern);
            assert_eq!(filters.len(), 1);
            for value in values {
                assert_eq!(test_value(&test, value), server_side(value), "{pattern} vs {value}");
            }
        }
    }

    #[test]
    fn missing_and_non_string_fields_never_match() {
        let (_, test) = glob("*");
        assert!(!test.matches(&json!({})));
        assert!(!test.matches(&json!({ "foo": null })));
        assert!(!test.matches(&json!({ "foo": 7 })));
        assert!(!test.matches(&json!({ "other": "bar" })));
        assert!(!test.matches(&json!("bar")));
    }

    #[test]
    fn dotted_field_paths_descend_into_nested_objects() {
        let (_, test) = compile("product.name", "MBR*").unwrap();
        assert!(test.matches(&json!({ "product": { "name": "MBR1400" } })));
        assert!(!test.matches(&json!({ "product": { "name": "IBR600" } })));
        // A literal dotted key takes priority over descent.
        assert!(test.matches(&json!({ "product.name": "MBR1400" })));
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let (_, test) = glob("{a,b?b}*");
        for _ in 0..3 {
            assert!(test.matches_str("bxb-suffix"));
            assert!(!test.matches_str("c"));
        }
    }
}
