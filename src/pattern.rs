//! Route pattern compilation.
//!
//! A pattern is turned into one anchored [`Regex`] plus the ordered list of
//! parameter names, once, at registration time:
//!
//! | Pattern piece | Compiles to |
//! |---|---|
//! | `/users` | the escaped literal |
//! | `{id}` | `([^/]+)`, exactly one path segment |
//! | `{id:[0-9]+}` | `([0-9]+)`, the constraint verbatim (may span `/`) |
//!
//! A single trailing `/` is insignificant on both sides: it is stripped from
//! the pattern and the compiled matcher accepts an optional one on the path.
//!
//! An unterminated `{` is *not* an error. Everything from that brace onwards
//! is copied as literal text, so `/a/{b` only ever matches the path `/a/{b`.
//!
//! Braces nest while looking for the closing `}`, so a constraint may carry
//! its own quantifier (`{y:[0-9]{4}}`). The flip side is that a stray `{`
//! swallows every later parameter: in `/a/{b/{id}` the outer brace never
//! closes, the whole tail is literal, and `{id}` is not a parameter.

use regex::Regex;
use thiserror::Error;

/// Constraint used by `{name}` when none is given: one non-empty segment.
const DEFAULT_CONSTRAINT: &str = "[^/]+";

/// Returned when a `{name:constraint}` constraint is not a valid regex.
#[derive(Debug, Error)]
#[error("invalid route pattern `{pattern}`: {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// The compiled form of a route pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
    names: Vec<String>,
    // Capture-group index of each name; constraints may carry groups of their
    // own, so positions are not simply `1..=names.len()`.
    groups: Vec<usize>,
}

/// Path parameters captured by a [`Matcher`], in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Value captured for `name`. When a pattern repeats a name, the last
    /// capture wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Compiles `pattern` into a [`Matcher`].
///
/// `""` and `"/"` both compile to the root matcher, which accepts `/` only.
pub fn compile(pattern: &str) -> Result<Matcher, PatternError> {
    let trimmed = pattern.strip_suffix('/').unwrap_or(pattern);

    let mut source = String::from("^");
    let mut names = Vec::new();

    if trimmed.is_empty() {
        source.push_str("/$");
    } else {
        let mut rest = trimmed;
        while let Some(open) = rest.find('{') {
            let Some(close) = closing_brace(&rest[open..]).map(|i| open + i) else {
                break;
            };
            source.push_str(&regex::escape(&rest[..open]));

            let inner = &rest[open + 1..close];
            let (name, constraint) = inner.split_once(':').unwrap_or((inner, DEFAULT_CONSTRAINT));
            source.push_str(&format!("(?P<{}>{constraint})", group_name(names.len())));
            names.push(name.to_owned());

            rest = &rest[close + 1..];
        }
        source.push_str(&regex::escape(rest));
        source.push_str("/?$");
    }

    let regex = Regex::new(&source).map_err(|source| PatternError {
        pattern: pattern.to_owned(),
        source,
    })?;

    let groups = (0..names.len())
        .map(|i| {
            let wanted = group_name(i);
            regex
                .capture_names()
                .position(|n| n == Some(wanted.as_str()))
                .unwrap_or(usize::MAX)
        })
        .collect();

    Ok(Matcher { regex, names, groups })
}

impl Matcher {
    /// Tests `path` and, on success, returns the captured parameters aligned
    /// with [`param_names`](Self::param_names).
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let entries = self
            .names
            .iter()
            .zip(&self.groups)
            .map(|(name, &group)| {
                let value = caps.get(group).map_or("", |m| m.as_str());
                (name.clone(), value.to_owned())
            })
            .collect();
        Some(Params { entries })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// The generated regular expression, for diagnostics.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

fn group_name(index: usize) -> String {
    format!("__sy{index}")
}

/// Byte offset of the `}` closing the `{` at the start of `s`. Braces nest,
/// so quantifiers such as `{id:[0-9]{4}}` survive.
fn closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(m: &Matcher, path: &str) -> Option<Vec<(String, String)>> {
        m.captures(path)
            .map(|p| p.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
    }

    #[test]
    fn literal_pattern_accepts_only_itself() {
        let m = compile("/users/list").unwrap();
        assert!(m.is_match("/users/list"));
        assert!(m.is_match("/users/list/"));
        assert!(!m.is_match("/users"));
        assert!(!m.is_match("/users/list/x"));
        assert!(!m.is_match("/users/listing"));
        assert!(!m.is_match("/prefix/users/list"));
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        let m = compile("/v1.0/a+b").unwrap();
        assert!(m.is_match("/v1.0/a+b"));
        assert!(!m.is_match("/v1x0/aab"));
    }

    #[test]
    fn trailing_slash_on_pattern_is_ignored() {
        let m = compile("/users/").unwrap();
        assert!(m.is_match("/users"));
        assert!(m.is_match("/users/"));
    }

    #[test]
    fn root_matches_only_root() {
        for pattern in ["", "/"] {
            let m = compile(pattern).unwrap();
            assert!(m.is_match("/"), "{pattern:?}");
            assert!(!m.is_match("//"), "{pattern:?}");
            assert!(!m.is_match("/a"), "{pattern:?}");
        }
    }

    #[test]
    fn named_parameter_takes_one_segment() {
        let m = compile("/users/{id}").unwrap();
        assert_eq!(
            params(&m, "/users/123"),
            Some(vec![("id".into(), "123".into())])
        );
        assert_eq!(params(&m, "/users/"), None);
        assert_eq!(params(&m, "/users/123/x"), None);
    }

    #[test]
    fn constraint_filters_values() {
        let m = compile("/users/{id:[0-9]+}").unwrap();
        assert_eq!(params(&m, "/users/abc"), None);
        assert_eq!(
            params(&m, "/users/42"),
            Some(vec![("id".into(), "42".into())])
        );
    }

    #[test]
    fn catch_all_spans_segments() {
        let m = compile("/files/{path:.*}").unwrap();
        let p = m.captures("/files/a/b/c.txt").unwrap();
        assert_eq!(p.get("path"), Some("a/b/c.txt"));
    }

    #[test]
    fn names_follow_pattern_order() {
        let m = compile("/orgs/{org}/repos/{repo:[a-z-]+}/issues/{n:[0-9]+}").unwrap();
        assert_eq!(m.param_names(), ["org", "repo", "n"]);
        let p = m.captures("/orgs/rust/repos/regex-lite/issues/7").unwrap();
        let values: Vec<_> = p.iter().collect();
        assert_eq!(
            values,
            [("org", "rust"), ("repo", "regex-lite"), ("n", "7")]
        );
    }

    #[test]
    fn groups_inside_constraints_do_not_shift_captures() {
        let m = compile("/{kind:(cat|dog)s}/{id}").unwrap();
        let p = m.captures("/dogs/9").unwrap();
        assert_eq!(p.get("kind"), Some("dogs"));
        assert_eq!(p.get("id"), Some("9"));
    }

    #[test]
    fn quantifier_braces_nest() {
        let m = compile("/years/{y:[0-9]{4}}").unwrap();
        assert!(m.is_match("/years/2024"));
        assert!(!m.is_match("/years/24"));
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let m = compile("/a/{b").unwrap();
        assert!(m.param_names().is_empty());
        assert!(m.is_match("/a/{b"));
        assert!(!m.is_match("/a/x"));

        let m = compile("/x/{id}/{tail").unwrap();
        assert_eq!(m.param_names(), ["id"]);
        assert_eq!(m.captures("/x/7/{tail").unwrap().get("id"), Some("7"));
    }

    #[test]
    fn stray_brace_swallows_later_parameters() {
        let m = compile("/a/{b/{id}").unwrap();
        assert!(m.param_names().is_empty());
        assert!(m.is_match("/a/{b/{id}"));
        assert!(!m.is_match("/a/{b/7"));
    }

    #[test]
    fn invalid_constraint_is_reported() {
        let err = compile("/x/{id:[}").unwrap_err();
        assert!(err.to_string().starts_with("invalid route pattern `/x/{id:[}`"));
    }
}
