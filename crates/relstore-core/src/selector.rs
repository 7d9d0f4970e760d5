//! Label and Field Selectors
//!
//! Parsers and matchers for the Kubernetes selector syntax used by list and
//! watch calls.
//!
//! Label selectors support the full requirement grammar:
//!
//! ```text
//! app=web,tier!=cache,env in (prod, staging),!legacy,owned
//! ```
//!
//! Field selectors support equality and inequality only, matching the
//! upstream API surface:
//!
//! ```text
//! status.phase=Running,metadata.name!=bootstrap
//! ```
//!
//! Matching always happens in-process against deserialized objects. The
//! storage engine additionally pushes *indexable equality* terms down into
//! SQL predicates on `field_*` columns; [`LabelSelector::equalities`] and
//! [`FieldSelector::equalities`] expose the terms eligible for that.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One parsed label requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            Operator::Equals => labels.get(&self.key).map(String::as_str)
                == Some(self.values[0].as_str()),
            Operator::NotEquals => {
                labels.get(&self.key).map(String::as_str) != Some(self.values[0].as_str())
            }
            Operator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|w| w == v)),
            Operator::NotIn => !labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|w| w == v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

/// A parsed label selector: the conjunction of its requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parses the selector string. An empty string selects everything.
    pub fn parse(s: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for term in split_terms(s) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            requirements.push(parse_requirement(term)?);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Single-valued equality terms, the shape eligible for SQL pushdown on
    /// indexed labels.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &str)> {
        self.requirements.iter().filter_map(|r| match r.operator {
            Operator::Equals => Some((r.key.as_str(), r.values[0].as_str())),
            _ => None,
        })
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for r in &self.requirements {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match r.operator {
                Operator::Equals => write!(f, "{}={}", r.key, r.values[0])?,
                Operator::NotEquals => write!(f, "{}!={}", r.key, r.values[0])?,
                Operator::In => write!(f, "{} in ({})", r.key, r.values.join(","))?,
                Operator::NotIn => write!(f, "{} notin ({})", r.key, r.values.join(","))?,
                Operator::Exists => f.write_str(&r.key)?,
                Operator::DoesNotExist => write!(f, "!{}", r.key)?,
            }
        }
        Ok(())
    }
}

/// One field selector term: `path op value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTerm {
    pub path: String,
    pub value: String,
    pub negated: bool,
}

/// A parsed field selector: the conjunction of its terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    terms: Vec<FieldTerm>,
}

impl FieldSelector {
    /// Parses the selector string. Only `=`, `==`, and `!=` are recognized.
    pub fn parse(s: &str) -> Result<Self> {
        let mut terms = Vec::new();
        for term in split_terms(s) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let (path, value, negated) = if let Some((p, v)) = term.split_once("!=") {
                (p, v, true)
            } else if let Some((p, v)) = term.split_once("==") {
                (p, v, false)
            } else if let Some((p, v)) = term.split_once('=') {
                (p, v, false)
            } else {
                return Err(Error::Invalid(format!(
                    "field selector term {term:?} is not an =, ==, or != comparison"
                )));
            };
            let path = path.trim();
            if path.is_empty() {
                return Err(Error::Invalid(format!(
                    "field selector term {term:?} has an empty path"
                )));
            }
            terms.push(FieldTerm {
                path: path.to_string(),
                value: value.trim().to_string(),
                negated,
            });
        }
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[FieldTerm] {
        &self.terms
    }

    /// Evaluates the selector against an accessor resolving dotted paths to
    /// string values (absent fields resolve to `None`).
    pub fn matches<F>(&self, mut get: F) -> bool
    where
        F: FnMut(&str) -> Option<String>,
    {
        self.terms.iter().all(|t| {
            let actual = get(&t.path);
            if t.negated {
                actual.as_deref() != Some(t.value.as_str())
            } else {
                actual.as_deref() == Some(t.value.as_str())
            }
        })
    }

    /// Non-negated terms, the shape eligible for SQL pushdown on indexed
    /// fields.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().filter_map(|t| {
            (!t.negated).then_some((t.path.as_str(), t.value.as_str()))
        })
    }
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for t in &self.terms {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            let op = if t.negated { "!=" } else { "=" };
            write!(f, "{}{}{}", t.path, op, t.value)?;
        }
        Ok(())
    }
}

/// Splits on commas that are not enclosed in parentheses.
fn split_terms(s: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&s[start..]);
    terms
}

fn parse_requirement(term: &str) -> Result<Requirement> {
    if let Some(key) = term.strip_prefix('!') {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Invalid("label selector term \"!\" has no key".into()));
        }
        return Ok(Requirement {
            key: key.to_string(),
            operator: Operator::DoesNotExist,
            values: Vec::new(),
        });
    }

    // Set-based terms: `key in (a, b)` / `key notin (a, b)`. The keyword
    // only counts before any comparison operator, so values containing
    // " in " parse as values.
    for (word, operator) in [(" notin ", Operator::NotIn), (" in ", Operator::In)] {
        if let Some(idx) = term.find(word) {
            if term[..idx].contains('=') || term[..idx].contains('!') {
                continue;
            }
            let key = term[..idx].trim();
            let rest = term[idx + word.len()..].trim();
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(|| {
                    Error::Invalid(format!(
                        "label selector term {term:?} must list values in parentheses"
                    ))
                })?;
            let values: Vec<String> = inner
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if key.is_empty() || values.is_empty() {
                return Err(Error::Invalid(format!(
                    "label selector term {term:?} is malformed"
                )));
            }
            return Ok(Requirement {
                key: key.to_string(),
                operator,
                values,
            });
        }
    }

    let (key, value, operator) = if let Some((k, v)) = term.split_once("!=") {
        (k, v, Operator::NotEquals)
    } else if let Some((k, v)) = term.split_once("==") {
        (k, v, Operator::Equals)
    } else if let Some((k, v)) = term.split_once('=') {
        (k, v, Operator::Equals)
    } else {
        // Bare key: existence check.
        let key = term.trim();
        if key.contains(char::is_whitespace) {
            return Err(Error::Invalid(format!(
                "label selector term {term:?} is malformed"
            )));
        }
        return Ok(Requirement {
            key: key.to_string(),
            operator: Operator::Exists,
            values: Vec::new(),
        });
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::Invalid(format!(
            "label selector term {term:?} has an empty key"
        )));
    }
    Ok(Requirement {
        key: key.to_string(),
        operator,
        values: vec![value.trim().to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_equality_terms() {
        let sel = LabelSelector::parse("app=web,tier!=cache").unwrap();
        assert!(sel.matches(&labels(&[("app", "web"), ("tier", "db")])));
        assert!(!sel.matches(&labels(&[("app", "web"), ("tier", "cache")])));
        assert!(!sel.matches(&labels(&[("tier", "db")])));
    }

    #[test]
    fn not_equals_matches_absent_key() {
        let sel = LabelSelector::parse("tier!=cache").unwrap();
        assert!(sel.matches(&labels(&[])));
    }

    #[test]
    fn parse_set_terms() {
        let sel = LabelSelector::parse("env in (prod, staging)").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod")])));
        assert!(sel.matches(&labels(&[("env", "staging")])));
        assert!(!sel.matches(&labels(&[("env", "dev")])));
        assert!(!sel.matches(&labels(&[])));

        let sel = LabelSelector::parse("env notin (prod)").unwrap();
        assert!(sel.matches(&labels(&[("env", "dev")])));
        assert!(sel.matches(&labels(&[])));
        assert!(!sel.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn parse_existence_terms() {
        let sel = LabelSelector::parse("owned,!legacy").unwrap();
        assert!(sel.matches(&labels(&[("owned", "yes")])));
        assert!(!sel.matches(&labels(&[("owned", "yes"), ("legacy", "1")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = LabelSelector::parse("").unwrap();
        assert!(sel.is_empty());
        assert!(sel.matches(&labels(&[("anything", "goes")])));
    }

    #[test]
    fn commas_inside_parens_do_not_split() {
        let sel = LabelSelector::parse("env in (a,b),app=web").unwrap();
        assert_eq!(sel.requirements().len(), 2);
    }

    #[test]
    fn equalities_skip_set_and_negated_terms() {
        let sel = LabelSelector::parse("a=1,b!=2,c in (3)").unwrap();
        let eq: Vec<_> = sel.equalities().collect();
        assert_eq!(eq, vec![("a", "1")]);
    }

    #[test]
    fn values_containing_the_in_keyword_stay_values() {
        let sel = LabelSelector::parse("note=logged in user").unwrap();
        assert!(sel.matches(&labels(&[("note", "logged in user")])));
        assert!(!sel.matches(&labels(&[("note", "logged out")])));
    }

    #[test]
    fn field_selector_equality_and_inequality() {
        let sel = FieldSelector::parse("status.phase=Running,metadata.name!=boot").unwrap();
        let get = |path: &str| match path {
            "status.phase" => Some("Running".to_string()),
            "metadata.name" => Some("w1".to_string()),
            _ => None,
        };
        assert!(sel.matches(get));

        let get = |path: &str| match path {
            "status.phase" => Some("Pending".to_string()),
            _ => None,
        };
        assert!(!sel.matches(get));
    }

    #[test]
    fn field_selector_rejects_bare_terms() {
        assert!(FieldSelector::parse("status.phase").is_err());
    }

    #[test]
    fn selector_display_round_trips() {
        let s = "app=web,tier!=cache,env in (prod,staging),owned,!legacy";
        let sel = LabelSelector::parse(s).unwrap();
        assert_eq!(LabelSelector::parse(&sel.to_string()).unwrap(), sel);
    }
}
