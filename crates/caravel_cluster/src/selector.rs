//! Label-selector parsing and matching.
//!
//! Selectors filter the pool of resource definitions a run draws from. The
//! grammar is the equality-based subset of label-selector syntax: requirements
//! joined by commas, each `key=value`, `key!=value`, or a bare `key`
//! (existence). The empty string selects everything.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

/// Errors produced while parsing a selector expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// A requirement did not match the supported grammar.
    #[error("malformed selector requirement: {0:?}")]
    Malformed(String),

    /// A requirement had an empty key.
    #[error("empty key in selector requirement: {0:?}")]
    EmptyKey(String),
}

/// One parsed selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value`: the label must be present with exactly this value.
    Equals(String, String),
    /// `key!=value`: the label must be absent or carry a different value.
    NotEquals(String, String),
    /// `key`: the label must be present, any value.
    Exists(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key).is_some_and(|v| v == value),
            Requirement::NotEquals(key, value) => !labels.get(key).is_some_and(|v| v == value),
            Requirement::Exists(key) => labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals(key, value) => write!(f, "{key}={value}"),
            Requirement::NotEquals(key, value) => write!(f, "{key}!={value}"),
            Requirement::Exists(key) => f.write_str(key),
        }
    }
}

/// A parsed label selector: the conjunction of its requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// The selector that matches every definition.
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Parses a selector expression. Empty (or all-whitespace) input yields
    /// the match-all selector.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] for requirements outside the equality-based
    /// grammar; set-based expressions (`in`, `notin`) are rejected.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::match_all());
        }

        let mut requirements = Vec::new();
        for term in input.split(',') {
            let term = term.trim();
            if term.is_empty() {
                return Err(SelectorError::Malformed(input.to_owned()));
            }
            requirements.push(parse_requirement(term)?);
        }
        Ok(Self { requirements })
    }

    /// Returns true if the given label set satisfies every requirement.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|req| req.matches(labels))
    }

    /// Returns true if this is the match-all selector.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Returns the parsed requirements.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{req}")?;
        }
        Ok(())
    }
}

fn parse_requirement(term: &str) -> Result<Requirement, SelectorError> {
    let (key, rest) = if let Some((key, value)) = term.split_once("!=") {
        (key.trim(), Some((value.trim(), true)))
    } else if let Some((key, value)) = term.split_once('=') {
        (key.trim(), Some((value.trim(), false)))
    } else {
        (term, None)
    };

    if key.is_empty() {
        return Err(SelectorError::EmptyKey(term.to_owned()));
    }
    // Keys with embedded whitespace catch set-based expressions like
    // "env in (a,b)", which this grammar does not support.
    if key.contains(char::is_whitespace) || key.contains('!') || key.contains('=') {
        return Err(SelectorError::Malformed(term.to_owned()));
    }
    // A second operator inside the value ("a==b", "a=b!=c") is not part of
    // this grammar either.
    if let Some((value, _)) = rest
        && (value.contains('=') || value.contains('!'))
    {
        return Err(SelectorError::Malformed(term.to_owned()));
    }

    Ok(match rest {
        Some((value, true)) => Requirement::NotEquals(key.to_owned(), value.to_owned()),
        Some((value, false)) => Requirement::Equals(key.to_owned(), value.to_owned()),
        None => Requirement::Exists(key.to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = Selector::parse("").unwrap();
        assert!(sel.is_match_all());
        assert!(sel.matches(&labels(&[("app", "web")])));
        assert!(sel.matches(&BTreeMap::new()));
    }

    #[test]
    fn equality_requirement() {
        let sel = Selector::parse("app=web").unwrap();
        assert!(sel.matches(&labels(&[("app", "web")])));
        assert!(!sel.matches(&labels(&[("app", "db")])));
        assert!(!sel.matches(&BTreeMap::new()));
    }

    #[test]
    fn conjunction_of_requirements() {
        let sel = Selector::parse("app=web, tier!=cache, release").unwrap();
        assert!(sel.matches(&labels(&[("app", "web"), ("release", "v2")])));
        assert!(!sel.matches(&labels(&[("app", "web"), ("tier", "cache"), ("release", "v2")])));
        assert!(!sel.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn not_equals_matches_absent_label() {
        let sel = Selector::parse("tier!=cache").unwrap();
        assert!(sel.matches(&BTreeMap::new()));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(
            Selector::parse("env in (a,b)"),
            Err(SelectorError::Malformed(_))
        ));
        assert!(matches!(
            Selector::parse("=web"),
            Err(SelectorError::EmptyKey(_))
        ));
        assert!(matches!(
            Selector::parse("app=web,,tier=db"),
            Err(SelectorError::Malformed(_))
        ));
    }

    #[test]
    fn display_round_trips() {
        let sel = Selector::parse("app=web,tier!=cache,release").unwrap();
        assert_eq!(format!("{sel}"), "app=web,tier!=cache,release");
        assert_eq!(Selector::parse(&format!("{sel}")).unwrap(), sel);
    }
}
