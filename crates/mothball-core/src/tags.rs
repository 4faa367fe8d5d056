//! Tag-based resource selection

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::TrickError;

/// A single `key=value` selection pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

/// Key/value criteria scoping which resources a trick discovers
///
/// The filter is opaque to the engine; tricks translate it into whatever
/// their provider API understands (server-side filters where supported,
/// client-side matching otherwise). An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pairs: Vec<TagPair>,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of `key=value` arguments as given on the command line
    pub fn parse(specs: &[String]) -> crate::error::Result<Self> {
        let mut filter = Self::new();
        for spec in specs {
            filter.pairs.push(spec.parse()?);
        }
        Ok(filter)
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push(TagPair {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn pairs(&self) -> &[TagPair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// True when every filter pair is present in the resource's tags
    pub fn matches<'a, I>(&self, resource_tags: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.pairs.is_empty() {
            return true;
        }
        let tags: Vec<(&str, &str)> = resource_tags.into_iter().collect();
        self.pairs.iter().all(|pair| {
            tags.iter()
                .any(|(k, v)| *k == pair.key && *v == pair.value)
        })
    }
}

impl FromStr for TagPair {
    type Err = TrickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').ok_or_else(|| {
            TrickError::InvalidConfig(format!("invalid tag filter '{s}', expected key=value"))
        })?;
        if key.is_empty() {
            return Err(TrickError::InvalidConfig(format!(
                "invalid tag filter '{s}', key must not be empty"
            )));
        }
        Ok(TagPair {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_specs() {
        let filter =
            TagFilter::parse(&["team=platform".to_string(), "env=staging".to_string()]).unwrap();
        assert_eq!(filter.pairs().len(), 2);
        assert_eq!(filter.pairs()[0].key, "team");
        assert_eq!(filter.pairs()[1].value, "staging");
    }

    #[test]
    fn rejects_specs_without_separator() {
        assert!(TagFilter::parse(&["no-separator".to_string()]).is_err());
        assert!(TagFilter::parse(&["=value".to_string()]).is_err());
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = TagFilter::new();
        assert!(filter.matches([("any", "tag")]));
        assert!(filter.matches(std::iter::empty()));
    }

    #[test]
    fn all_pairs_must_be_present() {
        let mut filter = TagFilter::new();
        filter.push("team", "platform");
        filter.push("env", "staging");

        assert!(filter.matches([("env", "staging"), ("team", "platform"), ("extra", "x")]));
        assert!(!filter.matches([("team", "platform")]));
        assert!(!filter.matches([("team", "platform"), ("env", "production")]));
    }
}
