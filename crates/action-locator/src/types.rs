//! Core types for the locator system

use std::collections::HashSet;

use action_primitives::ActionError;
use serde::{Deserialize, Serialize};
use soulflow_core_types::ElementState;

use crate::errors::LocatorError;

/// Selector strategies, most robust first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Accessibility role plus accessible label
    AriaRole,
    /// `data-testid` / `data-test` / `data-qa`
    TestId,
    ElementId,
    Name,
    Placeholder,
    Text,
    ClassName,
    /// `nth-of-type` chain from the document root
    StructuralPath,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::AriaRole => "aria-role",
            LocatorStrategy::TestId => "test-id",
            LocatorStrategy::ElementId => "id",
            LocatorStrategy::Name => "name",
            LocatorStrategy::Placeholder => "placeholder",
            LocatorStrategy::Text => "text",
            LocatorStrategy::ClassName => "class",
            LocatorStrategy::StructuralPath => "structural-path",
        }
    }

    /// Get all strategies in fallback order
    pub fn fallback_chain() -> Vec<LocatorStrategy> {
        vec![
            LocatorStrategy::AriaRole,
            LocatorStrategy::TestId,
            LocatorStrategy::ElementId,
            LocatorStrategy::Name,
            LocatorStrategy::Placeholder,
            LocatorStrategy::Text,
            LocatorStrategy::ClassName,
            LocatorStrategy::StructuralPath,
        ]
    }
}

/// One step of a structural path: tag plus 1-based `nth-of-type` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub tag: String,
    #[serde(default = "first_of_type")]
    pub nth: u32,
}

fn first_of_type() -> u32 {
    1
}

impl PathSegment {
    pub fn new(tag: impl Into<String>, nth: u32) -> Self {
        Self {
            tag: tag.into(),
            nth,
        }
    }
}

/// What was known about an element when it was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementDescriptor {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "aria-label")]
    pub aria_label: Option<String>,
    #[serde(alias = "data-testid")]
    pub data_testid: Option<String>,
    #[serde(alias = "data-test")]
    pub data_test: Option<String>,
    #[serde(alias = "data-qa")]
    pub data_qa: Option<String>,
    pub placeholder: Option<String>,
    pub text: Option<String>,
    pub classes: Vec<String>,
    pub path: Vec<PathSegment>,
}

impl ElementDescriptor {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    /// First present test identifier, with the attribute that holds it.
    pub fn test_id(&self) -> Option<(&'static str, &str)> {
        [
            ("data-testid", self.data_testid.as_deref()),
            ("data-test", self.data_test.as_deref()),
            ("data-qa", self.data_qa.as_deref()),
        ]
        .into_iter()
        .find_map(|(attr, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (attr, v))
        })
    }
}

/// Ordered, non-empty, duplicate-free list of candidate selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SelectorSet {
    selectors: Vec<String>,
}

impl SelectorSet {
    pub fn new<I, S>(selectors: I) -> Result<Self, LocatorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let selectors: Vec<String> = selectors
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();
        if selectors.is_empty() {
            return Err(LocatorError::EmptySelectorSet);
        }
        Ok(Self { selectors })
    }

    /// Set holding one known-good selector.
    pub(crate) fn single(selector: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
        }
    }

    pub fn primary(&self) -> &str {
        &self.selectors[0]
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.selectors
    }

    /// Append a candidate unless already present. Returns whether it was added.
    pub fn push(&mut self, selector: impl Into<String>) -> bool {
        let selector = selector.into().trim().to_string();
        if selector.is_empty() || self.contains(&selector) {
            return false;
        }
        self.selectors.push(selector);
        true
    }
}

impl TryFrom<Vec<String>> for SelectorSet {
    type Error = LocatorError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        SelectorSet::new(value)
    }
}

impl From<SelectorSet> for Vec<String> {
    fn from(value: SelectorSet) -> Self {
        value.selectors
    }
}

/// Why one candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptReason {
    NotFound,
    NotActionable,
    HostError(ActionError),
}

impl AttemptReason {
    pub fn label(&self) -> String {
        match self {
            AttemptReason::NotFound => "not found".to_string(),
            AttemptReason::NotActionable => "not actionable".to_string(),
            AttemptReason::HostError(err) => format!("host error: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub selector: String,
    pub reason: AttemptReason,
    pub elapsed_ms: u64,
}

/// Successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub selector: String,
    /// Position of `selector` in the supplied set
    pub index: usize,
    pub state: ElementState,
    /// Candidates rejected before this one
    pub rejected: Vec<Attempt>,
}

impl Resolved {
    pub fn healed(&self) -> bool {
        self.index > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_set_rejects_empty_and_dedups() {
        assert!(matches!(
            SelectorSet::new(Vec::<String>::new()),
            Err(LocatorError::EmptySelectorSet)
        ));
        assert!(SelectorSet::new(["  ", ""]).is_err());

        let mut set = SelectorSet::new(["#a", "#b", "#a"]).unwrap();
        assert_eq!(set.as_slice(), &["#a".to_string(), "#b".to_string()]);
        assert!(!set.push("#b"));
        assert!(set.push("#c"));
        assert_eq!(set.primary(), "#a");
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn selector_set_serde_is_a_plain_list() {
        let set: SelectorSet = serde_json::from_str(r##"["#a", "#b"]"##).unwrap();
        assert_eq!(serde_json::to_string(&set).unwrap(), r##"["#a","#b"]"##);
        assert!(serde_json::from_str::<SelectorSet>("[]").is_err());
    }

    #[test]
    fn test_id_prefers_data_testid() {
        let descriptor = ElementDescriptor {
            data_test: Some("fallback".into()),
            data_testid: Some("primary".into()),
            ..ElementDescriptor::default()
        };
        assert_eq!(descriptor.test_id(), Some(("data-testid", "primary")));

        let qa_only = ElementDescriptor {
            data_testid: Some("  ".into()),
            data_qa: Some("qa".into()),
            ..ElementDescriptor::default()
        };
        assert_eq!(qa_only.test_id(), Some(("data-qa", "qa")));
    }

    #[test]
    fn test_fallback_chain() {
        let chain = LocatorStrategy::fallback_chain();
        assert_eq!(chain.first(), Some(&LocatorStrategy::AriaRole));
        assert_eq!(chain.last(), Some(&LocatorStrategy::StructuralPath));
        assert_eq!(chain.len(), 8);
    }
}
