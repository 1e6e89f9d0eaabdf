//! Trigger matching - which pipelines does a ref event start?

use crate::core::environment::EnvironmentName;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tag pattern used when a pipeline does not set one
pub const DEFAULT_TAG_PATTERN: &str = "v*";

/// Kind of ref carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Tag,
    Branch,
}

/// A ref-creation event from version control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEvent {
    pub ref_type: RefType,
    /// Short ref name, e.g. `v1.2.0`
    pub name: String,
}

impl RefEvent {
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            ref_type: RefType::Tag,
            name: name.into(),
        }
    }

    /// Parse a ref as given on the command line
    ///
    /// `refs/tags/x` is a tag, `refs/heads/x` a branch, and a bare name is
    /// taken to be a tag.
    pub fn parse(reference: &str) -> Self {
        if let Some(name) = reference.strip_prefix("refs/tags/") {
            Self::tag(name)
        } else if let Some(name) = reference.strip_prefix("refs/heads/") {
            Self {
                ref_type: RefType::Branch,
                name: name.to_string(),
            }
        } else {
            Self::tag(reference)
        }
    }

    /// Build an event from GitHub Actions variables: `GITHUB_REF`, else
    /// `GITHUB_REF_TYPE` + `GITHUB_REF_NAME`
    pub fn from_github_env() -> Option<Self> {
        if let Ok(reference) = std::env::var("GITHUB_REF") {
            return Some(Self::parse(&reference));
        }
        let name = std::env::var("GITHUB_REF_NAME").ok()?;
        let ref_type = match std::env::var("GITHUB_REF_TYPE").ok()?.as_str() {
            "tag" => RefType::Tag,
            _ => RefType::Branch,
        };
        Some(Self { ref_type, name })
    }
}

/// Glob over tag names: `*` matches any run of characters, `?` one character
#[derive(Debug, Clone)]
pub struct TagPattern {
    source: String,
    regex: Regex,
}

impl TagPattern {
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let mut pattern = String::from("^");
        for ch in glob.chars() {
            match ch {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');

        Ok(Self {
            source: glob.to_string(),
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// One pipeline variant: a tag pattern bound to an environment
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub environment: EnvironmentName,
    pub pattern: TagPattern,
}

/// What a single pipeline definition does with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    Start { environment: EnvironmentName },
    Ignore,
}

/// A run to be created, keyed by (trigger_ref, environment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub pipeline: String,
    pub trigger_ref: String,
    pub environment: EnvironmentName,
}

/// Evaluates ref events against every pipeline definition independently
#[derive(Debug, Clone, Default)]
pub struct TriggerMatcher {
    pipelines: Vec<PipelineDefinition>,
}

impl TriggerMatcher {
    pub fn new(pipelines: Vec<PipelineDefinition>) -> Self {
        Self { pipelines }
    }

    pub fn pipelines(&self) -> &[PipelineDefinition] {
        &self.pipelines
    }

    /// Decision of one definition for an event
    pub fn decide(definition: &PipelineDefinition, event: &RefEvent) -> TriggerDecision {
        if event.ref_type == RefType::Tag && definition.pattern.matches(&event.name) {
            TriggerDecision::Start {
                environment: definition.environment,
            }
        } else {
            TriggerDecision::Ignore
        }
    }

    /// Every run the event starts, in definition order; empty means ignore
    pub fn match_event(&self, event: &RefEvent) -> Vec<RunRequest> {
        self.pipelines
            .iter()
            .filter_map(|definition| match Self::decide(definition, event) {
                TriggerDecision::Start { environment } => Some(RunRequest {
                    pipeline: definition.name.clone(),
                    trigger_ref: event.name.clone(),
                    environment,
                }),
                TriggerDecision::Ignore => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> TriggerMatcher {
        TriggerMatcher::new(vec![
            PipelineDefinition {
                name: "publish-staging".to_string(),
                environment: EnvironmentName::Staging,
                pattern: TagPattern::new(DEFAULT_TAG_PATTERN).unwrap(),
            },
            PipelineDefinition {
                name: "publish-production".to_string(),
                environment: EnvironmentName::Production,
                pattern: TagPattern::new(DEFAULT_TAG_PATTERN).unwrap(),
            },
        ])
    }

    #[test]
    fn test_version_tag_starts_both_pipelines() {
        let requests = matcher().match_event(&RefEvent::tag("v1.2.0"));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].environment, EnvironmentName::Staging);
        assert_eq!(requests[1].environment, EnvironmentName::Production);
        assert!(requests.iter().all(|r| r.trigger_ref == "v1.2.0"));
    }

    #[test]
    fn test_non_version_tags_are_ignored() {
        let matcher = matcher();
        for tag in ["release-candidate", "1.2.0", "V1.2.0", "latest", ""] {
            assert!(
                matcher.match_event(&RefEvent::tag(tag)).is_empty(),
                "tag '{}' should be ignored",
                tag
            );
        }
    }

    #[test]
    fn test_branch_refs_are_ignored() {
        let event = RefEvent::parse("refs/heads/v1.2.0");
        assert_eq!(event.ref_type, RefType::Branch);
        assert!(matcher().match_event(&event).is_empty());
    }

    #[test]
    fn test_parse_refs() {
        assert_eq!(RefEvent::parse("refs/tags/v0.1.0"), RefEvent::tag("v0.1.0"));
        assert_eq!(RefEvent::parse("v0.1.0"), RefEvent::tag("v0.1.0"));
    }

    #[test]
    fn test_tag_pattern_escapes_literals() {
        let pattern = TagPattern::new("v1.?.*").unwrap();
        assert!(pattern.matches("v1.2.0"));
        assert!(!pattern.matches("v1x2.0"));
        assert!(!pattern.matches("xv1.2.0"));
        assert_eq!(pattern.as_str(), "v1.?.*");
    }
}
