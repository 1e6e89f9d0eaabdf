//! Run context - variables available to collaborator command templates

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{ (\w+) \}\}").expect("placeholder pattern"))
}

/// Variables for a single run
///
/// Command arguments in the release file may reference these as
/// `{{ name }}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    pub variables: HashMap<String, String>,
}

impl RunContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with the tag and environment of a run
    pub fn for_run(tag: &str, environment: &str) -> Self {
        let mut ctx = Self::new();
        ctx.set_variable("tag", tag);
        ctx.set_variable("version", tag.strip_prefix('v').unwrap_or(tag));
        ctx.set_variable("environment", environment);
        ctx
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn set_path(&mut self, key: impl Into<String>, path: &Path) {
        self.set_variable(key, path.display().to_string());
    }

    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Copy of this context with one more variable
    pub fn with_variable(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.set_variable(key, value);
        ctx
    }

    /// Replace `{{ name }}` placeholders in one pass; unknown names are
    /// left untouched and substituted values are never rendered again
    pub fn render(&self, template: &str) -> String {
        placeholder()
            .replace_all(template, |caps: &Captures| match self.variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render every element of an argv
    pub fn render_args(&self, args: &[String]) -> Vec<String> {
        args.iter().map(|a| self.render(a)).collect()
    }
}
