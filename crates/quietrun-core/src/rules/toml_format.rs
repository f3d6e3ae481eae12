//! TOML format types for rule table files.
//!
//! These types map directly to the on-disk format and are deserialized via
//! `serde` + the `toml` crate. [`super::parser`] turns them into validated
//! [`super::Rule`] values.

use serde::{Deserialize, Serialize};

/// Top-level structure of a rules file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulesToml {
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<RuleToml>,
}

/// A single `[[rules]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleToml {
    /// Unique rule name.
    pub name: String,
    /// Literal substring pre-filter.
    pub hook: String,
    /// Optional regular expression; group 1 is the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// One of `step`, `step_timing`, `sub_step`, `sub_step_follower`,
    /// `sub_step_timing`, `msg`.
    pub kind: String,
    /// Display template with `{}` placeholders. Empty means silent.
    #[serde(default)]
    pub template: String,
    /// Time the step from wall clock.
    #[serde(default)]
    pub needs_own_timing: bool,
    /// Payload-substring to label mapping (step rules only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<PrefixToml>,
}

/// One entry of a rule's `prefixes` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefixToml {
    pub needle: String,
    pub label: String,
}
