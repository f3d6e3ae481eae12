//! Rule table TOML parser with validation.
//!
//! Parses a rules file into a [`RuleTable`] and validates:
//! - Kinds are valid [`RuleKind`] values.
//! - Patterns compile.
//! - Rule names are unique and hooks are non-empty.
//! - Prefix maps only appear on `step` rules.
//! - The file contains at least one rule.

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;
use thiserror::Error;

use super::toml_format::{RuleToml, RulesToml};
use super::{Prefix, Rule, RuleKind, RuleTable};

/// Errors that can occur while loading a rule table.
#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("duplicate rule name: {0:?}")]
    DuplicateRuleName(String),

    #[error("rule {0:?} has an empty hook")]
    EmptyHook(String),

    #[error(
        "invalid kind {value:?} on rule {rule:?} (expected step, step_timing, sub_step, sub_step_follower, sub_step_timing, or msg)"
    )]
    InvalidKind { rule: String, value: String },

    #[error("invalid pattern on rule {rule:?}: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {rule:?} has prefixes but kind {kind} (prefixes apply to step rules only)")]
    PrefixesOnNonStep { rule: String, kind: RuleKind },

    #[error("rule table must contain at least one rule")]
    NoRules,
}

/// Parse and validate a rules TOML string.
pub fn parse_rules_toml(content: &str) -> Result<RuleTable, RuleParseError> {
    let file: RulesToml = toml::from_str(content)?;
    if file.rules.is_empty() {
        return Err(RuleParseError::NoRules);
    }

    let rules = file
        .rules
        .into_iter()
        .map(build_rule)
        .collect::<Result<Vec<_>, _>>()?;

    RuleTable::new(rules)
}

/// Convert one TOML entry into a [`Rule`], compiling its pattern.
fn build_rule(entry: RuleToml) -> Result<Rule, RuleParseError> {
    let kind = entry
        .kind
        .parse::<RuleKind>()
        .map_err(|_| RuleParseError::InvalidKind {
            rule: entry.name.clone(),
            value: entry.kind.clone(),
        })?;

    let pattern = entry
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|source| RuleParseError::InvalidPattern {
            rule: entry.name.clone(),
            source,
        })?;

    Ok(Rule {
        name: entry.name,
        hook: entry.hook,
        pattern,
        kind,
        prefixes: entry
            .prefixes
            .into_iter()
            .map(|p| Prefix {
                needle: p.needle,
                label: p.label,
            })
            .collect(),
        template: entry.template,
        needs_own_timing: entry.needs_own_timing,
    })
}

/// Checks shared by the TOML loader and [`RuleTable::new`].
pub(crate) fn validate_rules(rules: &[Rule]) -> Result<(), RuleParseError> {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.name.as_str()) {
            return Err(RuleParseError::DuplicateRuleName(rule.name.clone()));
        }
        if rule.hook.is_empty() {
            return Err(RuleParseError::EmptyHook(rule.name.clone()));
        }
        if !rule.prefixes.is_empty() && rule.kind != RuleKind::Step {
            return Err(RuleParseError::PrefixesOnNonStep {
                rule: rule.name.clone(),
                kind: rule.kind,
            });
        }
    }
    Ok(())
}
