//! Classification rules and the ordered rule table.
//!
//! A [`RuleTable`] is pure data: an ordered list of immutable [`Rule`]
//! records. Tables are authored in TOML (see [`toml_format`]) and validated
//! by [`parser::parse_rules_toml`]. The built-in deployment table is embedded
//! in the binary at compile time and returned by [`RuleTable::deploy`].

pub mod parser;
pub mod toml_format;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;

pub use parser::{RuleParseError, parse_rules_toml};

/// Placeholder substituted by the payload (or a formatted duration) when a
/// rule's template is rendered.
pub const PLACEHOLDER: &str = "{}";

/// The embedded deployment rule table.
static DEPLOY_RULES_TOML: &str = include_str!("deploy.toml");

// ---------------------------------------------------------------------------
// RuleKind
// ---------------------------------------------------------------------------

/// What a matched line means for the progress view.
///
/// The kind decides indentation and whether the match opens, closes, or
/// leaves alone the stream's open step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Top-level step header (e.g. a deployment script starting).
    Step,
    /// Elapsed-time line closing a top-level step.
    StepTiming,
    /// Nested step under the current step.
    SubStep,
    /// Continuation of the most recently rendered step or sub-step.
    SubStepFollower,
    /// Elapsed-time line closing a sub-step.
    SubStepTiming,
    /// Free-form message; with an empty template it is a silent detection.
    Msg,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Step => "step",
            Self::StepTiming => "step_timing",
            Self::SubStep => "sub_step",
            Self::SubStepFollower => "sub_step_follower",
            Self::SubStepTiming => "sub_step_timing",
            Self::Msg => "msg",
        };
        f.write_str(s)
    }
}

impl FromStr for RuleKind {
    type Err = RuleKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "step" => Ok(Self::Step),
            "step_timing" => Ok(Self::StepTiming),
            "sub_step" => Ok(Self::SubStep),
            "sub_step_follower" => Ok(Self::SubStepFollower),
            "sub_step_timing" => Ok(Self::SubStepTiming),
            "msg" => Ok(Self::Msg),
            other => Err(RuleKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unknown [`RuleKind`] string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleKindParseError(pub String);

impl fmt::Display for RuleKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rule kind: {:?}", self.0)
    }
}

impl std::error::Error for RuleKindParseError {}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Maps a payload substring to a human label, e.g. `/build.sh` to
/// `BUILDING artifact `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub needle: String,
    pub label: String,
}

/// A single classification rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique name within the table (e.g. `running_script`).
    pub name: String,
    /// Literal substring a line must contain before `pattern` is tried.
    pub hook: String,
    /// Optional capturing pattern. Capture group 1 (or the whole match when
    /// the pattern has no groups) becomes the payload.
    pub pattern: Option<Regex>,
    pub kind: RuleKind,
    /// Consulted for [`RuleKind::Step`] only; first needle found wins.
    pub prefixes: Vec<Prefix>,
    /// Display template; every `{}` is replaced by the payload.
    pub template: String,
    /// Time the step from wall clock instead of a captured elapsed value.
    pub needs_own_timing: bool,
}

impl Rule {
    /// Create a rule with no pattern, prefixes, or own timing.
    pub fn new(
        name: impl Into<String>,
        hook: impl Into<String>,
        kind: RuleKind,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hook: hook.into(),
            pattern: None,
            kind,
            prefixes: Vec::new(),
            template: template.into(),
            needs_own_timing: false,
        }
    }

    /// Attach a capturing pattern.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Append a prefix-map entry.
    pub fn with_prefix(mut self, needle: impl Into<String>, label: impl Into<String>) -> Self {
        self.prefixes.push(Prefix {
            needle: needle.into(),
            label: label.into(),
        });
        self
    }

    /// Mark the rule as timing itself from wall clock.
    pub fn with_own_timing(mut self) -> Self {
        self.needs_own_timing = true;
        self
    }

    /// Substitute `value` into every placeholder of the template.
    pub fn format(&self, value: &str) -> String {
        self.template.replace(PLACEHOLDER, value)
    }

    /// Resolve the display label for a match.
    ///
    /// For [`RuleKind::Step`] the first prefix whose needle occurs in the
    /// payload is prepended to the formatted template.
    pub fn resolve_label(&self, payload: Option<&str>) -> String {
        let payload = payload.unwrap_or_default();
        let body = self.format(payload);
        if self.kind != RuleKind::Step {
            return body;
        }
        match self.prefixes.iter().find(|p| payload.contains(&p.needle)) {
            Some(prefix) => format!("{}{body}", prefix.label),
            None => body,
        }
    }
}

// ---------------------------------------------------------------------------
// RuleTable
// ---------------------------------------------------------------------------

/// Ordered, immutable set of rules. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// A table with no rules; every line is unmatched.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from rules constructed in code.
    ///
    /// Applies the same per-rule validation as the TOML loader, but an
    /// empty list is allowed.
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleParseError> {
        parser::validate_rules(&rules)?;
        Ok(Self { rules })
    }

    /// Parse and validate a TOML rule table.
    pub fn from_toml(content: &str) -> Result<Self, RuleParseError> {
        parse_rules_toml(content)
    }

    /// Read and parse a TOML rule table from disk.
    pub fn load(path: &Path) -> Result<Self, RuleParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| RuleParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_rules_toml(&content)
    }

    /// The built-in table for deployment scripts (build, publish, digest,
    /// sync) and the bazel/webpack tooling they drive.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `deploy.toml` is malformed. The file is part of
    /// the binary, so a passing test suite guarantees it parses.
    pub fn deploy() -> Self {
        parse_rules_toml(DEPLOY_RULES_TOML).expect("embedded deploy.toml is invalid")
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Look a rule up by name.
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

impl<'a> IntoIterator for &'a RuleTable {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
