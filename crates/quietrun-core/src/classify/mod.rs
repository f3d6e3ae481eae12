//! Line classification against a [`RuleTable`].
//!
//! Classification is a pure function of one line: the same line always
//! yields the same [`Match`]. Anything that depends on earlier lines lives
//! in [`crate::correlator`].

pub mod duration;

use std::sync::Arc;

use tracing::trace;

use crate::rules::{Rule, RuleTable};

/// A rule that matched a line, plus its captured payload.
#[derive(Debug, Clone)]
pub struct Match<'r> {
    pub rule: &'r Rule,
    /// Capture group 1 of the rule's pattern, or the whole pattern match if
    /// it has no groups. `None` when the rule has no pattern.
    pub payload: Option<String>,
}

/// Tries each rule in table order and returns the first hit.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Arc<RuleTable>,
}

impl Classifier {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &Arc<RuleTable> {
        &self.rules
    }

    /// Classify a single assembled line.
    ///
    /// The hook substring test runs first; the pattern is only evaluated
    /// when the hook is present.
    pub fn classify(&self, line: &str) -> Option<Match<'_>> {
        for rule in self.rules.iter() {
            if !line.contains(rule.hook.as_str()) {
                continue;
            }

            let payload = match &rule.pattern {
                None => None,
                Some(pattern) => {
                    let Some(caps) = pattern.captures(line) else {
                        continue;
                    };
                    let capture = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
                    Some(capture.map_or_else(String::new, |m| m.as_str().to_owned()))
                }
            };

            trace!(rule = %rule.name, kind = %rule.kind, ?payload, "line matched");
            return Some(Match { rule, payload });
        }
        None
    }
}
