//! Step correlation: pairing a step header with its later timing line.
//!
//! The correlator is the only place that remembers earlier lines. Steps
//! nest two levels deep, so it holds at most one open [`OpenStep`] per
//! level: a top-level `step` (e.g. a deployment script) and a `sub_step`
//! under it (e.g. a bazel build). Each level moves between two states:
//!
//! ```text
//!            Step / SubStep
//!   Idle  ------------------>  Awaiting
//!    ^                          |   ^
//!    |  timing of the           |   |  Step / SubStep of the same level
//!    |  same level              |   |  (previous step orphaned)
//!    +--------------------------+---+
//! ```
//!
//! `StepTiming` only closes the open `Step`, `SubStepTiming` only closes the
//! open `SubStep`. A sub-step never displaces the script step around it. A
//! new `Step`, or the timing of the current one, also ends any sub-step
//! still open beneath it.
//!
//! A timing line whose level has no open step is rendered standalone with
//! the elapsed value it carries. Followers and messages never change state.

pub mod clock;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::classify::Match;
use crate::classify::duration::parse_elapsed;
use crate::rules::{Rule, RuleKind};

use clock::{Clock, SystemClock};

/// A rendered step header still waiting for its duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStep {
    /// Display label after prefix substitution.
    pub label: String,
    /// Kind of the rule that opened the step.
    pub kind: RuleKind,
    /// When the step was opened.
    pub opened_at: Instant,
    /// Duration comes from the clock, not from the timing line's payload.
    pub needs_own_timing: bool,
}

/// Where a timing annotation's duration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elapsed {
    /// Measured from the open step's `opened_at`.
    WallClock(Duration),
    /// Parsed from the timing line's payload.
    Captured(Duration),
    /// The payload could not be parsed; rendered verbatim.
    Unparsed(String),
}

/// What to do with a classified line.
#[derive(Debug, Clone)]
pub enum Decision<'r> {
    /// A Step or SubStep header. The step is now open at its level.
    StepOpened {
        rule: &'r Rule,
        label: String,
        /// Steps that were still open and lost their chance at a duration:
        /// the previous step of the same level, plus the open sub-step when
        /// a new top-level step starts.
        orphaned: Vec<OpenStep>,
    },
    /// A StepTiming or SubStepTiming line.
    StepTimed {
        rule: &'r Rule,
        /// The step this timing closed; `None` when rendered standalone.
        step: Option<OpenStep>,
        elapsed: Elapsed,
        /// A sub-step left open when its enclosing step finished.
        orphaned: Vec<OpenStep>,
    },
    /// A continuation line under the most recent step.
    Follower { rule: &'r Rule, text: String },
    /// A message rule with a template.
    Message {
        rule: &'r Rule,
        text: String,
        payload: Option<String>,
    },
    /// A message rule with an empty template: no output.
    Detected {
        rule: &'r Rule,
        payload: Option<String>,
    },
}

/// Per-stream step state machine.
pub struct Correlator {
    step: Option<OpenStep>,
    sub_step: Option<OpenStep>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("step", &self.step)
            .field("sub_step", &self.sub_step)
            .finish()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use a custom time source for wall-clock timed steps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            step: None,
            sub_step: None,
            clock,
        }
    }

    /// The top-level step awaiting its timing line, if any.
    pub fn open_step(&self) -> Option<&OpenStep> {
        self.step.as_ref()
    }

    /// The sub-step awaiting its timing line, if any.
    pub fn open_sub_step(&self) -> Option<&OpenStep> {
        self.sub_step.as_ref()
    }

    /// True while either level has an open step.
    pub fn is_awaiting(&self) -> bool {
        self.step.is_some() || self.sub_step.is_some()
    }

    /// Feed one classified line through the state machine.
    pub fn advance<'r>(&mut self, matched: Match<'r>) -> Decision<'r> {
        let Match { rule, payload } = matched;
        match rule.kind {
            RuleKind::Step | RuleKind::SubStep => {
                let label = rule.resolve_label(payload.as_deref());
                let open = OpenStep {
                    label: label.clone(),
                    kind: rule.kind,
                    opened_at: self.clock.now(),
                    needs_own_timing: rule.needs_own_timing,
                };
                let mut orphaned = Vec::new();
                if rule.kind == RuleKind::Step {
                    orphaned.extend(self.sub_step.take());
                    orphaned.extend(self.step.replace(open));
                } else {
                    orphaned.extend(self.sub_step.replace(open));
                }
                for step in &orphaned {
                    debug!(
                        step = %step.label,
                        next = %label,
                        "step orphaned before its timing line"
                    );
                }
                Decision::StepOpened {
                    rule,
                    label,
                    orphaned,
                }
            }
            RuleKind::StepTiming => {
                let orphaned: Vec<OpenStep> = self.sub_step.take().into_iter().collect();
                for sub in &orphaned {
                    debug!(step = %sub.label, "sub-step still open when its step finished");
                }
                let step = self.step.take();
                let elapsed = self.elapsed_for(rule, step.as_ref(), payload.as_deref());
                Decision::StepTimed {
                    rule,
                    step,
                    elapsed,
                    orphaned,
                }
            }
            RuleKind::SubStepTiming => {
                let step = self.sub_step.take();
                let elapsed = self.elapsed_for(rule, step.as_ref(), payload.as_deref());
                Decision::StepTimed {
                    rule,
                    step,
                    elapsed,
                    orphaned: Vec::new(),
                }
            }
            RuleKind::SubStepFollower => Decision::Follower {
                rule,
                text: rule.resolve_label(payload.as_deref()),
            },
            RuleKind::Msg if rule.template.is_empty() => Decision::Detected { rule, payload },
            RuleKind::Msg => Decision::Message {
                rule,
                text: rule.resolve_label(payload.as_deref()),
                payload,
            },
        }
    }

    /// Stream closed: drop every open step without a duration. Innermost
    /// first.
    pub fn close(&mut self) -> Vec<OpenStep> {
        let discarded: Vec<OpenStep> = self
            .sub_step
            .take()
            .into_iter()
            .chain(self.step.take())
            .collect();
        for step in &discarded {
            debug!(step = %step.label, "stream closed with step still open; duration dropped");
        }
        discarded
    }

    /// Wall clock when the step being closed times itself, otherwise the
    /// timing line's payload.
    fn elapsed_for(
        &self,
        rule: &Rule,
        step: Option<&OpenStep>,
        payload: Option<&str>,
    ) -> Elapsed {
        match step {
            Some(open) if open.needs_own_timing => {
                Elapsed::WallClock(self.clock.now().saturating_duration_since(open.opened_at))
            }
            _ => captured_elapsed(rule, payload),
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

fn captured_elapsed(rule: &Rule, payload: Option<&str>) -> Elapsed {
    let raw = payload.unwrap_or_default();
    match parse_elapsed(raw) {
        Some(duration) => Elapsed::Captured(duration),
        None => {
            debug!(rule = %rule.name, payload = raw, "unparsable elapsed time; rendering raw text");
            Elapsed::Unparsed(raw.to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleTable;
    use clock::ManualClock;

    fn step_rule() -> Rule {
        Rule::new("running_script", "Running script: ", RuleKind::Step, "via: {}")
            .with_pattern("Running script: (.+)$")
            .unwrap()
            .with_prefix("/build.sh", "BUILDING artifact ")
    }

    fn timing_rule() -> Rule {
        Rule::new("script_elapsed_time", "Script elapsed time: ", RuleKind::StepTiming, "Elapsed: {}")
            .with_pattern("Script elapsed time: (.+)$")
            .unwrap()
    }

    fn matched<'r>(rule: &'r Rule, payload: Option<&str>) -> Match<'r> {
        Match {
            rule,
            payload: payload.map(str::to_owned),
        }
    }

    #[test]
    fn step_then_timing_pairs() {
        let step = step_rule();
        let timing = timing_rule();
        let mut c = Correlator::new();

        let d = c.advance(matched(&step, Some("/build.sh")));
        assert!(matches!(
            d,
            Decision::StepOpened { ref label, ref orphaned, .. }
                if label == "BUILDING artifact via: /build.sh" && orphaned.is_empty()
        ));
        assert!(c.is_awaiting());

        let d = c.advance(matched(&timing, Some("4.201s")));
        match d {
            Decision::StepTimed { step, elapsed, .. } => {
                assert_eq!(step.unwrap().label, "BUILDING artifact via: /build.sh");
                assert_eq!(elapsed, Elapsed::Captured(Duration::from_millis(4201)));
            }
            other => panic!("expected StepTimed, got {other:?}"),
        }
        assert!(!c.is_awaiting());
    }

    #[test]
    fn second_step_orphans_first() {
        let step = step_rule();
        let mut c = Correlator::new();

        c.advance(matched(&step, Some("/build.sh")));
        let d = c.advance(matched(&step, Some("/publish.sh")));

        match d {
            Decision::StepOpened { orphaned, label, .. } => {
                assert_eq!(orphaned.len(), 1);
                assert_eq!(orphaned[0].label, "BUILDING artifact via: /build.sh");
                assert_eq!(label, "via: /publish.sh");
            }
            other => panic!("expected StepOpened, got {other:?}"),
        }
        assert_eq!(c.open_step().unwrap().label, "via: /publish.sh");
    }

    #[test]
    fn timing_while_idle_is_standalone() {
        let timing = timing_rule();
        let mut c = Correlator::new();

        let d = c.advance(matched(&timing, Some("2s")));
        assert!(matches!(
            d,
            Decision::StepTimed { step: None, elapsed: Elapsed::Captured(d), .. } if d == Duration::from_secs(2)
        ));
        assert!(!c.is_awaiting());
    }

    #[test]
    fn own_timing_step_uses_wall_clock() {
        let clock = ManualClock::new();
        let rsync = Rule::new("rsync", "RSyncing", RuleKind::SubStep, "- RSyncing").with_own_timing();
        let elapsed_rule = Rule::new("elapsed", "INFO: Elapsed time: ", RuleKind::SubStepTiming, "Elapsed: {}")
            .with_pattern(r"INFO: Elapsed time: (\d*\.?\d*[a-z]+)")
            .unwrap();
        let mut c = Correlator::with_clock(Arc::new(clock.clone()));

        c.advance(matched(&rsync, None));
        clock.advance(Duration::from_millis(2750));
        let d = c.advance(matched(&elapsed_rule, Some("99s")));

        assert!(matches!(
            d,
            Decision::StepTimed { elapsed: Elapsed::WallClock(d), .. } if d == Duration::from_millis(2750)
        ));
    }

    #[test]
    fn unparsable_timing_degrades_to_raw_text() {
        let step = step_rule();
        let timing = timing_rule();
        let mut c = Correlator::new();

        c.advance(matched(&step, Some("/build.sh")));
        let d = c.advance(matched(&timing, Some("a while")));
        assert!(matches!(
            d,
            Decision::StepTimed { elapsed: Elapsed::Unparsed(ref raw), .. } if raw == "a while"
        ));
    }

    #[test]
    fn follower_does_not_change_state() {
        let table = RuleTable::deploy();
        let bazel = table.get("bazel_build").unwrap();
        let follower = table.get("streaming_build_results").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(bazel, Some("//app:image")));
        let before = c.open_sub_step().cloned();
        let d = c.advance(matched(follower, Some("https://results/123")));

        assert!(matches!(
            d,
            Decision::Follower { ref text, .. } if text == "Streaming build results to: https://results/123"
        ));
        assert_eq!(c.open_sub_step().cloned(), before);

        let mut idle = Correlator::new();
        idle.advance(matched(follower, Some("x")));
        assert!(!idle.is_awaiting());
    }

    #[test]
    fn empty_template_message_is_detection() {
        let table = RuleTable::deploy();
        let prompt = table.get("usi_deploy_yn").unwrap();
        let mut c = Correlator::new();

        let d = c.advance(matched(prompt, None));
        assert!(matches!(d, Decision::Detected { rule, payload: None } if rule.name == "usi_deploy_yn"));
        assert!(!c.is_awaiting());
    }

    #[test]
    fn message_with_template_renders_text() {
        let rule = Rule::new("warn", "WARNING", RuleKind::Msg, "! {}")
            .with_pattern("WARNING: (.+)")
            .unwrap();
        let mut c = Correlator::new();
        let d = c.advance(matched(&rule, Some("disk low")));
        assert!(matches!(
            d,
            Decision::Message { ref text, ref payload, .. }
                if text == "! disk low" && payload.as_deref() == Some("disk low")
        ));
    }

    #[test]
    fn close_discards_open_step() {
        let step = step_rule();
        let mut c = Correlator::new();

        c.advance(matched(&step, Some("/build.sh")));
        let discarded = c.close();
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].label, "BUILDING artifact via: /build.sh");
        assert!(!c.is_awaiting());
        assert!(c.close().is_empty());
    }

    #[test]
    fn close_discards_both_levels_innermost_first() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let bazel = table.get("bazel_build").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(step, Some("/build.sh")));
        c.advance(matched(bazel, Some("//app:image")));
        let labels: Vec<_> = c.close().into_iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            [
                "- Building your application via bazel [//app:image]",
                "BUILDING artifact via: /build.sh"
            ]
        );
    }

    #[test]
    fn sub_step_does_not_orphan_enclosing_step() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let server = table.get("starting_bazel_server").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(step, Some("/build.sh")));
        let d = c.advance(matched(server, None));

        assert!(matches!(d, Decision::StepOpened { ref orphaned, .. } if orphaned.is_empty()));
        assert_eq!(c.open_step().unwrap().label, "BUILDING artifact via: /build.sh");
        assert_eq!(c.open_sub_step().unwrap().kind, RuleKind::SubStep);
    }

    #[test]
    fn second_sub_step_orphans_only_the_first_sub_step() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let server = table.get("starting_bazel_server").unwrap();
        let bazel = table.get("bazel_build").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(step, Some("/build.sh")));
        c.advance(matched(server, None));
        let d = c.advance(matched(bazel, Some("//app:image")));

        match d {
            Decision::StepOpened { orphaned, .. } => {
                assert_eq!(orphaned.len(), 1);
                assert_eq!(orphaned[0].kind, RuleKind::SubStep);
            }
            other => panic!("expected StepOpened, got {other:?}"),
        }
        assert_eq!(c.open_step().unwrap().label, "BUILDING artifact via: /build.sh");
    }

    #[test]
    fn new_step_orphans_step_and_its_sub_step() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let bazel = table.get("bazel_build").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(step, Some("/build.sh")));
        c.advance(matched(bazel, Some("//app:image")));
        let d = c.advance(matched(step, Some("/publish.sh")));

        match d {
            Decision::StepOpened { orphaned, .. } => {
                let kinds: Vec<_> = orphaned.iter().map(|s| s.kind).collect();
                assert_eq!(kinds, [RuleKind::SubStep, RuleKind::Step]);
            }
            other => panic!("expected StepOpened, got {other:?}"),
        }
        assert!(c.open_sub_step().is_none());
    }

    #[test]
    fn step_timing_closes_step_and_ends_lingering_sub_step() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let rsync = table.get("rsyncing_usi_site_static").unwrap();
        let timing = table.get("script_elapsed_time").unwrap();
        let clock = ManualClock::new();
        let mut c = Correlator::with_clock(Arc::new(clock.clone()));

        c.advance(matched(step, Some("/sync.sh")));
        c.advance(matched(rsync, None));
        clock.advance(Duration::from_secs(2));
        let d = c.advance(matched(timing, Some("95.5s")));

        match d {
            Decision::StepTimed {
                step,
                elapsed,
                orphaned,
                ..
            } => {
                assert_eq!(step.unwrap().label, "SYNCING Static Assets via: /sync.sh");
                // The sub-step's own timing does not apply to its parent.
                assert_eq!(elapsed, Elapsed::Captured(Duration::from_millis(95_500)));
                assert_eq!(orphaned.len(), 1);
                assert_eq!(orphaned[0].label, "- RSyncing usi-site-static packages");
            }
            other => panic!("expected StepTimed, got {other:?}"),
        }
        assert!(!c.is_awaiting());
    }

    #[test]
    fn sub_step_timing_leaves_step_open() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let bazel = table.get("bazel_build").unwrap();
        let elapsed = table.get("elapsed_time").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(step, Some("/build.sh")));
        c.advance(matched(bazel, Some("//app:image")));
        let d = c.advance(matched(elapsed, Some("12.412s")));

        assert!(matches!(
            d,
            Decision::StepTimed { step: Some(ref s), ref orphaned, .. }
                if s.kind == RuleKind::SubStep && orphaned.is_empty()
        ));
        assert_eq!(c.open_step().unwrap().label, "BUILDING artifact via: /build.sh");
        assert!(c.open_sub_step().is_none());
    }

    #[test]
    fn sub_step_timing_without_sub_step_is_standalone() {
        let table = RuleTable::deploy();
        let step = table.get("running_script").unwrap();
        let elapsed = table.get("elapsed_time").unwrap();
        let mut c = Correlator::new();

        c.advance(matched(step, Some("/build.sh")));
        let d = c.advance(matched(elapsed, Some("3s")));

        assert!(matches!(
            d,
            Decision::StepTimed { step: None, elapsed: Elapsed::Captured(d), .. } if d == Duration::from_secs(3)
        ));
        assert!(c.open_step().is_some());
    }
}
