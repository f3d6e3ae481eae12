//! Turning correlator decisions into display lines.
//!
//! Indentation is fixed per rule kind so templates never carry leading
//! whitespace:
//!
//! | kind                | indent |
//! |---------------------|--------|
//! | `step`              | 0      |
//! | `step_timing`       | 0      |
//! | `sub_step`          | 2      |
//! | `sub_step_timing`   | 2      |
//! | `sub_step_follower` | 4      |
//! | `msg`               | 0      |

use std::fmt;
use std::io::{self, Write};

use crossterm::style::Stylize;

use crate::classify::duration::{format_fixed, format_short};
use crate::correlator::{Decision, Elapsed};
use crate::rules::RuleKind;

/// One line of progress output, without its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub kind: RuleKind,
    /// Text after indentation has been stripped.
    pub text: String,
}

impl RenderedLine {
    pub fn new(kind: RuleKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn indent(&self) -> usize {
        indent_for(self.kind)
    }
}

impl fmt::Display for RenderedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.text, indent = self.indent())
    }
}

/// Leading spaces for a line of the given kind.
pub fn indent_for(kind: RuleKind) -> usize {
    match kind {
        RuleKind::Step | RuleKind::StepTiming | RuleKind::Msg => 0,
        RuleKind::SubStep | RuleKind::SubStepTiming => 2,
        RuleKind::SubStepFollower => 4,
    }
}

/// Format an elapsed value for a timing rule of `kind`.
///
/// Step-level and wall-clock durations use three fixed decimals; sub-step
/// durations captured from tool output use the shortest form.
pub fn format_elapsed(kind: RuleKind, elapsed: &Elapsed) -> String {
    match elapsed {
        Elapsed::WallClock(d) => format_fixed(*d),
        Elapsed::Captured(d) if kind == RuleKind::SubStepTiming => format_short(*d),
        Elapsed::Captured(d) => format_fixed(*d),
        Elapsed::Unparsed(raw) => raw.clone(),
    }
}

/// Renders decisions, optionally with ANSI styling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Plain-text renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer that bolds step headers, dims timing lines, and highlights
    /// messages.
    pub fn with_color(color: bool) -> Self {
        Self { color }
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Produce the display line for a decision, or `None` for silent
    /// detections.
    pub fn render(&self, decision: &Decision<'_>) -> Option<RenderedLine> {
        match decision {
            Decision::StepOpened { rule, label, .. } => Some(RenderedLine::new(rule.kind, label.clone())),
            Decision::StepTimed { rule, elapsed, .. } => {
                let value = format_elapsed(rule.kind, elapsed);
                Some(RenderedLine::new(rule.kind, rule.format(&value)))
            }
            Decision::Follower { rule, text } | Decision::Message { rule, text, .. } => {
                Some(RenderedLine::new(rule.kind, text.clone()))
            }
            Decision::Detected { .. } => None,
        }
    }

    /// Write a line plus newline to `out`, applying styling if enabled.
    pub fn write_line<W: Write + ?Sized>(&self, line: &RenderedLine, out: &mut W) -> io::Result<()> {
        if !self.color {
            return writeln!(out, "{line}");
        }
        let indent = " ".repeat(line.indent());
        let text = line.text.as_str();
        match line.kind {
            RuleKind::Step => writeln!(out, "{indent}{}", text.bold()),
            RuleKind::StepTiming | RuleKind::SubStepTiming => writeln!(out, "{indent}{}", text.dim()),
            RuleKind::Msg => writeln!(out, "{indent}{}", text.yellow()),
            RuleKind::SubStep | RuleKind::SubStepFollower => writeln!(out, "{indent}{text}"),
        }
    }
}
