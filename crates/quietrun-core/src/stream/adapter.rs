//! The writable sink handed to a process launcher for one output stream.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::classify::Classifier;
use crate::correlator::clock::Clock;
use crate::correlator::{Correlator, Decision, Elapsed};
use crate::render::Renderer;
use crate::rules::RuleTable;

use super::Mode;
use super::assembler::LineAssembler;

/// Errors from configuring a [`StreamAdapter`].
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("rules cannot be changed after writing has begun on stream {0:?}")]
    RulesLocked(String),
}

/// Notifications for a host that wants more than rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A Step or SubStep header was rendered.
    StepStarted { rule: String, label: String },
    /// A timing line was rendered. `step` is the label it closed, if any.
    StepTimed {
        rule: String,
        step: Option<String>,
        elapsed: Elapsed,
    },
    /// A message rule matched. Silent (empty-template) rules only surface
    /// here.
    Detected {
        rule: String,
        payload: Option<String>,
        line: String,
    },
}

/// A step that was closed by its timing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedStep {
    pub label: String,
    pub duration: Duration,
}

/// Counters and timings collected over the life of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Complete lines seen (classify mode).
    pub lines: usize,
    /// Lines that matched a rule.
    pub matched: usize,
    /// Lines that matched nothing and were dropped.
    pub dropped: usize,
    /// Steps that lost their timing line: replaced by a newer step of the
    /// same level, or a sub-step still open when its parent step finished.
    pub orphaned: usize,
    /// Steps still open when the stream closed.
    pub unfinished: usize,
    /// Bytes forwarded untouched (passthrough mode).
    pub passthrough_bytes: u64,
    /// Paired steps whose duration was known, in completion order.
    pub timings: Vec<TimedStep>,
}

/// A [`Write`] sink that classifies or forwards one output stream.
///
/// In [`Mode::Classify`] bytes are assembled into lines, classified,
/// correlated, and rendered; only rendered lines reach the inner sink. In
/// [`Mode::Passthrough`] every write is forwarded as-is.
///
/// Call [`StreamAdapter::close`] when the producer is done so a trailing
/// unterminated line is not lost.
///
/// # Errors
///
/// Like [`std::io::BufWriter`], a classifying adapter accepts every byte
/// handed to `write` and reports a sink failure on the *next* call to
/// `write`, `flush`, or `close`, which consumes nothing. The line being
/// rendered when the sink failed is lost; lines completed after it stay
/// queued and are rendered by the next successful call.
pub struct StreamAdapter<W: Write> {
    name: String,
    sink: W,
    mode: Mode,
    assembler: LineAssembler,
    classifier: Classifier,
    correlator: Correlator,
    renderer: Renderer,
    events: Option<UnboundedSender<ProgressEvent>>,
    summary: StreamSummary,
    started: bool,
    failed: Option<io::Error>,
}

impl<W: Write> std::fmt::Debug for StreamAdapter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("rules", &self.classifier.rules().len())
            .field("pending", &self.assembler.pending())
            .field("queued", &self.assembler.queued())
            .finish()
    }
}

impl<W: Write> StreamAdapter<W> {
    /// Create an adapter with an empty rule table. Install rules with
    /// [`StreamAdapter::set_rules`] before the first write.
    pub fn new(sink: W, mode: Mode) -> Self {
        Self {
            name: "stream".to_string(),
            sink,
            mode,
            assembler: LineAssembler::new(),
            classifier: Classifier::new(Arc::new(RuleTable::empty())),
            correlator: Correlator::new(),
            renderer: Renderer::new(),
            events: None,
            summary: StreamSummary::default(),
            started: false,
            failed: None,
        }
    }

    /// A classifying adapter using `rules`.
    pub fn classify(sink: W, rules: Arc<RuleTable>) -> Self {
        let mut adapter = Self::new(sink, Mode::Classify);
        adapter.classifier = Classifier::new(rules);
        adapter
    }

    /// An adapter that forwards everything unchanged.
    pub fn passthrough(sink: W) -> Self {
        Self::new(sink, Mode::Passthrough)
    }

    /// Name used in logs and errors (e.g. `stdout`).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Time wall-clock steps with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.correlator = Correlator::with_clock(clock);
        self
    }

    /// Send [`ProgressEvent`]s to `events`. A dropped receiver is ignored.
    pub fn with_events(mut self, events: UnboundedSender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Install the rule table. Fails once any byte has been written.
    pub fn set_rules(&mut self, rules: Arc<RuleTable>) -> Result<(), AdapterError> {
        if self.started {
            return Err(AdapterError::RulesLocked(self.name.clone()));
        }
        self.classifier = Classifier::new(rules);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn rules(&self) -> &Arc<RuleTable> {
        self.classifier.rules()
    }

    pub fn summary(&self) -> &StreamSummary {
        &self.summary
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// The producer is done: render queued lines, classify any
    /// unterminated trailing line, drop open steps without their duration,
    /// and flush the sink.
    ///
    /// Calling it again is harmless.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(err) = self.failed.take() {
            return Err(err);
        }
        if self.mode == Mode::Classify {
            self.drain_lines()?;
            if let Some(line) = self.assembler.flush() {
                self.process_line(&line)?;
            }
            self.summary.unfinished += self.correlator.close().len();
            debug!(
                stream = %self.name,
                lines = self.summary.lines,
                matched = self.summary.matched,
                dropped = self.summary.dropped,
                "stream closed"
            );
        }
        self.sink.flush()
    }

    /// Render queued lines in order, stopping at the first sink error.
    fn drain_lines(&mut self) -> io::Result<()> {
        while let Some(line) = self.assembler.next_line() {
            self.process_line(&line)?;
        }
        Ok(())
    }

    fn process_line(&mut self, line: &str) -> io::Result<()> {
        self.summary.lines += 1;

        let Some(matched) = self.classifier.classify(line) else {
            self.summary.dropped += 1;
            trace!(stream = %self.name, line, "no rule matched; dropped");
            return Ok(());
        };
        self.summary.matched += 1;

        let decision = self.correlator.advance(matched);
        record(&mut self.summary, self.events.as_ref(), &decision, line);

        match self.renderer.render(&decision) {
            Some(rendered) => self.renderer.write_line(&rendered, &mut self.sink),
            None => Ok(()),
        }
    }
}

/// Update counters and notify the subscriber for one decision.
fn record(
    summary: &mut StreamSummary,
    events: Option<&UnboundedSender<ProgressEvent>>,
    decision: &Decision<'_>,
    line: &str,
) {
    let event = match decision {
        Decision::StepOpened {
            rule,
            label,
            orphaned,
        } => {
            summary.orphaned += orphaned.len();
            ProgressEvent::StepStarted {
                rule: rule.name.clone(),
                label: label.clone(),
            }
        }
        Decision::StepTimed {
            rule,
            step,
            elapsed,
            orphaned,
        } => {
            summary.orphaned += orphaned.len();
            if let Some(step) = step {
                let duration = match elapsed {
                    Elapsed::WallClock(d) | Elapsed::Captured(d) => Some(*d),
                    Elapsed::Unparsed(_) => None,
                };
                if let Some(duration) = duration {
                    summary.timings.push(TimedStep {
                        label: step.label.clone(),
                        duration,
                    });
                }
            }
            ProgressEvent::StepTimed {
                rule: rule.name.clone(),
                step: step.as_ref().map(|s| s.label.clone()),
                elapsed: elapsed.clone(),
            }
        }
        Decision::Follower { .. } => return,
        Decision::Message { rule, payload, .. } | Decision::Detected { rule, payload } => {
            ProgressEvent::Detected {
                rule: rule.name.clone(),
                payload: payload.clone(),
                line: line.to_owned(),
            }
        }
    };

    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

impl<W: Write> Write for StreamAdapter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.started = true;

        if self.mode == Mode::Passthrough {
            let n = self.sink.write(buf)?;
            self.summary.passthrough_bytes += n as u64;
            return Ok(n);
        }

        if let Some(err) = self.failed.take() {
            return Err(err);
        }
        self.assembler.push(buf);
        if let Err(err) = self.drain_lines() {
            debug!(
                stream = %self.name,
                queued = self.assembler.queued(),
                error = %err,
                "sink write failed; reporting on next call"
            );
            self.failed = Some(err);
        }
        Ok(buf.len())
    }

    /// Renders any lines still queued after an earlier sink error, then
    /// flushes the inner sink. A partial line stays buffered until more
    /// bytes or [`StreamAdapter::close`] arrive.
    fn flush(&mut self) -> io::Result<()> {
        if let Some(err) = self.failed.take() {
            return Err(err);
        }
        self.drain_lines()?;
        self.sink.flush()
    }
}
