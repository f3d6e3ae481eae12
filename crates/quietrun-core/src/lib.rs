//! Streaming output classifier and hierarchical progress renderer.
//!
//! A [`StreamAdapter`] sits between a subprocess pipe and the real console.
//! Raw bytes go in; in [`Mode::Classify`] only rendered progress lines come
//! out, in [`Mode::Passthrough`] the bytes are forwarded untouched.
//!
//! ```text
//! write(bytes) -> LineAssembler -> Classifier -> Correlator -> Renderer -> sink
//!                 (chunk -> line)  (line -> Match) (Match -> Decision) (Decision -> text)
//! ```
//!
//! Each stream gets its own adapter; the only thing two adapters share is
//! the immutable [`RuleTable`].

pub mod classify;
pub mod correlator;
pub mod render;
pub mod rules;
pub mod stream;

pub use classify::{Classifier, Match};
pub use correlator::clock::{Clock, ManualClock, SystemClock};
pub use correlator::{Correlator, Decision, Elapsed, OpenStep};
pub use render::{RenderedLine, Renderer};
pub use rules::{Prefix, Rule, RuleKind, RuleParseError, RuleTable};
pub use stream::adapter::{AdapterError, ProgressEvent, StreamAdapter, StreamSummary, TimedStep};
pub use stream::assembler::LineAssembler;
pub use stream::Mode;
