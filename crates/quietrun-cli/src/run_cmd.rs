//! `quietrun run`: launch a program and render its output as progress.

use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, trace};

use quietrun_core::classify::duration::format_fixed;
use quietrun_core::{Mode, ProgressEvent, Renderer, RuleTable, StreamAdapter, StreamSummary};

use crate::config::QuietrunConfig;

/// Size of each read from a child pipe.
pub const PUMP_CHUNK: usize = 8 * 1024;

/// Sink type shared by both adapters.
pub type Sink = Box<dyn Write + Send>;

/// How a `run` ended.
#[derive(Debug)]
pub struct RunOutcome {
    /// Exit code of the child; `None` if it was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: StreamSummary,
    pub stderr: StreamSummary,
}

impl RunOutcome {
    /// Exit code to hand back to our own caller.
    pub fn process_exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(1)
    }
}

/// Spawn `program`, pump both pipes through their adapters, and wait for
/// everything to finish. Prints the completion header (and the timing
/// table when `summary` is set) to stdout.
pub async fn run_command(
    config: &QuietrunConfig,
    rules: Arc<RuleTable>,
    program: &str,
    args: &[String],
    summary: bool,
) -> Result<RunOutcome> {
    let mode = Mode::from_verbose(config.verbose);
    let renderer = Renderer::with_color(config.color);
    let start = Instant::now();

    info!(program, ?args, %mode, rules = %config.rules_source(), "starting child");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to execute {program}"))?;

    let stdout_pipe = child.stdout.take().context("child stdout was not captured")?;
    let stderr_pipe = child.stderr.take().context("child stderr was not captured")?;

    let (tx, rx) = mpsc::unbounded_channel();
    let events = tokio::spawn(log_events(rx));

    // Progress from both streams goes to stdout; only passthrough keeps the
    // child's stderr on our stderr.
    let stderr_sink: Sink = match mode {
        Mode::Classify => Box::new(std::io::stdout()),
        Mode::Passthrough => Box::new(std::io::stderr()),
    };

    let out_adapter = build_adapter(Box::new(std::io::stdout()), mode, &rules, renderer)
        .with_name("stdout")
        .with_events(tx.clone());
    let err_adapter = build_adapter(stderr_sink, mode, &rules, renderer)
        .with_name("stderr")
        .with_events(tx);

    let out_task = tokio::spawn(pump(stdout_pipe, out_adapter));
    let err_task = tokio::spawn(pump(stderr_pipe, err_adapter));

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait for {program}"))?;
    let stdout = out_task.await.context("stdout pump panicked")??;
    let stderr = err_task.await.context("stderr pump panicked")??;
    // Both senders are gone once the pumps return.
    events.await.context("event logger panicked")?;

    let elapsed = format_fixed(start.elapsed());
    let outcome = RunOutcome {
        exit_code: status.code(),
        stdout,
        stderr,
    };

    let mut out = std::io::stdout().lock();
    match (status.success(), outcome.exit_code) {
        (true, _) => writeln!(out, "Completed in {elapsed}")?,
        (false, Some(code)) => writeln!(out, "Failed (exit code {code}) after {elapsed}")?,
        (false, None) => writeln!(out, "Failed (terminated by signal) after {elapsed}")?,
    }
    if summary {
        write_summary(&mut out, &outcome.stdout, &outcome.stderr)?;
    }
    out.flush()?;

    info!(program, exit_code = ?outcome.exit_code, %elapsed, "child finished");
    Ok(outcome)
}

/// Build an adapter for one stream with the shared table and renderer.
pub fn build_adapter(
    sink: Sink,
    mode: Mode,
    rules: &Arc<RuleTable>,
    renderer: Renderer,
) -> StreamAdapter<Sink> {
    let adapter = match mode {
        Mode::Classify => StreamAdapter::classify(sink, Arc::clone(rules)),
        Mode::Passthrough => StreamAdapter::passthrough(sink),
    };
    adapter.with_renderer(renderer)
}

/// Copy a pipe into an adapter until EOF, then close the adapter.
pub async fn pump<R, W>(mut pipe: R, mut adapter: StreamAdapter<W>) -> Result<StreamSummary>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut buf = vec![0u8; PUMP_CHUNK];
    loop {
        let n = pipe
            .read(&mut buf)
            .await
            .with_context(|| format!("failed to read child {}", adapter.name()))?;
        if n == 0 {
            break;
        }
        adapter
            .write_all(&buf[..n])
            .with_context(|| format!("failed to write {} progress", adapter.name()))?;
    }
    adapter
        .close()
        .with_context(|| format!("failed to close {} stream", adapter.name()))?;
    debug!(stream = adapter.name(), summary = ?adapter.summary(), "pump finished");
    Ok(adapter.summary().clone())
}

/// Surface detections in the log; everything else at trace level.
async fn log_events(mut rx: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Detected { rule, line, .. } => {
                info!(%rule, %line, "detected");
            }
            other => trace!(?other, "progress event"),
        }
    }
}

/// Print the per-step timing table for both streams.
pub fn write_summary<W: Write>(
    out: &mut W,
    stdout: &StreamSummary,
    stderr: &StreamSummary,
) -> std::io::Result<()> {
    let timings: Vec<_> = stdout.timings.iter().chain(&stderr.timings).collect();
    if timings.is_empty() {
        writeln!(out, "No timed steps.")?;
    } else {
        writeln!(out, "Step timings:")?;
        let width = timings
            .iter()
            .map(|t| format_fixed(t.duration).len())
            .max()
            .unwrap_or(0);
        for t in &timings {
            writeln!(out, "  {:>width$}  {}", format_fixed(t.duration), t.label)?;
        }
    }

    let orphaned = stdout.orphaned + stderr.orphaned;
    let unfinished = stdout.unfinished + stderr.unfinished;
    writeln!(
        out,
        "Lines: {} matched, {} dropped; steps without timing: {}",
        stdout.matched + stderr.matched,
        stdout.dropped + stderr.dropped,
        orphaned + unfinished,
    )
}
