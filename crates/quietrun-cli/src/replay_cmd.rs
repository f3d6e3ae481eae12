//! `quietrun replay`: run a captured log through the classifier.
//!
//! Useful for checking a rule table against real output without rerunning
//! the deployment.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use quietrun_core::{Renderer, RuleTable, StreamAdapter, StreamSummary};

use crate::run_cmd::{PUMP_CHUNK, write_summary};

/// Replay `input` (a file path, or `-` for stdin) into `out`.
pub fn run_replay<W: Write>(
    input: &Path,
    rules: Arc<RuleTable>,
    renderer: Renderer,
    summary: bool,
    out: &mut W,
) -> Result<StreamSummary> {
    let name = input.display().to_string();
    let mut reader: Box<dyn Read> = if input == Path::new("-") {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(
            std::fs::File::open(input)
                .with_context(|| format!("failed to open {}", input.display()))?,
        )
    };

    let mut adapter = StreamAdapter::classify(&mut *out, rules)
        .with_renderer(renderer)
        .with_name(name.clone());

    let mut buf = vec![0u8; PUMP_CHUNK];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("failed to read {name}"))?;
        if n == 0 {
            break;
        }
        adapter.write_all(&buf[..n])?;
    }
    adapter.close()?;
    let stats = adapter.summary().clone();
    drop(adapter);

    if summary {
        write_summary(out, &stats, &StreamSummary::default())?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quietrun_test_utils::{DEPLOY_TRANSCRIPT, SharedBuffer};

    #[test]
    fn replay_renders_log_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("deploy.log");
        std::fs::write(&log, "Running script: /digest.sh\r\nScript elapsed time: 350ms\r\n").unwrap();

        let mut out = SharedBuffer::new();
        let stats = run_replay(
            &log,
            Arc::new(RuleTable::deploy()),
            Renderer::new(),
            false,
            &mut out,
        )
        .unwrap();

        assert_eq!(
            out.contents(),
            "RETRIEVING Docker DIGEST via: /digest.sh\nElapsed: 0.350s\n"
        );
        assert_eq!(stats.matched, 2);
    }

    #[test]
    fn replay_with_summary_appends_table() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("deploy.log");
        std::fs::write(&log, DEPLOY_TRANSCRIPT).unwrap();

        let mut out = Vec::new();
        run_replay(
            &log,
            Arc::new(RuleTable::deploy()),
            Renderer::new(),
            true,
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Step timings:"), "got: {text}");
        assert!(text.contains("PUBLISHING artifact to Artifactory"), "got: {text}");
    }

    #[test]
    fn replay_missing_file_names_path() {
        let err = run_replay(
            Path::new("/nonexistent/deploy.log"),
            Arc::new(RuleTable::deploy()),
            Renderer::new(),
            false,
            &mut Vec::<u8>::new(),
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("/nonexistent/deploy.log"),
            "unexpected error: {err}"
        );
    }
}
