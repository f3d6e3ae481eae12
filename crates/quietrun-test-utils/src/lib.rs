//! Shared test utilities for quietrun tests.
//!
//! - [`SharedBuffer`]: a cloneable in-memory sink, so a test can keep a
//!   handle on output written through an adapter it moved elsewhere.
//! - Chunk splitters that replay the same bytes with different write
//!   boundaries.
//! - A canned deployment transcript with its expected rendering.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable `Write` sink backed by a shared byte vector.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of everything written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Everything written so far, decoded as UTF-8.
    ///
    /// # Panics
    ///
    /// Panics if the output is not valid UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8(self.bytes()).expect("output is not UTF-8")
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write `bytes` to `w` in chunks of at most `size` bytes.
///
/// # Panics
///
/// Panics if `size` is zero or a write fails.
pub fn write_in_chunks<W: Write>(w: &mut W, bytes: &[u8], size: usize) {
    assert!(size > 0, "chunk size must be positive");
    for chunk in bytes.chunks(size) {
        w.write_all(chunk).expect("chunked write failed");
    }
}

/// Write `bytes` to `w` one byte per call.
pub fn write_bytewise<W: Write>(w: &mut W, bytes: &[u8]) {
    write_in_chunks(w, bytes, 1);
}

/// Write `bytes` to `w` split at each of `cuts` (byte offsets, ascending).
///
/// # Panics
///
/// Panics if a cut is out of range or the offsets are not ascending.
pub fn write_split_at<W: Write>(w: &mut W, bytes: &[u8], cuts: &[usize]) {
    let mut start = 0;
    for &cut in cuts {
        assert!(cut >= start && cut <= bytes.len(), "bad cut offset {cut}");
        w.write_all(&bytes[start..cut]).expect("split write failed");
        start = cut;
    }
    w.write_all(&bytes[start..]).expect("split write failed");
}

/// Raw stdout of a deployment run: script headers, tool chatter, timings.
pub const DEPLOY_TRANSCRIPT: &str = "\
[deploy] resolving environment
Running script: /opt/usi/scripts/build.sh
Starting local Bazel server and connecting to it...
bazel build --build_tag_filters= //site:bundle
Loading: 0 packages loaded
Streaming build results to: https://results.example/inv/42
Analyzing: target //site:bundle (12 packages loaded)
INFO: Elapsed time: 12.412s, Critical Path: 9.87s
INFO: Build completed successfully, 214 total actions
Script elapsed time: 20.125s
Running script: /opt/usi/scripts/publish.sh
Uploading site-bundle.tar.gz
Script elapsed time: 3.5s
Running script: /opt/usi/scripts/sync.sh
Running webpack
webpack 5.90.0 compiled successfully
INFO: Elapsed time: 0.8s
The service usi-site is not deployed to stage
Script elapsed time: 1m2.5s
";

/// Plain rendering of [`DEPLOY_TRANSCRIPT`] with the built-in rules and a
/// clock that never moves (the webpack step times itself at `0.000s`).
pub const DEPLOY_RENDERED: &str = "\
BUILDING artifact via: /opt/usi/scripts/build.sh
  - Starting local Bazel server and connecting to it...
  - Building your application via bazel [//site:bundle]
    Streaming build results to: https://results.example/inv/42
  Elapsed: 12.412s
Elapsed: 20.125s
PUBLISHING artifact to Artifactory via: /opt/usi/scripts/publish.sh
Elapsed: 3.500s
SYNCING Static Assets via: /opt/usi/scripts/sync.sh
  - Executing webpack
  Elapsed: 0.000s
Elapsed: 62.500s
";
