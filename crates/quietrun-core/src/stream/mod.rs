//! Per-stream plumbing: the [`assembler::LineAssembler`] that rebuilds lines
//! from arbitrary chunks and the [`adapter::StreamAdapter`] sink that drives
//! classification.

pub mod adapter;
pub mod assembler;

use std::fmt;

/// How a [`adapter::StreamAdapter`] treats the bytes written to it.
///
/// Fixed for the lifetime of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Classify lines and write only rendered progress.
    #[default]
    Classify,
    /// Forward bytes unchanged; nothing is buffered or classified.
    Passthrough,
}

impl Mode {
    /// `Passthrough` when verbose, `Classify` otherwise.
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose { Self::Passthrough } else { Self::Classify }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Classify => "classify",
            Self::Passthrough => "passthrough",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_selects_passthrough() {
        assert_eq!(Mode::from_verbose(true), Mode::Passthrough);
        assert_eq!(Mode::from_verbose(false), Mode::Classify);
    }

    #[test]
    fn mode_displays_lowercase() {
        assert_eq!(Mode::Classify.to_string(), "classify");
        assert_eq!(Mode::Passthrough.to_string(), "passthrough");
    }
}
