//! Driver configuration and error type.

use std::path::PathBuf;

use mml_llvm::{CompileMode, TargetAbi};
use thiserror::Error;

pub const DEFAULT_TRIPLE: &str = "x86_64-unknown-linux-gnu";

#[derive(Clone, Debug)]
pub struct Config {
    pub target_triple: String,
    pub target_abi: TargetAbi,
    pub mode: CompileMode,
    /// Disable tail-recursion loopification.
    pub no_tco: bool,
    /// Where the binary writes `.ll` output; `None` means alongside input.
    pub output_dir: Option<PathBuf>,
    pub verbose_timings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target_triple: DEFAULT_TRIPLE.to_string(),
            target_abi: TargetAbi::from_triple(DEFAULT_TRIPLE),
            mode: CompileMode::Binary,
            no_tco: false,
            output_dir: None,
            verbose_timings: false,
        }
    }
}

impl Config {
    /// Set the triple, re-deriving the ABI from it.
    #[must_use]
    pub fn with_triple(mut self, triple: &str) -> Self {
        self.target_triple = triple.to_string();
        self.target_abi = TargetAbi::from_triple(triple);
        self
    }
}

/// Failures of the driver binary itself (not compilation diagnostics).
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("usage: mml <file.mml> [--lib] [--no-tco] [--triple TRIPLE] [--out DIR] [--timings] [--dump-ast] [--dump-ir]")]
    Usage,
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("could not read `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write `{path}`: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("compilation failed with {0} error(s)")]
    Failed(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_derives_abi() {
        let config = Config::default().with_triple("aarch64-apple-darwin");
        assert_eq!(config.target_abi, TargetAbi::AArch64);
        let config = Config::default().with_triple("riscv64-unknown-linux-gnu");
        assert_eq!(config.target_abi, TargetAbi::Default);
    }
}
