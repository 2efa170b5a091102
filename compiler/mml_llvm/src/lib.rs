//! LLVM IR emitter for the MinnieML compiler.
//!
//! Lowers a fully resolved, type-annotated, ownership-decorated module to a
//! single textual LLVM IR module. Covers platform ABI lowering for
//! aggregates at native call boundaries (x86_64 SysV and AArch64 AAPCS64),
//! TBAA metadata with C-rule field offsets, tail-recursion loopification,
//! and native-template intrinsic expansion.
//!
//! There is no partial IR on error: a failure aborts the current function's
//! body, though module-level declarations already emitted may remain in the
//! output of other members.

mod abi;
mod emit;
mod func;
mod layout;
mod mangle;
mod state;
mod tbaa;
mod templates;
mod types;

#[cfg(test)]
mod tests;

use mml_ir::{Module, ResolvablesIndex, SourceOrigin};
use thiserror::Error;

pub use mangle::{mangle_function, mangle_operator, operator_lexical_name};

pub const NAME: &str = "mml_llvm::emit";

/// Which aggregate-passing convention applies at native boundaries.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum TargetAbi {
    X86_64,
    AArch64,
    #[default]
    Default,
}

impl TargetAbi {
    /// Derive the ABI from a target triple.
    pub fn from_triple(triple: &str) -> TargetAbi {
        let arch = triple.split('-').next().unwrap_or("");
        match arch {
            "x86_64" => TargetAbi::X86_64,
            "aarch64" | "arm64" => TargetAbi::AArch64,
            _ => TargetAbi::Default,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum CompileMode {
    #[default]
    Binary,
    Library,
}

/// Everything the emitter needs to know about the compilation.
#[derive(Clone, Debug)]
pub struct EmitOptions {
    pub triple: String,
    pub abi: TargetAbi,
    pub mode: CompileMode,
    /// Disable tail-recursion loopification.
    pub no_tco: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            triple: "x86_64-unknown-linux-gnu".to_string(),
            abi: TargetAbi::X86_64,
            mode: CompileMode::Binary,
            no_tco: false,
        }
    }
}

/// Why emission failed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CodeGenErrorKind {
    MissingTypeInfo,
    UnsupportedAbi,
    TemplateMismatch,
    Other,
}

/// Emission failure: a message plus the node it points at, when known.
#[derive(Error, Clone, Debug)]
#[error("{message}")]
pub struct CodeGenError {
    pub kind: CodeGenErrorKind,
    pub message: String,
    pub origin: Option<SourceOrigin>,
}

impl CodeGenError {
    pub fn new(kind: CodeGenErrorKind, message: impl Into<String>) -> Self {
        CodeGenError {
            kind,
            message: message.into(),
            origin: None,
        }
    }

    #[must_use]
    pub fn at(mut self, origin: SourceOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn missing_type(message: impl Into<String>) -> Self {
        CodeGenError::new(CodeGenErrorKind::MissingTypeInfo, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        CodeGenError::new(CodeGenErrorKind::Other, message)
    }
}

/// Emit the module as LLVM IR text.
pub fn emit_module(
    module: &Module,
    index: &ResolvablesIndex,
    options: &EmitOptions,
) -> Result<String, CodeGenError> {
    emit::emit(module, index, options)
}
