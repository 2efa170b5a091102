//! Diagnostic system for the MinnieML compiler.
//!
//! Phases report problems as [`Diagnostic`] values: an [`ErrorCode`] tag, a
//! severity, a primary [`mml_ir::SourceOrigin`], related labels, and the
//! fully-qualified phase name. Diagnostics accumulate across the whole
//! pipeline; the driver filters synthetic-only entries with
//! [`user_visible`] and renders the rest through [`TerminalEmitter`].

mod diagnostic;
pub mod emitter;

pub use diagnostic::{user_visible, Diagnostic, ErrorCode, Label, Severity};
pub use emitter::TerminalEmitter;
