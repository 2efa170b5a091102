//! Core diagnostic types.
//!
//! Every failure the pipeline can report becomes a [`Diagnostic`]: a tagged
//! [`ErrorCode`], a severity, a primary origin, optional related labels, a
//! human message, and the fully-qualified name of the phase that raised it.
//! Phases accumulate diagnostics; nothing short-circuits.

use std::fmt;

use mml_ir::{SourceOrigin, SrcSpan};

/// Severity level for diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// The closed taxonomy of diagnostic kinds across all phases.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Parser
    ParseError,
    ParseIdError,
    // Semantic phases
    ParseErrorFound,
    DuplicateName,
    UndefinedRef,
    UndefinedTypeRef,
    InvalidExpressionFound,
    InvalidTypeFound,
    DanglingTerms,
    CyclicTypeAlias,
    MissingParameterType,
    TypeMismatch,
    InvalidApplication,
    UndersaturatedApplication,
    OversaturatedApplication,
    ConditionalBranchTypeMismatch,
    UntypedHoleInBinding,
    // Ownership
    UseAfterMove,
    DoubleFree,
    MissingClone,
    // Code generation
    MissingTypeInfo,
    UnsupportedAbi,
    TemplateMismatch,
    CodeGenFailure,
    // Driver-level
    UnattachedDocComment,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "parse-error",
            ErrorCode::ParseIdError => "parse-id-error",
            ErrorCode::ParseErrorFound => "parse-error-found",
            ErrorCode::DuplicateName => "duplicate-name",
            ErrorCode::UndefinedRef => "undefined-ref",
            ErrorCode::UndefinedTypeRef => "undefined-type-ref",
            ErrorCode::InvalidExpressionFound => "invalid-expression",
            ErrorCode::InvalidTypeFound => "invalid-type",
            ErrorCode::DanglingTerms => "dangling-terms",
            ErrorCode::CyclicTypeAlias => "cyclic-type-alias",
            ErrorCode::MissingParameterType => "missing-parameter-type",
            ErrorCode::TypeMismatch => "type-mismatch",
            ErrorCode::InvalidApplication => "invalid-application",
            ErrorCode::UndersaturatedApplication => "undersaturated-application",
            ErrorCode::OversaturatedApplication => "oversaturated-application",
            ErrorCode::ConditionalBranchTypeMismatch => "conditional-branch-type-mismatch",
            ErrorCode::UntypedHoleInBinding => "untyped-hole-in-binding",
            ErrorCode::UseAfterMove => "use-after-move",
            ErrorCode::DoubleFree => "double-free",
            ErrorCode::MissingClone => "missing-clone",
            ErrorCode::MissingTypeInfo => "missing-type-info",
            ErrorCode::UnsupportedAbi => "unsupported-abi",
            ErrorCode::TemplateMismatch => "template-mismatch",
            ErrorCode::CodeGenFailure => "codegen-failure",
            ErrorCode::UnattachedDocComment => "unattached-doc-comment",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secondary location with its own message.
#[derive(Clone, PartialEq, Debug)]
pub struct Label {
    pub origin: SourceOrigin,
    pub message: String,
}

impl Label {
    pub fn new(origin: SourceOrigin, message: impl Into<String>) -> Self {
        Label {
            origin,
            message: message.into(),
        }
    }
}

/// A single reported problem.
#[derive(Clone, PartialEq, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub primary: SourceOrigin,
    pub labels: Vec<Label>,
    /// Fully-qualified name of the phase that raised this, e.g.
    /// `mml_sem::phases::duplicate_names`.
    pub phase: &'static str,
}

impl Diagnostic {
    pub fn error(
        code: ErrorCode,
        phase: &'static str,
        primary: SourceOrigin,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            primary,
            labels: Vec::new(),
            phase,
        }
    }

    pub fn warning(
        code: ErrorCode,
        phase: &'static str,
        primary: SourceOrigin,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            code,
            message: message.into(),
            primary,
            labels: Vec::new(),
            phase,
        }
    }

    #[must_use]
    pub fn with_label(mut self, origin: SourceOrigin, message: impl Into<String>) -> Self {
        self.labels.push(Label::new(origin, message));
        self
    }

    /// The span to point at: the primary one, or the first labelled real
    /// span when the primary is synthetic.
    pub fn user_span(&self) -> Option<SrcSpan> {
        self.primary
            .span()
            .or_else(|| self.labels.iter().find_map(|l| l.origin.span()))
    }

    /// Diagnostics anchored only to synthetic nodes are not surfaced to
    /// CLI/LSP consumers.
    pub fn is_user_visible(&self) -> bool {
        self.user_span().is_some()
    }
}

/// Drop diagnostics that carry no real source position.
pub fn user_visible(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
    diagnostics.iter().filter(|d| d.is_user_visible()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mml_ir::SrcPoint;

    const PHASE: &str = "mml_sem::phases::test";

    fn span(start: u32, end: u32) -> SrcSpan {
        SrcSpan::new(SrcPoint::new(start, 1, start + 1), SrcPoint::new(end, 1, end + 1))
    }

    #[test]
    fn synthetic_only_diagnostics_are_filtered() {
        let synth = Diagnostic::error(ErrorCode::DuplicateName, PHASE, SourceOrigin::Synth, "dup");
        let real = Diagnostic::error(
            ErrorCode::DuplicateName,
            PHASE,
            SourceOrigin::FromSource(span(3, 8)),
            "dup",
        );
        let all = vec![synth, real];
        let visible = user_visible(&all);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].user_span().unwrap().start.offset, 3);
    }

    #[test]
    fn label_span_rescues_synthetic_primary() {
        let d = Diagnostic::error(ErrorCode::DuplicateName, PHASE, SourceOrigin::Synth, "dup")
            .with_label(SourceOrigin::FromSource(span(10, 14)), "second occurrence");
        assert!(d.is_user_visible());
        assert_eq!(d.user_span().unwrap().start.offset, 10);
    }
}
