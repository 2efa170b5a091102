//! Terminal rendering of diagnostics via ariadne.
//!
//! Synthetic-only diagnostics never reach this module; callers filter with
//! [`crate::user_visible`] first.

use ariadne::{Config, Label as AriadneLabel, Report, ReportKind, Source};
use mml_ir::SourceInfo;

use crate::diagnostic::{Diagnostic, Severity};

/// Renders diagnostics against a single source buffer.
pub struct TerminalEmitter<'a> {
    filename: &'a str,
    source: &'a SourceInfo,
    colors: bool,
}

impl<'a> TerminalEmitter<'a> {
    pub fn new(filename: &'a str, source: &'a SourceInfo) -> Self {
        TerminalEmitter {
            filename,
            source,
            colors: false,
        }
    }

    #[must_use]
    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    /// Render one diagnostic to a string. Diagnostics without any real span
    /// render as a bare one-line message.
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let Some(span) = diagnostic.user_span() else {
            return format!(
                "{}[{}]: {}\n",
                diagnostic.severity, diagnostic.code, diagnostic.message
            );
        };

        let kind = match diagnostic.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Note => ReportKind::Advice,
        };

        let mut builder = Report::build(kind, self.filename, span.start.offset as usize)
            .with_config(Config::default().with_color(self.colors))
            .with_code(diagnostic.code.as_str())
            .with_message(&diagnostic.message)
            .with_label(
                AriadneLabel::new((self.filename, span.to_range()))
                    .with_message(&diagnostic.message),
            );

        for label in &diagnostic.labels {
            if let Some(label_span) = label.origin.span() {
                builder = builder.with_label(
                    AriadneLabel::new((self.filename, label_span.to_range()))
                        .with_message(&label.message),
                );
            }
        }
        builder = builder.with_note(format!("raised in {}", diagnostic.phase));

        let mut out = Vec::new();
        let cache = (self.filename, Source::from(self.source.text()));
        if builder.finish().write(cache, &mut out).is_err() {
            return format!(
                "{}[{}]: {}\n",
                diagnostic.severity, diagnostic.code, diagnostic.message
            );
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Render every diagnostic, in order.
    pub fn render_all(&self, diagnostics: &[Diagnostic]) -> String {
        let mut out = String::new();
        for d in diagnostics {
            out.push_str(&self.render(d));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::ErrorCode;
    use mml_ir::{SourceOrigin, SrcSpan};

    #[test]
    fn renders_message_and_position() {
        let source = SourceInfo::new("let dup = 1;\nlet dup = 2;\n");
        let span = SrcSpan::new(source.point_at(17), source.point_at(20));
        let d = Diagnostic::error(
            ErrorCode::DuplicateName,
            "mml_sem::phases::duplicate_names",
            SourceOrigin::FromSource(span),
            "duplicate name `dup`",
        );
        let emitter = TerminalEmitter::new("test.mml", &source);
        let rendered = emitter.render(&d);
        assert!(rendered.contains("duplicate name `dup`"));
        assert!(rendered.contains("test.mml"));
    }

    #[test]
    fn synthetic_diagnostic_renders_bare_line() {
        let source = SourceInfo::new("");
        let d = Diagnostic::error(
            ErrorCode::CodeGenFailure,
            "mml_llvm::emit",
            SourceOrigin::Synth,
            "no type info",
        );
        let emitter = TerminalEmitter::new("test.mml", &source);
        assert_eq!(
            emitter.render(&d),
            "error[codegen-failure]: no type info\n"
        );
    }
}
