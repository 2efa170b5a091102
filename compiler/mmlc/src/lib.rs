//! Compiler driver: one `compile()` entry threading the whole pipeline.
//!
//! Source text goes in, a [`CompilerState`] comes out carrying the final
//! module, accumulated diagnostics, per-phase timings, and — when the
//! compile was clean — the emitted LLVM IR text. Errors never abort the
//! pipeline early within the semantic phases; ownership analysis and
//! emission only run on a clean front half.
//!
//! No file I/O happens here; the binary in `main.rs` owns paths and
//! writing `.ll` output.

mod config;
mod timings;

#[cfg(test)]
mod tests;

use mml_diagnostic::{Diagnostic, ErrorCode, Severity};
use mml_ir::{Module, ResolvablesIndex, SourceInfo, SourceOrigin};
use mml_llvm::{CodeGenError, CodeGenErrorKind, EmitOptions};
use mml_parse::{ParseError, ParseWarning};
use mml_sem::PhaseState;
use tracing::debug;

pub use config::{Config, DriverError};
pub use timings::Timings;

/// Everything a compile run produced.
#[derive(Clone, Debug)]
pub struct CompilerState {
    pub module: Module,
    pub index: ResolvablesIndex,
    pub source: SourceInfo,
    pub config: Config,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub timings: Timings,
    pub llvm_ir: Option<String>,
}

impl CompilerState {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Compile one module from source text.
pub fn compile(source: &str, module_name: &str, config: Config) -> CompilerState {
    let source = SourceInfo::new(source);
    let mut timings = Timings::new();
    debug!(module = module_name, bytes = source.len(), "compile start");

    // Parse.
    let parse_out = timings.time("parse", || mml_parse::parse(&source, module_name));
    let mut errors: Vec<Diagnostic> = Vec::new();
    let mut warnings: Vec<Diagnostic> = Vec::new();
    for err in &parse_out.errors {
        // Member and term failures surface through phase 1 walking the
        // tree; malformed identifiers only exist in this list.
        if let ParseError::MalformedIdentifier { span, message } = err {
            errors.push(Diagnostic::error(
                ErrorCode::ParseIdError,
                "mml_parse",
                SourceOrigin::FromSource(*span),
                message.clone(),
            ));
        }
    }
    for warning in &parse_out.warnings {
        let ParseWarning::UnattachedDocComment { span } = warning;
        warnings.push(Diagnostic::warning(
            ErrorCode::UnattachedDocComment,
            "mml_parse",
            SourceOrigin::FromSource(*span),
            "this doc comment is attached to nothing and will be discarded",
        ));
    }

    // The seven semantic phases, timed individually.
    let mut state = timings.time("inject", || PhaseState::seed(parse_out.module));
    for (name, phase) in mml_sem::PHASES {
        state = timings.time(name, || phase(state));
    }
    errors.append(&mut state.errors);
    warnings.append(&mut state.warnings);

    let PhaseState { module, index, .. } = state;
    let mut compiled = CompilerState {
        module,
        index,
        source,
        config,
        errors,
        warnings,
        timings: Timings::new(),
        llvm_ir: None,
    };

    if compiled.has_errors() {
        compiled.timings = timings;
        return compiled;
    }

    // Ownership analysis.
    let owned = timings.time("ownership", || {
        mml_own::analyze(compiled.module.clone(), &compiled.index)
    });
    compiled.module = owned.module;
    compiled.errors.extend(owned.errors);
    if compiled.has_errors() {
        compiled.timings = timings;
        return compiled;
    }
    compiled.index = ResolvablesIndex::build(&compiled.module);

    // Emission.
    let options = EmitOptions {
        triple: compiled.config.target_triple.clone(),
        abi: compiled.config.target_abi,
        mode: compiled.config.mode,
        no_tco: compiled.config.no_tco,
    };
    let result = timings.time("codegen", || {
        mml_llvm::emit_module(&compiled.module, &compiled.index, &options)
    });
    match result {
        Ok(ir) => compiled.llvm_ir = Some(ir),
        Err(err) => compiled.errors.push(codegen_diagnostic(&err)),
    }

    compiled.timings = timings;
    compiled
}

/// Derive a module name from a file stem: words separated by `-`, `_`, or
/// spaces are capitalized and joined (`hello-world` becomes `HelloWorld`).
pub fn module_name_from_stem(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn codegen_diagnostic(err: &CodeGenError) -> Diagnostic {
    let code = match err.kind {
        CodeGenErrorKind::MissingTypeInfo => ErrorCode::MissingTypeInfo,
        CodeGenErrorKind::UnsupportedAbi => ErrorCode::UnsupportedAbi,
        CodeGenErrorKind::TemplateMismatch => ErrorCode::TemplateMismatch,
        CodeGenErrorKind::Other => ErrorCode::CodeGenFailure,
    };
    Diagnostic {
        severity: Severity::Error,
        code,
        message: err.message.clone(),
        primary: err.origin.unwrap_or(SourceOrigin::Synth),
        labels: Vec::new(),
        phase: mml_llvm::NAME,
    }
}
