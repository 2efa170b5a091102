//! Semantic pipeline for the MinnieML compiler.
//!
//! Seven ordered phases, each a pure function over [`PhaseState`]:
//!
//! 1. [`phases::parse_errors`] — surface parser error nodes as diagnostics.
//! 2. [`phases::duplicate_names`] — wrap duplicate declarations.
//! 3. [`phases::type_resolve`] — resolve type references and alias chains.
//! 4. [`phases::ref_resolve`] — resolve value references to candidates.
//! 5. [`phases::rewrite`] — precedence climbing over flat term sequences.
//! 6. [`phases::simplify`] — strip redundant groups and wrappers.
//! 7. [`phases::typecheck`] — ascription lowering plus bidirectional checking.
//!
//! Phases only append errors, never mutate earlier entries, and operate on
//! partially valid trees by substituting `Invalid*` wrappers. The stdlib
//! injector ([`inject`]) runs once before phase 1.

pub mod inject;
pub mod phases;
pub(crate) mod walk;

#[cfg(test)]
mod tests;

use mml_ir::{assign_ids, Module, ResolvablesIndex};
use mml_diagnostic::Diagnostic;
use tracing::debug;

/// State threaded through the semantic phases.
#[derive(Clone, Debug)]
pub struct PhaseState {
    pub module: Module,
    pub index: ResolvablesIndex,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl PhaseState {
    /// Seed the pipeline: inject the stdlib, assign stable ids, build the
    /// first resolvables index.
    pub fn seed(mut module: Module) -> Self {
        inject::inject_stdlib(&mut module);
        assign_ids(&mut module);
        let index = ResolvablesIndex::build(&module);
        PhaseState {
            module,
            index,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Rebuild the resolvables index after members changed.
    pub fn reindex(&mut self) {
        self.index = ResolvablesIndex::build(&self.module);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// The ordered phase list: `(fully-qualified name, phase function)`.
pub const PHASES: &[(&str, fn(PhaseState) -> PhaseState)] = &[
    (phases::parse_errors::NAME, phases::parse_errors::run),
    (phases::duplicate_names::NAME, phases::duplicate_names::run),
    (phases::type_resolve::NAME, phases::type_resolve::run),
    (phases::ref_resolve::NAME, phases::ref_resolve::run),
    (phases::rewrite::NAME, phases::rewrite::run),
    (phases::simplify::NAME, phases::simplify::run),
    (phases::typecheck::NAME, phases::typecheck::run),
];

/// Run all seven phases in order.
pub fn run_pipeline(mut state: PhaseState) -> PhaseState {
    for (name, phase) in PHASES {
        debug!(
            phase = name,
            errors = state.errors.len(),
            "running semantic phase"
        );
        state = phase(state);
    }
    state
}
