//! Ownership analysis: linear-types-lite over the checked AST.
//!
//! Heap values follow move-by-default, borrow-on-mark semantics. A function
//! parameter `x: T` takes ownership when `T` is a heap type; `&x: T` only
//! borrows. Natives declare their result effect via `@native[mem=...]`:
//! `alloc` results are owned by the caller, `view` results are borrowed,
//! `pure` is non-heap.
//!
//! The pass rewrites each function body so that every owned value is freed
//! exactly once on every path that does not move it away:
//!
//! - owned temporaries consumed by a *borrowing* parameter are hoisted into
//!   a synthetic let (`App(Lambda([__ownN], ...), producer)`) and freed
//!   after the consuming call;
//! - an owned binding passed to a *moving* parameter transfers ownership;
//!   passing it again later inserts `__clone_T`, and a use after an actual
//!   move is a `UseAfterMove` error;
//! - bindings still owned at a scope exit get `App(__free_T, x)` appended
//!   before the exit;
//! - at conditional joins the branches are equalized: a value moved on one
//!   side is freed on the other, which the runtime's `__cap` witness makes
//!   a no-op for static data.
//!
//! The AST is the entire output: no side table.

mod analyze;

#[cfg(test)]
mod tests;

use mml_diagnostic::Diagnostic;
use mml_ir::{Member, Module, ResolvablesIndex};
use tracing::debug;

pub const NAME: &str = "mml_own::analyze";

pub struct OwnershipResult {
    pub module: Module,
    pub errors: Vec<Diagnostic>,
}

/// Run ownership analysis over every function and operator body.
pub fn analyze(mut module: Module, index: &ResolvablesIndex) -> OwnershipResult {
    let mut errors = Vec::new();
    debug!(module = %module.name, "running ownership analysis");

    for member in &mut module.members {
        match member {
            Member::Bnd(bnd) if bnd.is_function() && bnd.native().is_none() => {
                let owner = bnd.id.clone();
                if let Some(lambda) = bnd.lambda_mut() {
                    analyze::function(lambda, owner.as_ref(), index, &mut errors);
                }
            }
            Member::BinOp(op) => {
                if !analyze::is_native_body(&op.body) {
                    let params = [op.lhs.clone(), op.rhs.clone()];
                    op.body = analyze::operator_body(
                        op.body.clone(),
                        &params,
                        op.ret_asc.as_ref(),
                        op.id.as_ref(),
                        index,
                        &mut errors,
                    );
                }
            }
            Member::UnaryOp(op) => {
                if !analyze::is_native_body(&op.body) {
                    let params = [op.param.clone()];
                    op.body = analyze::operator_body(
                        op.body.clone(),
                        &params,
                        op.ret_asc.as_ref(),
                        op.id.as_ref(),
                        index,
                        &mut errors,
                    );
                }
            }
            _ => {}
        }
    }

    OwnershipResult { module, errors }
}
