//! Phase 6: simplification.
//!
//! Strips redundant `TermGroup`s and flattens nested single-term
//! expressions now that precedence has been applied. `Expr` wrappers at
//! block boundaries — member bodies, lambda bodies, conditional branches —
//! are preserved so the emitter always sees a block there.
//!
//! Idempotent: running it twice changes nothing.

use mml_ir::{Expr, Member, Term};

use crate::PhaseState;

pub const NAME: &str = "mml_sem::phases::simplify";

pub fn run(mut state: PhaseState) -> PhaseState {
    for member in &mut state.module.members {
        match member {
            Member::Bnd(bnd) => {
                if let Some(lambda) = bnd.lambda_mut() {
                    lambda.body = simplify_expr(lambda.body.clone());
                } else {
                    bnd.value = simplify_expr(bnd.value.clone());
                }
            }
            Member::BinOp(op) => op.body = simplify_expr(op.body.clone()),
            Member::UnaryOp(op) => op.body = simplify_expr(op.body.clone()),
            _ => {}
        }
    }
    state
}

/// Simplify an expression kept at a block boundary: the wrapper survives,
/// its terms simplify.
pub fn simplify_expr(mut expr: Expr) -> Expr {
    expr.terms = expr.terms.into_iter().map(simplify_term).collect();
    // A single redundant group at the top of a block unwraps into the block.
    while let [Term::Group(_)] = expr.terms.as_slice() {
        let Some(Term::Group(group)) = expr.terms.pop() else {
            unreachable!("compiler bug: matched group vanished");
        };
        expr.terms = group.inner.terms;
    }
    expr
}

fn simplify_term(term: Term) -> Term {
    match term {
        Term::Group(mut g) => {
            g.inner = simplify_expr(g.inner);
            // `(x)` is just `x` once precedence no longer needs the parens.
            if g.inner.terms.len() == 1 {
                g.inner.terms.remove(0)
            } else {
                Term::Group(g)
            }
        }
        Term::App(mut a) => {
            a.func = simplify_term(a.func);
            a.arg = simplify_expr(a.arg);
            Term::App(a)
        }
        Term::Lambda(mut l) => {
            l.body = simplify_expr(l.body);
            Term::Lambda(l)
        }
        Term::Cond(mut c) => {
            c.cond = simplify_expr(c.cond);
            c.if_true = simplify_expr(c.if_true);
            c.if_false = simplify_expr(c.if_false);
            Term::Cond(c)
        }
        Term::Tuple(mut t) => {
            t.elems = t.elems.into_iter().map(simplify_expr).collect();
            Term::Tuple(t)
        }
        other => other,
    }
}
