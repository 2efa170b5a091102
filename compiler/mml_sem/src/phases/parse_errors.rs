//! Phase 1: surface parser error nodes as diagnostics.
//!
//! The parser leaves `ParseError` members and `TermError` terms in the tree;
//! this phase walks them into the error vector. The module is unchanged.

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{Member, Term};

use crate::{walk, PhaseState};

pub const NAME: &str = "mml_sem::phases::parse_errors";

pub fn run(mut state: PhaseState) -> PhaseState {
    for member in &state.module.members {
        if let Member::ParseError(err) = member {
            state.errors.push(Diagnostic::error(
                ErrorCode::ParseErrorFound,
                NAME,
                err.origin,
                format!("could not parse declaration: {}", err.message),
            ));
        }
        walk::exprs_in_member(member, &mut |expr| {
            for term in &expr.terms {
                if let Term::Error(err) = term {
                    state.errors.push(Diagnostic::error(
                        ErrorCode::ParseErrorFound,
                        NAME,
                        err.origin,
                        format!("could not parse expression: {}", err.message),
                    ));
                }
            }
        });
    }
    state
}
