//! Read-only traversal helpers shared by the phases.

use mml_ir::{Expr, Member, Term};

/// Visit every expression reachable from a member, outermost first.
pub(crate) fn exprs_in_member(member: &Member, visit: &mut impl FnMut(&Expr)) {
    match member {
        Member::Bnd(bnd) => expr(&bnd.value, visit),
        Member::BinOp(op) => expr(&op.body, visit),
        Member::UnaryOp(op) => expr(&op.body, visit),
        Member::Duplicate(d) => exprs_in_member(&d.original, visit),
        Member::Invalid(inv) => exprs_in_member(&inv.original, visit),
        Member::TypeDef(_) | Member::TypeAlias(_) | Member::TypeStruct(_) | Member::ParseError(_) => {}
    }
}

pub(crate) fn expr(e: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(e);
    for t in &e.terms {
        term(t, visit);
    }
}

fn term(t: &Term, visit: &mut impl FnMut(&Expr)) {
    match t {
        Term::App(a) => {
            term(&a.func, visit);
            expr(&a.arg, visit);
        }
        Term::Lambda(l) => expr(&l.body, visit),
        Term::Cond(c) => {
            expr(&c.cond, visit);
            expr(&c.if_true, visit);
            expr(&c.if_false, visit);
        }
        Term::Tuple(tup) => {
            for e in &tup.elems {
                expr(e, visit);
            }
        }
        Term::Group(g) => expr(&g.inner, visit),
        Term::Invalid(i) => expr(&i.original, visit),
        Term::Int { .. }
        | Term::Float { .. }
        | Term::Str { .. }
        | Term::Bool { .. }
        | Term::Unit { .. }
        | Term::Ref(_)
        | Term::Hole(_)
        | Term::Placeholder { .. }
        | Term::Native(_)
        | Term::Error(_) => {}
    }
}
