//! Phase 5: expression rewriting by precedence climbing.
//!
//! The flat term sequences the parser produced become application trees.
//! Four token classes drive the climb: values, prefix operators, binary
//! operators, and postfix operators. Juxtaposition is an implicit
//! left-associative operator at precedence 100 — the highest — so
//! `f a b` becomes `App(App(f, a), b)` while `1 + 2 * 3` becomes
//! `App(App(+, 1), App(App(*, 2), 3))`.
//!
//! Position disambiguates overloaded names via `candidates`: operand
//! position prefers non-operator candidates and falls back to prefix unary;
//! operator position prefers binary and falls back to postfix unary. When
//! every candidate is rejected the expression becomes `InvalidExpression`
//! and `DanglingTerms` is raised.
//!
//! After the climb, a zero-parameter function referenced in value position
//! is wrapped into an application to the unit literal.

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{
    App, Assoc, Expr, InvalidExpression, Member, Ref, Resolvable, ResolvableId, ResolvableKind,
    ResolvablesIndex, SourceOrigin, Term,
};

use crate::inject::JUXTAPOSITION_PRECEDENCE;
use crate::PhaseState;

pub const NAME: &str = "mml_sem::phases::rewrite";

const JUXT: u16 = JUXTAPOSITION_PRECEDENCE as u16;

struct Ctx<'a> {
    index: &'a ResolvablesIndex,
    errors: Vec<Diagnostic>,
}

struct Fail {
    origin: SourceOrigin,
    message: String,
}

/// How a reference can be used, per its surviving candidates.
#[derive(Default)]
struct Roles {
    value: Option<ResolvableId>,
    prefix: Option<(ResolvableId, u16)>,
    binary: Option<(ResolvableId, u16, Assoc)>,
    postfix: Option<(ResolvableId, u16)>,
}

pub fn run(mut state: PhaseState) -> PhaseState {
    let index = state.index.clone();
    let mut ctx = Ctx {
        index: &index,
        errors: Vec::new(),
    };

    for member in &mut state.module.members {
        match member {
            Member::Bnd(bnd) => {
                if let Some(lambda) = bnd.lambda_mut() {
                    lambda.body = rewrite_expr(lambda.body.clone(), &mut ctx);
                } else {
                    bnd.value = rewrite_expr(bnd.value.clone(), &mut ctx);
                }
            }
            Member::BinOp(op) => op.body = rewrite_expr(op.body.clone(), &mut ctx),
            Member::UnaryOp(op) => op.body = rewrite_expr(op.body.clone(), &mut ctx),
            _ => {}
        }
    }

    state.errors.append(&mut ctx.errors);
    state
}

fn rewrite_expr(expr: Expr, ctx: &mut Ctx<'_>) -> Expr {
    let origin = expr.origin;
    let terms: Vec<Term> = expr
        .terms
        .into_iter()
        .map(|t| rewrite_inner(t, ctx))
        .collect();

    // Error nodes are opaque: no climbing, no further diagnostics.
    if terms.iter().any(Term::is_invalid) {
        let mut e = Expr::new(origin, terms);
        e.origin = origin;
        return e;
    }

    match climb(&terms, 0, 0, ctx) {
        Ok((tree, consumed)) if consumed == terms.len() => {
            let tree = wrap_nullary(tree, false, ctx);
            let mut e = Expr::single(tree);
            e.origin = origin;
            e
        }
        Ok((_, consumed)) => {
            let dangling_origin = terms
                .get(consumed)
                .map_or(origin, |t| t.origin());
            ctx.errors.push(Diagnostic::error(
                ErrorCode::DanglingTerms,
                NAME,
                dangling_origin,
                "these terms do not combine into one expression",
            ));
            invalidate(origin, terms)
        }
        Err(fail) => {
            ctx.errors.push(Diagnostic::error(
                ErrorCode::DanglingTerms,
                NAME,
                fail.origin,
                fail.message,
            ));
            invalidate(origin, terms)
        }
    }
}

fn invalidate(origin: SourceOrigin, terms: Vec<Term>) -> Expr {
    let mut e = Expr::single(Term::Invalid(Box::new(InvalidExpression {
        origin,
        original: Expr::new(origin, terms),
    })));
    e.origin = origin;
    e
}

/// Rewrite expressions nested inside a term before the climb sees it.
fn rewrite_inner(term: Term, ctx: &mut Ctx<'_>) -> Term {
    match term {
        Term::Group(mut g) => {
            g.inner = rewrite_expr(g.inner, ctx);
            Term::Group(g)
        }
        Term::Cond(mut c) => {
            c.cond = rewrite_expr(c.cond, ctx);
            c.if_true = rewrite_expr(c.if_true, ctx);
            c.if_false = rewrite_expr(c.if_false, ctx);
            Term::Cond(c)
        }
        Term::Tuple(mut t) => {
            t.elems = t.elems.into_iter().map(|e| rewrite_expr(e, ctx)).collect();
            Term::Tuple(t)
        }
        Term::Lambda(mut l) => {
            l.body = rewrite_expr(l.body, ctx);
            Term::Lambda(l)
        }
        Term::App(mut a) => {
            a.func = rewrite_inner(a.func, ctx);
            a.arg = rewrite_expr(a.arg, ctx);
            Term::App(a)
        }
        other => other,
    }
}

fn roles_of(r: &Ref, ctx: &Ctx<'_>) -> Roles {
    let mut roles = Roles::default();
    // Field selections behave as plain values regardless of the owner.
    if r.qualifier.is_some() {
        roles.value = r.resolved.clone().or_else(|| r.candidates.first().cloned());
        return roles;
    }
    for id in &r.candidates {
        let Some(resolvable) = ctx.index.get(id) else {
            continue;
        };
        match classify(resolvable) {
            Role::Binary(prec, assoc) => {
                roles.binary.get_or_insert((id.clone(), prec, assoc));
            }
            Role::Prefix(prec) => {
                roles.prefix.get_or_insert((id.clone(), prec));
            }
            Role::Postfix(prec) => {
                roles.postfix.get_or_insert((id.clone(), prec));
            }
            Role::Value => {
                roles.value.get_or_insert(id.clone());
            }
        }
    }
    roles
}

enum Role {
    Value,
    Prefix(u16),
    Binary(u16, Assoc),
    Postfix(u16),
}

fn classify(resolvable: &Resolvable) -> Role {
    match resolvable.kind {
        ResolvableKind::BinOp => Role::Binary(
            u16::from(resolvable.precedence.unwrap_or(0)),
            resolvable.assoc.unwrap_or(Assoc::Left),
        ),
        ResolvableKind::UnaryOp => {
            let prec = u16::from(resolvable.precedence.unwrap_or(0));
            if resolvable.assoc == Some(Assoc::Left) {
                Role::Postfix(prec)
            } else {
                Role::Prefix(prec)
            }
        }
        _ => Role::Value,
    }
}

/// Pin a reference to one chosen candidate.
fn narrow(r: &Ref, id: ResolvableId) -> Term {
    let mut narrowed = r.clone();
    narrowed.candidates = vec![id.clone()];
    narrowed.resolved = Some(id);
    Term::Ref(narrowed)
}

/// Every non-reference term is an operand; references classify via roles.
fn is_value_term(term: &Term) -> bool {
    !matches!(term, Term::Ref(_))
}

/// Parse one operand: prefix operators then a value.
fn parse_operand(terms: &[Term], i: usize, ctx: &mut Ctx<'_>) -> Result<(Term, usize), Fail> {
    let Some(term) = terms.get(i) else {
        return Err(Fail {
            origin: terms.last().map_or(SourceOrigin::Synth, Term::origin),
            message: "expected an operand".to_string(),
        });
    };
    if let Term::Ref(r) = term {
        let roles = roles_of(r, ctx);
        // Operand position: prefer the non-operator reading.
        if let Some(id) = roles.value {
            return Ok((narrow(r, id), i + 1));
        }
        if let Some((id, prec)) = roles.prefix {
            // Prefix operators ascribe to the right: recurse at their own
            // precedence.
            let (operand, j) = climb(terms, i + 1, prec, ctx)?;
            let op_ref = narrow(r, id);
            let origin = op_ref.origin().merge(operand.origin());
            let arg = Expr::single(operand);
            return Ok((
                Term::App(Box::new(App {
                    origin,
                    func: op_ref,
                    arg,
                    type_spec: None,
                })),
                j,
            ));
        }
        return Err(Fail {
            origin: r.origin,
            message: format!("operator `{}` cannot start an operand", r.name),
        });
    }
    Ok((term.clone(), i + 1))
}

/// Precedence climbing over the flat term slice, starting at `i`, accepting
/// operators of precedence `>= min_prec`.
fn climb(
    terms: &[Term],
    i: usize,
    min_prec: u16,
    ctx: &mut Ctx<'_>,
) -> Result<(Term, usize), Fail> {
    let (mut lhs, mut i) = parse_operand(terms, i, ctx)?;

    while let Some(term) = terms.get(i) {
        if let Term::Ref(r) = term {
            let roles = roles_of(r, ctx);
            // Operator position: prefer binary, fall back to postfix.
            if let Some((id, prec, assoc)) = roles.binary {
                if prec >= min_prec {
                    let next_min = match assoc {
                        Assoc::Left => prec + 1,
                        Assoc::Right => prec,
                    };
                    let (rhs, j) = climb(terms, i + 1, next_min, ctx)?;
                    lhs = apply_binary(narrow(r, id), lhs, rhs);
                    i = j;
                    continue;
                }
                break;
            }
            if let Some((id, prec)) = roles.postfix {
                if prec >= min_prec {
                    lhs = apply_unary(narrow(r, id), lhs);
                    i += 1;
                    continue;
                }
                break;
            }
            // A value (or prefix-operator) reading makes this juxtaposition.
            if (roles.value.is_some() || roles.prefix.is_some()) && JUXT >= min_prec {
                let (rhs, j) = parse_operand(terms, i, ctx)?;
                lhs = apply_juxtaposition(lhs, rhs)?;
                i = j;
                continue;
            }
            break;
        }
        if is_value_term(term) && JUXT >= min_prec {
            let (rhs, j) = parse_operand(terms, i, ctx)?;
            lhs = apply_juxtaposition(lhs, rhs)?;
            i = j;
            continue;
        }
        break;
    }
    Ok((lhs, i))
}

fn apply_unary(op_ref: Term, operand: Term) -> Term {
    let origin = op_ref.origin().merge(operand.origin());
    Term::App(Box::new(App {
        origin,
        func: op_ref,
        arg: Expr::single(operand),
        type_spec: None,
    }))
}

fn apply_binary(op_ref: Term, lhs: Term, rhs: Term) -> Term {
    let inner_origin = op_ref.origin().merge(lhs.origin());
    let inner = Term::App(Box::new(App {
        origin: inner_origin,
        func: op_ref,
        arg: Expr::single(lhs),
        type_spec: None,
    }));
    let origin = inner_origin.merge(rhs.origin());
    Term::App(Box::new(App {
        origin,
        func: inner,
        arg: Expr::single(rhs),
        type_spec: None,
    }))
}

fn apply_juxtaposition(lhs: Term, rhs: Term) -> Result<Term, Fail> {
    // Peel redundant grouping in function position so `(f) x` applies f.
    let mut func = lhs;
    loop {
        match func {
            Term::Group(g) if g.inner.terms.len() == 1 => {
                let mut inner = g.inner;
                func = inner.terms.remove(0);
            }
            _ => break,
        }
    }
    if !func.is_applicable() {
        return Err(Fail {
            origin: func.origin().merge(rhs.origin()),
            message: "this term cannot be applied to an argument".to_string(),
        });
    }
    // A grouped argument contributes its inner expression directly.
    let arg = match rhs {
        Term::Group(g) => g.inner,
        other => Expr::single(other),
    };
    let origin = func.origin().merge(arg.origin);
    Ok(Term::App(Box::new(App {
        origin,
        func,
        arg,
        type_spec: None,
    })))
}

/// A zero-parameter function referenced in value position becomes an
/// application to the unit literal.
fn wrap_nullary(term: Term, in_call_position: bool, ctx: &Ctx<'_>) -> Term {
    match term {
        Term::Ref(r) => {
            if !in_call_position && is_nullary_fn(&r, ctx) {
                let origin = r.origin;
                return Term::App(Box::new(App {
                    origin,
                    func: Term::Ref(r),
                    arg: Expr::single(Term::unit()),
                    type_spec: None,
                }));
            }
            Term::Ref(r)
        }
        Term::App(mut a) => {
            a.func = wrap_nullary(a.func, true, ctx);
            a.arg.terms = a
                .arg
                .terms
                .drain(..)
                .map(|t| wrap_nullary(t, false, ctx))
                .collect();
            Term::App(a)
        }
        Term::Lambda(mut l) => {
            l.body.terms = l
                .body
                .terms
                .drain(..)
                .map(|t| wrap_nullary(t, false, ctx))
                .collect();
            Term::Lambda(l)
        }
        Term::Cond(mut c) => {
            for branch in [&mut c.cond, &mut c.if_true, &mut c.if_false] {
                branch.terms = branch
                    .terms
                    .drain(..)
                    .map(|t| wrap_nullary(t, false, ctx))
                    .collect();
            }
            Term::Cond(c)
        }
        Term::Group(mut g) => {
            g.inner.terms = g
                .inner
                .terms
                .drain(..)
                .map(|t| wrap_nullary(t, false, ctx))
                .collect();
            Term::Group(g)
        }
        Term::Tuple(mut t) => {
            for e in &mut t.elems {
                e.terms = e
                    .terms
                    .drain(..)
                    .map(|t| wrap_nullary(t, false, ctx))
                    .collect();
            }
            Term::Tuple(t)
        }
        other => other,
    }
}

fn is_nullary_fn(r: &Ref, ctx: &Ctx<'_>) -> bool {
    if r.qualifier.is_some() {
        return false;
    }
    let Some(id) = &r.resolved else { return false };
    let Some(resolvable) = ctx.index.get(id) else {
        return false;
    };
    resolvable.kind == ResolvableKind::Fn && resolvable.params.is_empty()
}
