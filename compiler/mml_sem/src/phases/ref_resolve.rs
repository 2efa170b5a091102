//! Phase 4: reference resolution.
//!
//! For every `Ref`, scopes are searched in order: enclosing lambda
//! parameters (innermost first), then module members. A value binding never
//! resolves to itself (so `let x = x;` is undefined), but functions and
//! operators do — recursion resolves against the already-declared member
//! set.
//!
//! `candidates` receives *all* matches; the expression rewriter narrows to
//! one using position. An empty candidate set replaces the enclosing
//! expression with `InvalidExpression` and raises `UndefinedRef`.

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{
    Expr, InvalidExpression, Member, Ref, ResolvableId, ResolvablesIndex, Term,
};
use rustc_hash::FxHashMap;

use crate::PhaseState;

pub const NAME: &str = "mml_sem::phases::ref_resolve";

type Scope = FxHashMap<String, ResolvableId>;

struct Ctx<'a> {
    index: &'a ResolvablesIndex,
    module_name: &'a str,
    /// The current member's own id, excluded for value bindings.
    exclude: Option<ResolvableId>,
    errors: Vec<Diagnostic>,
}

pub fn run(mut state: PhaseState) -> PhaseState {
    let index = state.index.clone();
    let module_name = state.module.name.clone();
    let mut errors = Vec::new();

    for member in &mut state.module.members {
        let mut ctx = Ctx {
            index: &index,
            module_name: &module_name,
            exclude: None,
            errors: Vec::new(),
        };
        match member {
            Member::Bnd(bnd) => {
                if let Some(lambda) = bnd.lambda_mut() {
                    let mut scopes = vec![param_scope(&lambda.params)];
                    lambda.body = resolve_expr(lambda.body.clone(), &mut scopes, &mut ctx);
                } else {
                    // `let x = x;` must not resolve to itself.
                    ctx.exclude = bnd.id.clone();
                    let mut scopes = Vec::new();
                    bnd.value = resolve_expr(bnd.value.clone(), &mut scopes, &mut ctx);
                }
            }
            Member::BinOp(op) => {
                let mut scope = Scope::default();
                for p in [&op.lhs, &op.rhs] {
                    if let Some(id) = &p.id {
                        scope.insert(p.name.clone(), id.clone());
                    }
                }
                let mut scopes = vec![scope];
                op.body = resolve_expr(op.body.clone(), &mut scopes, &mut ctx);
            }
            Member::UnaryOp(op) => {
                let mut scope = Scope::default();
                if let Some(id) = &op.param.id {
                    scope.insert(op.param.name.clone(), id.clone());
                }
                let mut scopes = vec![scope];
                op.body = resolve_expr(op.body.clone(), &mut scopes, &mut ctx);
            }
            _ => {}
        }
        errors.append(&mut ctx.errors);
    }

    state.errors.append(&mut errors);
    state
}

fn param_scope(params: &[mml_ir::FnParam]) -> Scope {
    let mut scope = Scope::default();
    for p in params {
        if let Some(id) = &p.id {
            scope.insert(p.name.clone(), id.clone());
        }
    }
    scope
}

/// Resolve all refs in an expression. Any failing term replaces the whole
/// enclosing expression with `InvalidExpression`.
fn resolve_expr(mut expr: Expr, scopes: &mut Vec<Scope>, ctx: &mut Ctx<'_>) -> Expr {
    let mut ok = true;
    for term in &mut expr.terms {
        if !resolve_term(term, scopes, ctx) {
            ok = false;
        }
    }
    if ok {
        expr
    } else {
        let origin = expr.origin;
        Expr::single(Term::Invalid(Box::new(InvalidExpression {
            origin,
            original: expr,
        })))
    }
}

fn resolve_term(term: &mut Term, scopes: &mut Vec<Scope>, ctx: &mut Ctx<'_>) -> bool {
    match term {
        Term::Ref(r) => resolve_ref(r, scopes, ctx),
        Term::App(a) => {
            let func_ok = resolve_term(&mut a.func, scopes, ctx);
            a.arg = resolve_expr(a.arg.clone(), scopes, ctx);
            func_ok
        }
        Term::Lambda(l) => {
            scopes.push(param_scope(&l.params));
            l.body = resolve_expr(l.body.clone(), scopes, ctx);
            scopes.pop();
            true
        }
        Term::Cond(c) => {
            c.cond = resolve_expr(c.cond.clone(), scopes, ctx);
            c.if_true = resolve_expr(c.if_true.clone(), scopes, ctx);
            c.if_false = resolve_expr(c.if_false.clone(), scopes, ctx);
            true
        }
        Term::Tuple(t) => {
            for e in &mut t.elems {
                *e = resolve_expr(e.clone(), scopes, ctx);
            }
            true
        }
        Term::Group(g) => {
            g.inner = resolve_expr(g.inner.clone(), scopes, ctx);
            true
        }
        // Opaque to this phase.
        Term::Int { .. }
        | Term::Float { .. }
        | Term::Str { .. }
        | Term::Bool { .. }
        | Term::Unit { .. }
        | Term::Hole(_)
        | Term::Placeholder { .. }
        | Term::Native(_)
        | Term::Invalid(_)
        | Term::Error(_) => true,
    }
}

fn resolve_ref(r: &mut Ref, scopes: &mut Vec<Scope>, ctx: &mut Ctx<'_>) -> bool {
    if let Some(qualifier) = r.qualifier.as_deref_mut() {
        // `Module.member` walks the qualifier chain; anything else is a
        // field selection on a resolved value.
        if qualifier.qualifier.is_none() && qualifier.name == ctx.module_name {
            return resolve_unqualified(r, &mut Vec::new(), ctx);
        }
        if !resolve_ref(qualifier, scopes, ctx) {
            return false;
        }
        // Field access: the ref points at the owner; the type checker
        // substitutes the field type.
        r.candidates = qualifier.candidates.clone();
        r.resolved = qualifier.resolved.clone();
        return true;
    }
    resolve_unqualified(r, scopes, ctx)
}

fn resolve_unqualified(r: &mut Ref, scopes: &mut [Scope], ctx: &mut Ctx<'_>) -> bool {
    // Innermost lambda parameters shadow module members.
    for scope in scopes.iter().rev() {
        if let Some(id) = scope.get(&r.name) {
            r.candidates = vec![id.clone()];
            r.resolved = Some(id.clone());
            return true;
        }
    }
    let mut candidates: Vec<ResolvableId> = ctx
        .index
        .named(&r.name)
        .iter()
        .filter(|id| ctx.exclude.as_ref() != Some(id))
        .cloned()
        .collect();
    if candidates.is_empty() {
        ctx.errors.push(Diagnostic::error(
            ErrorCode::UndefinedRef,
            NAME,
            r.origin,
            format!("`{}` is not defined", r.name),
        ));
        return false;
    }
    if candidates.len() == 1 {
        r.resolved = Some(candidates[0].clone());
    }
    r.candidates = std::mem::take(&mut candidates);
    true
}
