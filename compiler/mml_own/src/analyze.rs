//! The ownership walker.
//!
//! One recursive pass per function body. State is the owned set (heap
//! parameters and synthetic temporaries) plus a remaining-use counter that
//! decides between moving and cloning at each call site.

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{
    App, Expr, FnParam, Lambda, ParamSig, Ref, Resolvable, ResolvableId, ResolvableKind,
    ResolvablesIndex, SourceOrigin, Term, TypeFn, TypeSpec,
};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::NAME;

pub(crate) fn is_native_body(body: &Expr) -> bool {
    matches!(body.only_term(), Some(Term::Native(_)))
}

#[derive(Clone, Debug)]
struct OwnedLocal {
    name: String,
    heap_ty: String,
    ty_spec: TypeSpec,
    moved: bool,
}

struct St<'a> {
    index: &'a ResolvablesIndex,
    owner: Option<&'a ResolvableId>,
    owned: FxHashMap<ResolvableId, OwnedLocal>,
    uses_left: FxHashMap<ResolvableId, usize>,
    errors: &'a mut Vec<Diagnostic>,
    fresh: usize,
}

/// Analyze a function-shaped lambda in place.
pub(crate) fn function(
    lambda: &mut Lambda,
    owner: Option<&ResolvableId>,
    index: &ResolvablesIndex,
    errors: &mut Vec<Diagnostic>,
) {
    if is_native_body(&lambda.body) {
        return;
    }
    let ret_ty = lambda
        .ret_asc
        .clone()
        .or_else(|| lambda.type_spec.as_ref().and_then(|t| t.as_fn()).map(|f| f.ret.clone()));
    let body = std::mem::replace(&mut lambda.body, Expr::new(SourceOrigin::Synth, Vec::new()));
    lambda.body = scope_body(body, &lambda.params, ret_ty.as_ref(), owner, index, errors);
}

/// Analyze an operator body given its parameters.
pub(crate) fn operator_body(
    body: Expr,
    params: &[FnParam],
    ret: Option<&TypeSpec>,
    owner: Option<&ResolvableId>,
    index: &ResolvablesIndex,
    errors: &mut Vec<Diagnostic>,
) -> Expr {
    scope_body(body, params, ret, owner, index, errors)
}

fn scope_body(
    body: Expr,
    params: &[FnParam],
    ret_ty: Option<&TypeSpec>,
    owner: Option<&ResolvableId>,
    index: &ResolvablesIndex,
    errors: &mut Vec<Diagnostic>,
) -> Expr {
    let mut st = St {
        index,
        owner,
        owned: FxHashMap::default(),
        uses_left: FxHashMap::default(),
        errors,
        fresh: 0,
    };
    for param in params {
        if param.borrowed {
            continue;
        }
        let (Some(id), Some(ty)) = (&param.id, &param.type_spec) else {
            continue;
        };
        if let Some(heap_ty) = heap_struct_name(ty, index) {
            trace!(param = %param.name, ty = %heap_ty, "owned heap parameter");
            st.owned.insert(
                id.clone(),
                OwnedLocal {
                    name: param.name.clone(),
                    heap_ty,
                    ty_spec: ty.clone(),
                    moved: false,
                },
            );
        }
    }
    count_uses(&body, &mut st.uses_left);

    let mut body = process_block(body, &mut st, true);

    // Free the parameters still owned at the function exit.
    let leftovers: Vec<(ResolvableId, OwnedLocal)> = st
        .owned
        .iter()
        .filter(|(_, local)| !local.moved)
        .map(|(id, local)| (id.clone(), local.clone()))
        .collect();
    if leftovers.is_empty() {
        return body;
    }

    let frees: Vec<Term> = leftovers
        .iter()
        .map(|(id, local)| free_call(local, id, st.index))
        .collect();

    if type_is_unit(ret_ty, st.index) {
        body.terms.extend(frees);
        return body;
    }

    // Bind the result, free, then yield the bound value.
    let Some(result) = body.terms.pop() else {
        return body;
    };
    let result_ty = ret_ty.cloned().or_else(|| result.type_spec().cloned());
    let wrapper = bind_result(result, result_ty, frees, &mut st);
    body.terms.push(wrapper);
    body
}

/// Process a block expression. `escaping` marks blocks whose result value
/// leaves the scope (function bodies, conditional branches): a plain owned
/// reference there is a move out, not a leak.
fn process_block(mut expr: Expr, st: &mut St<'_>, escaping: bool) -> Expr {
    let terms = std::mem::take(&mut expr.terms);
    let count = terms.len();
    let mut out = Vec::with_capacity(count);
    for (i, term) in terms.into_iter().enumerate() {
        let last = i + 1 == count;
        let (term, _owned_temp) = process_term(term, st);
        if last && escaping {
            // A plain owned reference in result position moves out to the
            // caller rather than leaking.
            if let Term::Ref(r) = &term {
                if let Some(id) = &r.resolved {
                    if let Some(local) = st.owned.get_mut(id) {
                        if local.moved {
                            let local_name = local.name.clone();
                            st.errors.push(use_after_move(r.origin, &local_name));
                        }
                        local.moved = true;
                    }
                }
            }
        }
        out.push(term);
    }
    expr.terms = out;
    expr
}

fn process_term(term: Term, st: &mut St<'_>) -> (Term, Option<String>) {
    match term {
        Term::App(_) => process_call(term, st),
        Term::Cond(c) => process_cond(*c, st),
        Term::Lambda(mut l) => {
            let owner = st.owner;
            function(&mut l, owner, st.index, st.errors);
            (Term::Lambda(l), None)
        }
        Term::Group(mut g) => {
            g.inner = process_block(g.inner, st, false);
            (Term::Group(g), None)
        }
        other => (other, None),
    }
}

fn process_cond(mut cond: mml_ir::Cond, st: &mut St<'_>) -> (Term, Option<String>) {
    cond.cond = process_block(cond.cond, st, false);

    let before: FxHashMap<ResolvableId, bool> =
        st.owned.iter().map(|(id, l)| (id.clone(), l.moved)).collect();

    let mut if_true = process_block(cond.if_true, st, true);
    let moved_true: FxHashMap<ResolvableId, bool> =
        st.owned.iter().map(|(id, l)| (id.clone(), l.moved)).collect();

    for (id, moved) in &before {
        if let Some(local) = st.owned.get_mut(id) {
            local.moved = *moved;
        }
    }
    let mut if_false = process_block(cond.if_false, st, true);

    // Equalize the branches: whatever one side moved, the other frees.
    // The runtime `__cap` witness makes freeing static data a no-op.
    let ids: Vec<ResolvableId> = st.owned.keys().cloned().collect();
    for id in ids {
        let was_moved_before = before.get(&id).copied().unwrap_or(false);
        let in_true = moved_true.get(&id).copied().unwrap_or(false);
        let in_false = st.owned.get(&id).map_or(false, |l| l.moved);
        if was_moved_before {
            continue;
        }
        match (in_true, in_false) {
            (true, false) => {
                let local = st.owned[&id].clone();
                append_free(&mut if_false, &local, &id, st.index);
                if let Some(l) = st.owned.get_mut(&id) {
                    l.moved = true;
                }
            }
            (false, true) => {
                let local = st.owned[&id].clone();
                append_free(&mut if_true, &local, &id, st.index);
            }
            _ => {
                if let Some(l) = st.owned.get_mut(&id) {
                    l.moved = in_true && in_false;
                }
            }
        }
    }

    cond.if_true = if_true;
    cond.if_false = if_false;
    let owned = cond
        .type_spec
        .as_ref()
        .and_then(|t| heap_struct_name(t, st.index));
    (Term::Cond(Box::new(cond)), owned)
}

/// One level of a collapsed application chain.
struct Level {
    origin: SourceOrigin,
    type_spec: Option<TypeSpec>,
}

struct Hoist {
    id: ResolvableId,
    name: String,
    local: OwnedLocal,
    producer: Term,
}

fn process_call(term: Term, st: &mut St<'_>) -> (Term, Option<String>) {
    // Collapse App(App(f, a), b) into (f, [a, b]) remembering each level.
    let mut levels: Vec<Level> = Vec::new();
    let mut args: Vec<Expr> = Vec::new();
    let mut cursor = term;
    while let Term::App(app) = cursor {
        levels.push(Level {
            origin: app.origin,
            type_spec: app.type_spec.clone(),
        });
        args.push(app.arg);
        cursor = app.func;
    }
    let mut callee = cursor;
    args.reverse();
    levels.reverse();

    let contract = callee_contract(&callee, st.index);
    if let Term::Lambda(l) = &mut callee {
        // A callee lambda is its own scope (synthetic lets).
        let owner = st.owner;
        function(l, owner, st.index, st.errors);
    }

    let mut hoists: Vec<Hoist> = Vec::new();
    let mut processed_args = Vec::with_capacity(args.len());

    for (i, mut arg) in args.into_iter().enumerate() {
        let arg_ty = arg.type_spec.clone();
        let (new_last, owned_temp) = match arg.terms.pop() {
            Some(t) => process_term(t, st),
            None => (Term::unit(), None),
        };
        let param = contract.params.get(i);
        let arg_heap = arg_ty
            .as_ref()
            .and_then(|t| heap_struct_name(t, st.index));
        let moving = param.map_or(false, |p| !p.borrowed) && arg_heap.is_some();

        let mut final_term = new_last;
        if let Some(heap_ty) = owned_temp {
            if !moving {
                // Owned temporary consumed by a borrowing parameter:
                // hoist it so it can be freed after this call.
                let (id, name) = st.fresh_temp();
                let ty_spec = arg_ty.clone().unwrap_or(TypeSpec::named(&heap_ty));
                let local = OwnedLocal {
                    name: name.clone(),
                    heap_ty,
                    ty_spec: ty_spec.clone(),
                    moved: false,
                };
                let producer = final_term;
                let mut temp_ref = Ref::synth(name.clone(), id.clone());
                temp_ref.type_spec = Some(ty_spec);
                final_term = Term::Ref(temp_ref);
                hoists.push(Hoist {
                    id,
                    name,
                    local,
                    producer,
                });
            }
            // A moving parameter consumes the temporary: ownership
            // transfers into the callee.
        } else if let Term::Ref(r) = &final_term {
            if let Some(id) = r.resolved.clone() {
                let uses = st.uses_left.get_mut(&id).map(|u| {
                    *u = u.saturating_sub(1);
                    *u
                });
                if moving {
                    if let Some(local) = st.owned.get(&id).cloned() {
                        if local.moved {
                            st.errors.push(use_after_move(r.origin, &local.name));
                        } else if uses.unwrap_or(0) > 0 {
                            // Still needed later: clone into the callee.
                            final_term = clone_call(&local, final_term, st);
                        } else if let Some(l) = st.owned.get_mut(&id) {
                            l.moved = true;
                        }
                    }
                }
            }
        }

        arg.terms.push(final_term);
        arg.type_spec = arg_ty;
        processed_args.push(arg);
    }

    // Rebuild the chain.
    let mut rebuilt = callee;
    for (arg, level) in processed_args.into_iter().zip(levels) {
        rebuilt = Term::App(Box::new(App {
            origin: level.origin,
            func: rebuilt,
            arg,
            type_spec: level.type_spec,
        }));
    }

    let result_owned = if contract.result_owned {
        rebuilt
            .type_spec()
            .and_then(|t| heap_struct_name(t, st.index))
    } else {
        None
    };

    if hoists.is_empty() {
        return (rebuilt, result_owned);
    }

    let result_ty = rebuilt.type_spec().cloned();
    let frees: Vec<Term> = hoists
        .iter()
        .map(|h| free_call(&h.local, &h.id, st.index))
        .collect();

    let mut core = if type_is_unit(result_ty.as_ref(), st.index) {
        let mut terms = vec![rebuilt];
        terms.extend(frees);
        let mut e = Expr::new(SourceOrigin::Synth, terms);
        e.type_spec = Some(TypeSpec::Unit);
        e
    } else {
        let bound = bind_result(rebuilt, result_ty.clone(), frees, st);
        let mut e = Expr::single(bound);
        e.type_spec = result_ty.clone();
        e
    };

    // Wrap each hoisted temporary in a synthetic let, innermost first.
    for hoist in hoists.into_iter().rev() {
        let mut param = FnParam::new(SourceOrigin::Synth, hoist.name, Some(hoist.local.ty_spec.clone()));
        param.id = Some(hoist.id);
        param.type_spec = Some(hoist.local.ty_spec.clone());
        let core_ty = core.type_spec.clone();
        let mut lambda = Lambda::new(SourceOrigin::Synth, vec![param], core);
        lambda.type_spec = core_ty.clone().map(|ret| {
            TypeSpec::Fn(Box::new(TypeFn::new(vec![hoist.local.ty_spec.clone()], ret)))
        });
        let wrapped = Term::App(Box::new(App {
            origin: SourceOrigin::Synth,
            func: Term::Lambda(Box::new(lambda)),
            arg: Expr::single(hoist.producer),
            type_spec: core_ty.clone(),
        }));
        let mut e = Expr::single(wrapped);
        e.type_spec = core_ty;
        core = e;
    }

    let Some(final_term) = core.terms.pop() else {
        unreachable!("compiler bug: hoist wrapper lost its term");
    };
    (final_term, result_owned)
}

/// Bind `result` to a fresh name, run `frees`, then yield the bound value.
fn bind_result(
    result: Term,
    result_ty: Option<TypeSpec>,
    frees: Vec<Term>,
    st: &mut St<'_>,
) -> Term {
    let (id, name) = st.fresh_result();
    let ty = result_ty.unwrap_or(TypeSpec::Unit);
    let mut param = FnParam::new(SourceOrigin::Synth, name.clone(), Some(ty.clone()));
    param.id = Some(id.clone());
    param.type_spec = Some(ty.clone());

    let mut res_ref = Ref::synth(name, id);
    res_ref.type_spec = Some(ty.clone());
    let mut terms = frees;
    terms.push(Term::Ref(res_ref));
    let mut body = Expr::new(SourceOrigin::Synth, terms);
    body.type_spec = Some(ty.clone());

    let mut lambda = Lambda::new(SourceOrigin::Synth, vec![param], body);
    lambda.type_spec = Some(TypeSpec::Fn(Box::new(TypeFn::new(
        vec![ty.clone()],
        ty.clone(),
    ))));
    Term::App(Box::new(App {
        origin: SourceOrigin::Synth,
        func: Term::Lambda(Box::new(lambda)),
        arg: Expr::single(result),
        type_spec: Some(ty),
    }))
}

struct Contract {
    params: Vec<ParamSig>,
    result_owned: bool,
}

fn callee_contract(callee: &Term, index: &ResolvablesIndex) -> Contract {
    match callee {
        Term::Ref(r) => {
            let resolvable = r.resolved.as_ref().and_then(|id| index.get(id));
            match resolvable {
                Some(res) => Contract {
                    params: res.params.clone(),
                    result_owned: result_owned_of(res),
                },
                None => Contract {
                    params: Vec::new(),
                    result_owned: false,
                },
            }
        }
        Term::Lambda(l) => Contract {
            params: l
                .params
                .iter()
                .map(|p| ParamSig {
                    name: p.name.clone(),
                    borrowed: p.borrowed,
                    type_spec: p.type_spec.clone(),
                })
                .collect(),
            result_owned: true,
        },
        _ => Contract {
            params: Vec::new(),
            result_owned: false,
        },
    }
}

fn result_owned_of(res: &Resolvable) -> bool {
    match &res.native {
        Some(native) => native.mem_effect() == mml_ir::MemEffect::Alloc,
        // User functions and struct constructors hand ownership of heap
        // results to the caller.
        None => matches!(
            res.kind,
            ResolvableKind::Fn
                | ResolvableKind::BinOp
                | ResolvableKind::UnaryOp
                | ResolvableKind::TypeStruct
        ),
    }
}

impl St<'_> {
    fn fresh_temp(&mut self) -> (ResolvableId, String) {
        let name = format!("__own{}", self.fresh);
        self.fresh += 1;
        let id = match self.owner {
            Some(owner) => owner.param(&name),
            None => ResolvableId::new(name.clone()),
        };
        (id, name)
    }

    fn fresh_result(&mut self) -> (ResolvableId, String) {
        let name = format!("__ret{}", self.fresh);
        self.fresh += 1;
        let id = match self.owner {
            Some(owner) => owner.param(&name),
            None => ResolvableId::new(name.clone()),
        };
        (id, name)
    }
}

fn free_call(local: &OwnedLocal, id: &ResolvableId, index: &ResolvablesIndex) -> Term {
    let free_name = format!("__free_{}", local.heap_ty);
    let free_ref = match index.named(&free_name).first() {
        Some(free_id) => Ref::synth(free_name, free_id.clone()),
        None => Ref::new(SourceOrigin::Synth, free_name),
    };
    let mut value_ref = Ref::synth(local.name.clone(), id.clone());
    value_ref.type_spec = Some(local.ty_spec.clone());
    Term::App(Box::new(App {
        origin: SourceOrigin::Synth,
        func: Term::Ref(free_ref),
        arg: Expr::single(Term::Ref(value_ref)),
        type_spec: Some(TypeSpec::Unit),
    }))
}

fn append_free(block: &mut Expr, local: &OwnedLocal, id: &ResolvableId, index: &ResolvablesIndex) {
    let free = free_call(local, id, index);
    // The free goes before the exit: insert ahead of the result term.
    let result = block.terms.pop();
    block.terms.push(free);
    if let Some(result) = result {
        // Unit results can trail the free; owned results must come last.
        block.terms.push(result);
    }
}

fn clone_call(local: &OwnedLocal, value: Term, st: &mut St<'_>) -> Term {
    let clone_name = format!("__clone_{}", local.heap_ty);
    let Some(clone_id) = st.index.named(&clone_name).first().cloned() else {
        st.errors.push(Diagnostic::error(
            ErrorCode::MissingClone,
            NAME,
            value.origin(),
            format!("`{}` is used again after being moved and no `{clone_name}` exists", local.name),
        ));
        return value;
    };
    let clone_ref = Ref::synth(clone_name, clone_id);
    Term::App(Box::new(App {
        origin: SourceOrigin::Synth,
        func: Term::Ref(clone_ref),
        arg: Expr::single(value),
        type_spec: Some(local.ty_spec.clone()),
    }))
}

fn use_after_move(origin: SourceOrigin, name: &str) -> Diagnostic {
    Diagnostic::error(
        ErrorCode::UseAfterMove,
        NAME,
        origin,
        format!("`{name}` was moved and cannot be used again"),
    )
}

// -- Type helpers --

fn canon<'a>(ty: &'a TypeSpec, index: &'a ResolvablesIndex) -> &'a TypeSpec {
    if let TypeSpec::Ref(r) = ty {
        if let Some(id) = &r.resolved {
            if let Some(res) = index.get(id) {
                if matches!(res.kind, ResolvableKind::TypeAlias | ResolvableKind::TypeDef) {
                    if let Some(spec) = &res.type_spec {
                        return canon(spec, index);
                    }
                }
            }
        }
    }
    ty
}

/// The heap struct name of a type, when values of it own heap memory the
/// runtime can free (a `__free_*` twin exists).
fn heap_struct_name(ty: &TypeSpec, index: &ResolvablesIndex) -> Option<String> {
    match canon(ty, index) {
        TypeSpec::NativeStruct(s) => {
            let has_pointer = s
                .fields
                .iter()
                .any(|(_, f)| matches!(canon(f, index), TypeSpec::NativePointer(_)));
            if has_pointer && !index.named(&format!("__free_{}", s.name)).is_empty() {
                Some(s.name.clone())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn type_is_unit(ty: Option<&TypeSpec>, index: &ResolvablesIndex) -> bool {
    match ty {
        Some(ty) => matches!(canon(ty, index), TypeSpec::Unit),
        None => true,
    }
}

fn count_uses(expr: &Expr, uses: &mut FxHashMap<ResolvableId, usize>) {
    for term in &expr.terms {
        count_term(term, uses);
    }
}

fn count_term(term: &Term, uses: &mut FxHashMap<ResolvableId, usize>) {
    match term {
        Term::Ref(r) => {
            if let Some(id) = &r.resolved {
                *uses.entry(id.clone()).or_insert(0) += 1;
            }
        }
        Term::App(a) => {
            count_term(&a.func, uses);
            count_uses(&a.arg, uses);
        }
        Term::Lambda(l) => count_uses(&l.body, uses),
        Term::Cond(c) => {
            count_uses(&c.cond, uses);
            count_uses(&c.if_true, uses);
            count_uses(&c.if_false, uses);
        }
        Term::Tuple(t) => {
            for e in &t.elems {
                count_uses(e, uses);
            }
        }
        Term::Group(g) => count_uses(&g.inner, uses),
        _ => {}
    }
}
