//! Phase 7: type checking.
//!
//! Two sub-phases. First, user ascriptions are lowered into `type_spec` on
//! parameters (a missing parameter annotation is `MissingParameterType`;
//! missing return types are left for inference). Second, a bidirectional
//! check walks every member body: applications are validated one argument
//! at a time against the curried function type, conditional guards must be
//! `Bool`, both branches must agree, and holes succeed only under an
//! expected type. `@native` bodies skip body checking — the declared
//! signature is authoritative.
//!
//! A binding whose right-hand side is an under-applied function is
//! eta-expanded into a synthetic lambda that forwards the captured and
//! fresh arguments, so the emitter only ever sees saturated calls.

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{
    App, Bnd, Expr, FnParam, Lambda, LambdaMeta, Member, Ref, ResolvableId, ResolvableKind,
    ResolvablesIndex, SourceOrigin, Term, TypeFn, TypeSpec,
};
use rustc_hash::FxHashMap;

use crate::PhaseState;

pub const NAME: &str = "mml_sem::phases::typecheck";

type Env = FxHashMap<ResolvableId, TypeSpec>;

struct Checker {
    index: ResolvablesIndex,
    errors: Vec<Diagnostic>,
}

pub fn run(mut state: PhaseState) -> PhaseState {
    // Sub-phase 1: lower ascriptions into parameter types.
    let mut errors = Vec::new();
    for member in &mut state.module.members {
        lower_ascriptions(member, &mut errors);
    }
    state.errors.append(&mut errors);
    state.reindex();

    // Sub-phase 2: check bodies in declaration order, so earlier members'
    // inferred signatures are available to later ones.
    let mut checker = Checker {
        index: state.index.clone(),
        errors: Vec::new(),
    };
    for member in &mut state.module.members {
        checker.check_member(member);
    }

    state.errors.append(&mut checker.errors);
    state.reindex();
    state
}

fn lower_ascriptions(member: &mut Member, errors: &mut Vec<Diagnostic>) {
    let params: Vec<&mut FnParam> = match member {
        Member::Bnd(bnd) => match bnd.lambda_mut() {
            Some(lambda) => lambda.params.iter_mut().collect(),
            None => Vec::new(),
        },
        Member::BinOp(op) => vec![&mut op.lhs, &mut op.rhs],
        Member::UnaryOp(op) => vec![&mut op.param],
        _ => Vec::new(),
    };
    for param in params {
        match &param.type_asc {
            Some(asc) => param.type_spec = Some(asc.clone()),
            None => errors.push(Diagnostic::error(
                ErrorCode::MissingParameterType,
                NAME,
                param.origin,
                format!("parameter `{}` needs a type annotation", param.name),
            )),
        }
    }
}

impl Checker {
    fn check_member(&mut self, member: &mut Member) {
        match member {
            Member::Bnd(bnd) => {
                if bnd.is_function() {
                    self.check_function(bnd);
                } else {
                    self.check_binding(bnd);
                }
            }
            Member::BinOp(op) => {
                let params = [op.lhs.clone(), op.rhs.clone()];
                let sig = self.check_callable(
                    op.id.as_ref(),
                    &params,
                    op.ret_asc.clone(),
                    &mut op.body,
                    op.origin,
                );
                op.type_spec = sig;
            }
            Member::UnaryOp(op) => {
                let params = [op.param.clone()];
                let sig = self.check_callable(
                    op.id.as_ref(),
                    &params,
                    op.ret_asc.clone(),
                    &mut op.body,
                    op.origin,
                );
                op.type_spec = sig;
            }
            _ => {}
        }
    }

    fn check_function(&mut self, bnd: &mut Bnd) {
        let id = bnd.id.clone();
        let Some(lambda) = bnd.lambda_mut() else { return };
        let params = lambda.params.clone();
        let ret_asc = lambda.ret_asc.clone();
        let origin = lambda.origin;

        let is_native = matches!(lambda.body.only_term(), Some(Term::Native(_)));
        let sig = if is_native {
            // The declared signature is authoritative; no body to check.
            self.signature_of(&params, ret_asc.as_ref())
        } else {
            self.check_callable(id.as_ref(), &params, ret_asc, &mut lambda.body, origin)
        };
        lambda.type_spec = sig.clone();
        bnd.type_spec = sig;
    }

    /// Shared body check for functions and operators. Returns the curried
    /// signature and records it in the index for later members.
    fn check_callable(
        &mut self,
        id: Option<&ResolvableId>,
        params: &[FnParam],
        ret_asc: Option<TypeSpec>,
        body: &mut Expr,
        origin: SourceOrigin,
    ) -> Option<TypeSpec> {
        let mut env = Env::default();
        for param in params {
            if let (Some(pid), Some(ty)) = (&param.id, &param.type_spec) {
                env.insert(pid.clone(), ty.clone());
            }
        }
        let body_ty = self.check_expr(body, ret_asc.as_ref(), &env);
        let ret = match (&ret_asc, body_ty) {
            (Some(asc), _) => asc.clone(),
            (None, Some(ty)) => ty,
            (None, None) => {
                self.errors.push(Diagnostic::error(
                    ErrorCode::TypeMismatch,
                    NAME,
                    origin,
                    "cannot infer the return type; add an annotation",
                ));
                return None;
            }
        };
        let sig = self.signature_of(params, Some(&ret))?;
        if let Some(id) = id {
            self.index.set_type_spec(id, sig.clone());
        }
        Some(sig)
    }

    fn signature_of(&self, params: &[FnParam], ret: Option<&TypeSpec>) -> Option<TypeSpec> {
        let ret = ret.cloned()?;
        if params.is_empty() {
            return Some(TypeSpec::Fn(Box::new(TypeFn::new(vec![TypeSpec::Unit], ret))));
        }
        let mut tys = Vec::with_capacity(params.len());
        for p in params {
            tys.push(p.type_spec.clone()?);
        }
        Some(TypeSpec::Fn(Box::new(TypeFn::new(tys, ret))))
    }

    /// `let x (: T)? = EXPR`. An RHS that still has a function type gets
    /// eta-expanded so the binding becomes a function definition.
    fn check_binding(&mut self, bnd: &mut Bnd) {
        let expected = bnd.type_asc.clone();
        let env = Env::default();
        let ty = self.check_expr(&mut bnd.value, expected.as_ref(), &env);
        let Some(ty) = ty else {
            bnd.type_spec = expected;
            return;
        };

        if let TypeSpec::Fn(remaining) = &self.canon(&ty) {
            if matches!(bnd.value.only_term(), Some(Term::Ref(_) | Term::App(_))) {
                self.eta_expand(bnd, remaining);
                bnd.type_spec = Some(ty.clone());
                if let Some(id) = &bnd.id {
                    self.index.set_type_spec(id, ty);
                }
                return;
            }
        }
        bnd.type_spec = Some(ty.clone());
        if let Some(id) = &bnd.id {
            self.index.set_type_spec(id, ty);
        }
    }

    /// Wrap an under-applied RHS in a lambda forwarding fresh parameters.
    fn eta_expand(&mut self, bnd: &mut Bnd, remaining: &TypeFn) {
        let Some(bnd_id) = bnd.id.clone() else { return };
        let Some(original) = bnd.value.only_term().cloned() else {
            return;
        };

        let mut params = Vec::with_capacity(remaining.params.len());
        let mut call = original;
        for (i, pty) in remaining.params.iter().enumerate() {
            let name = format!("p{i}");
            let pid = bnd_id.param(&name);
            let mut param = FnParam::new(SourceOrigin::Synth, name.clone(), Some(pty.clone()));
            param.id = Some(pid.clone());
            param.type_spec = Some(pty.clone());
            params.push(param);

            let mut arg_ref = Ref::synth(name, pid);
            arg_ref.type_spec = Some(pty.clone());
            call = Term::App(Box::new(App {
                origin: SourceOrigin::Synth,
                func: call,
                arg: Expr::single(Term::Ref(arg_ref)),
                type_spec: None,
            }));
        }

        let mut body = Expr::single(call);
        let env: Env = params
            .iter()
            .filter_map(|p| Some((p.id.clone()?, p.type_spec.clone()?)))
            .collect();
        self.check_expr(&mut body, Some(&remaining.ret.clone()), &env);

        let mut lambda = Lambda::new(SourceOrigin::Synth, params, body);
        lambda.ret_asc = Some(remaining.ret.clone());
        lambda.type_spec = Some(TypeSpec::Fn(Box::new(remaining.clone())));
        lambda.meta = Some(LambdaMeta {
            original_name: bnd.name.clone(),
            arity: remaining.params.len(),
        });
        bnd.value = Expr::single(Term::Lambda(Box::new(lambda)));
    }

    /// Check a block expression: terms in order, the last one carries the
    /// expected type and provides the block's type.
    fn check_expr(
        &mut self,
        expr: &mut Expr,
        expected: Option<&TypeSpec>,
        env: &Env,
    ) -> Option<TypeSpec> {
        let last = expr.terms.len().checked_sub(1)?;
        let mut ty = None;
        for (i, term) in expr.terms.iter_mut().enumerate() {
            let term_expected = if i == last { expected } else { None };
            ty = self.check_term(term, term_expected, env);
        }
        expr.type_spec = ty.clone();
        ty
    }

    fn check_term(
        &mut self,
        term: &mut Term,
        expected: Option<&TypeSpec>,
        env: &Env,
    ) -> Option<TypeSpec> {
        let ty = match term {
            Term::Int { type_spec, .. } => {
                *type_spec = Some(self.named_type("Int"));
                type_spec.clone()
            }
            Term::Float { type_spec, .. } => {
                *type_spec = Some(self.named_type("Double"));
                type_spec.clone()
            }
            Term::Str { type_spec, .. } => {
                *type_spec = Some(self.named_type("String"));
                type_spec.clone()
            }
            Term::Bool { type_spec, .. } => {
                *type_spec = Some(self.named_type("Bool"));
                type_spec.clone()
            }
            Term::Unit { .. } => Some(TypeSpec::Unit),
            Term::Ref(r) => self.check_ref(r, env),
            Term::App(_) => self.check_app(term, env),
            Term::Cond(c) => {
                // The guard checks against Bool via the expected type.
                let bool_ty = self.named_type("Bool");
                self.check_expr(&mut c.cond, Some(&bool_ty), env);
                let then_ty = self.check_expr(&mut c.if_true, expected, env);
                let else_ty = self.check_expr(&mut c.if_false, expected, env);
                if let (Some(t), Some(e)) = (&then_ty, &else_ty) {
                    if !self.types_equal(t, e) {
                        self.errors.push(Diagnostic::error(
                            ErrorCode::ConditionalBranchTypeMismatch,
                            NAME,
                            c.origin,
                            format!(
                                "conditional branches disagree: {} vs {}",
                                self.describe(t),
                                self.describe(e)
                            ),
                        ));
                    }
                }
                c.type_spec = then_ty.clone().or(else_ty);
                c.type_spec.clone()
            }
            Term::Hole(hole) => {
                match expected {
                    Some(ty) => hole.type_spec = Some(ty.clone()),
                    None => self.errors.push(Diagnostic::error(
                        ErrorCode::UntypedHoleInBinding,
                        NAME,
                        hole.origin,
                        "cannot type `???` without an expected type; add an annotation",
                    )),
                }
                hole.type_spec.clone()
            }
            Term::Lambda(l) => {
                let mut inner_env = env.clone();
                for param in &l.params {
                    if let (Some(pid), Some(ty)) = (&param.id, &param.type_spec) {
                        inner_env.insert(pid.clone(), ty.clone());
                    }
                }
                let ret_asc = l.ret_asc.clone();
                let body_ty = self.check_expr(&mut l.body, ret_asc.as_ref(), &inner_env);
                let ret = ret_asc.or(body_ty)?;
                let params: Vec<TypeSpec> = l
                    .params
                    .iter()
                    .map(|p| p.type_spec.clone().unwrap_or(TypeSpec::Unit))
                    .collect();
                let params = if params.is_empty() {
                    vec![TypeSpec::Unit]
                } else {
                    params
                };
                l.type_spec = Some(TypeSpec::Fn(Box::new(TypeFn::new(params, ret))));
                l.type_spec.clone()
            }
            Term::Tuple(t) => {
                let mut elem_tys = Vec::with_capacity(t.elems.len());
                for elem in &mut t.elems {
                    elem_tys.push(self.check_expr(elem, None, env).unwrap_or(TypeSpec::Unit));
                }
                t.type_spec = Some(TypeSpec::Tuple(elem_tys));
                t.type_spec.clone()
            }
            Term::Group(g) => self.check_expr(&mut g.inner, expected, env),
            Term::Placeholder { origin } => {
                self.errors.push(Diagnostic::error(
                    ErrorCode::TypeMismatch,
                    NAME,
                    *origin,
                    "`_` is not allowed here",
                ));
                None
            }
            // Opaque to the checker.
            Term::Native(_) | Term::Invalid(_) | Term::Error(_) => None,
        };

        if let (Some(actual), Some(expected)) = (&ty, expected) {
            if !self.types_equal(actual, expected) {
                self.report_mismatch(term.origin(), actual, expected);
            }
        }
        ty
    }

    fn check_ref(&mut self, r: &mut Ref, env: &Env) -> Option<TypeSpec> {
        // Field selection: the qualifier resolves to a struct-typed value
        // and this ref names one of its fields.
        if let Some(qualifier) = r.qualifier.as_deref_mut() {
            let owner_ty = self.check_ref(qualifier, env)?;
            let Some(fields) = self.struct_fields(&owner_ty) else {
                self.errors.push(Diagnostic::error(
                    ErrorCode::TypeMismatch,
                    NAME,
                    r.origin,
                    format!(
                        "`{}` has no fields; it is {}",
                        qualifier.name,
                        self.describe(&owner_ty)
                    ),
                ));
                return None;
            };
            let Some((_, field_ty)) = fields.iter().find(|(n, _)| n == &r.name) else {
                self.errors.push(Diagnostic::error(
                    ErrorCode::TypeMismatch,
                    NAME,
                    r.origin,
                    format!("no field `{}` on {}", r.name, self.describe(&owner_ty)),
                ));
                return None;
            };
            r.type_spec = Some(field_ty.clone());
            return r.type_spec.clone();
        }

        let id = r.resolved.clone()?;
        let ty = env
            .get(&id)
            .cloned()
            .or_else(|| self.index.get(&id).and_then(|res| res.type_spec.clone()));
        match ty {
            Some(ty) => {
                r.type_spec = Some(ty.clone());
                Some(ty)
            }
            None => {
                self.errors.push(Diagnostic::error(
                    ErrorCode::TypeMismatch,
                    NAME,
                    r.origin,
                    format!("cannot determine the type of `{}` here", r.name),
                ));
                None
            }
        }
    }

    /// Validate an application chain one argument at a time.
    fn check_app(&mut self, term: &mut Term, env: &Env) -> Option<TypeSpec> {
        let Term::App(app) = term else {
            unreachable!("compiler bug: check_app on a non-application");
        };
        let func_was_app = matches!(app.func, Term::App(_));
        let func_ty = match &mut app.func {
            Term::Ref(r) => self.check_ref(r, env),
            inner @ Term::App(_) => self.check_app(inner, env),
            inner @ Term::Lambda(_) => self.check_term(inner, None, env),
            other => {
                self.errors.push(Diagnostic::error(
                    ErrorCode::InvalidApplication,
                    NAME,
                    other.origin(),
                    "only functions and operators can be applied",
                ));
                None
            }
        }?;

        match self.canon(&func_ty) {
            TypeSpec::Fn(f) => {
                let param_ty = f.params.first().cloned().unwrap_or(TypeSpec::Unit);
                self.check_expr(&mut app.arg, Some(&param_ty), env);
                app.type_spec = Some(f.apply_one());
                app.type_spec.clone()
            }
            TypeSpec::Invalid(_) => None,
            _ => {
                let code = if func_was_app {
                    // The chain ran out of parameters.
                    ErrorCode::OversaturatedApplication
                } else {
                    ErrorCode::InvalidApplication
                };
                let message = if func_was_app {
                    "too many arguments for this function".to_string()
                } else {
                    format!("{} cannot be applied", self.describe(&func_ty))
                };
                self.errors
                    .push(Diagnostic::error(code, NAME, app.origin, message));
                None
            }
        }
    }

    fn report_mismatch(&mut self, origin: SourceOrigin, actual: &TypeSpec, expected: &TypeSpec) {
        let (code, message) = if actual.is_fn() && !expected.is_fn() {
            (
                ErrorCode::UndersaturatedApplication,
                format!(
                    "this function still expects arguments; expected {}",
                    self.describe(expected)
                ),
            )
        } else {
            (
                ErrorCode::TypeMismatch,
                format!(
                    "expected {}, found {}",
                    self.describe(expected),
                    self.describe(actual)
                ),
            )
        };
        self.errors
            .push(Diagnostic::error(code, NAME, origin, message));
    }

    // -- Type machinery --

    fn named_type(&self, name: &str) -> TypeSpec {
        let mut spec = TypeSpec::named(name);
        if let TypeSpec::Ref(r) = &mut spec {
            r.resolved = self.index.named(name).first().cloned();
        }
        spec
    }

    /// Chase references through aliases and native defs to a canonical
    /// structural form. Struct types stay nominal (by name).
    fn canon(&self, ty: &TypeSpec) -> TypeSpec {
        match ty {
            TypeSpec::Ref(r) => {
                let Some(id) = &r.resolved else {
                    return ty.clone();
                };
                let Some(resolvable) = self.index.get(id) else {
                    return ty.clone();
                };
                match (resolvable.kind, &resolvable.type_spec) {
                    (ResolvableKind::TypeAlias | ResolvableKind::TypeDef, Some(spec)) => {
                        self.canon(spec)
                    }
                    _ => ty.clone(),
                }
            }
            other => other.clone(),
        }
    }

    fn types_equal(&self, a: &TypeSpec, b: &TypeSpec) -> bool {
        let (ca, cb) = (self.canon(a), self.canon(b));
        match (&ca, &cb) {
            // Invalid types are opaque: no cascading mismatches.
            (TypeSpec::Invalid(_), _) | (_, TypeSpec::Invalid(_)) => true,
            (TypeSpec::NativePrimitive(x), TypeSpec::NativePrimitive(y)) => x == y,
            (TypeSpec::Unit, TypeSpec::Unit) => true,
            (TypeSpec::NativeStruct(x), TypeSpec::NativeStruct(y)) => x.name == y.name,
            (TypeSpec::NativePointer(x), TypeSpec::NativePointer(y)) => self.types_equal(x, y),
            (TypeSpec::Ref(x), TypeSpec::Ref(y)) => x.resolved == y.resolved,
            (TypeSpec::Fn(x), TypeSpec::Fn(y)) => {
                x.params.len() == y.params.len()
                    && x.params
                        .iter()
                        .zip(&y.params)
                        .all(|(p, q)| self.types_equal(p, q))
                    && self.types_equal(&x.ret, &y.ret)
            }
            (TypeSpec::Tuple(x), TypeSpec::Tuple(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(p, q)| self.types_equal(p, q))
            }
            _ => false,
        }
    }

    /// Fields of a struct-like type, for field selection.
    fn struct_fields(&self, ty: &TypeSpec) -> Option<Vec<(String, TypeSpec)>> {
        match self.canon(ty) {
            TypeSpec::NativeStruct(s) => Some(s.fields),
            TypeSpec::Ref(r) => {
                let id = r.resolved.as_ref()?;
                let resolvable = self.index.get(id)?;
                if resolvable.kind == ResolvableKind::TypeStruct {
                    Some(
                        resolvable
                            .params
                            .iter()
                            .filter_map(|p| Some((p.name.clone(), p.type_spec.clone()?)))
                            .collect(),
                    )
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn describe(&self, ty: &TypeSpec) -> String {
        match ty {
            TypeSpec::Ref(r) => format!("`{}`", r.name),
            TypeSpec::Unit => "`Unit`".to_string(),
            TypeSpec::NativePrimitive(p) => format!("`{p}`"),
            TypeSpec::NativeStruct(s) => format!("`{}`", s.name),
            TypeSpec::NativePointer(_) => "a pointer".to_string(),
            TypeSpec::Fn(f) => format!("a function of {} arguments", f.params.len()),
            TypeSpec::Tuple(elems) => format!("a {}-tuple", elems.len()),
            TypeSpec::Invalid(_) => "an invalid type".to_string(),
            _ => "this type".to_string(),
        }
    }
}
