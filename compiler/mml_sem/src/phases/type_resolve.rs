//! Phase 3: type resolution.
//!
//! Three sub-passes:
//! (a) build the type map from all `TypeDef` / `TypeAlias` / `TypeStruct`
//!     declarations;
//! (b) resolve references *within* type definitions — struct fields, alias
//!     chains (transitively, with cycle detection);
//! (c) resolve references in member ascriptions, parameter types, and
//!     expression annotations.
//!
//! Unknown names become `TypeSpec::Invalid(original)`. An alias whose target
//! is invalid remains a referenceable named type.

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{
    Member, ResolvableId, SourceOrigin, Term, TypeSpec,
};
use rustc_hash::FxHashMap;

use crate::PhaseState;

pub const NAME: &str = "mml_sem::phases::type_resolve";

enum TypeTarget {
    /// A `TypeDef` with a concrete native spec (or opaque).
    Native(Option<TypeSpec>),
    /// A user struct; the ultimate spec is a reference to it.
    Struct,
    /// An alias pointing at another name.
    Alias(String),
}

struct Resolver {
    map: FxHashMap<String, (ResolvableId, TypeTarget)>,
    /// Memoized ultimate spec per alias name; `None` marks a detected cycle.
    ultimates: FxHashMap<String, Option<TypeSpec>>,
    errors: Vec<Diagnostic>,
}

pub fn run(mut state: PhaseState) -> PhaseState {
    // (a) The type map.
    let mut map = FxHashMap::default();
    for member in &state.module.members {
        let (name, id, target) = match member {
            Member::TypeDef(d) => match &d.id {
                Some(id) => (d.name.clone(), id.clone(), TypeTarget::Native(d.type_spec.clone())),
                None => continue,
            },
            Member::TypeStruct(s) => match &s.id {
                Some(id) => (s.name.clone(), id.clone(), TypeTarget::Struct),
                None => continue,
            },
            Member::TypeAlias(a) => match (&a.id, a.type_ref.ref_name()) {
                (Some(id), Some(target)) => {
                    (a.name.clone(), id.clone(), TypeTarget::Alias(target.to_string()))
                }
                (Some(id), None) => (a.name.clone(), id.clone(), TypeTarget::Native(None)),
                _ => continue,
            },
            _ => continue,
        };
        map.entry(name).or_insert((id, target));
    }

    let mut resolver = Resolver {
        map,
        ultimates: FxHashMap::default(),
        errors: Vec::new(),
    };

    // (b) Resolve within type declarations.
    let mut members = std::mem::take(&mut state.module.members);
    for member in &mut members {
        match member {
            Member::TypeAlias(alias) => {
                alias.type_ref = resolver.resolve(alias.type_ref.clone());
                let target = alias.type_ref.ref_name().map(str::to_string);
                alias.type_spec = match target {
                    Some(name) => match resolver.ultimate(&name, &mut Vec::new()) {
                        Some(spec) => Some(spec),
                        None => {
                            resolver.errors.push(Diagnostic::error(
                                ErrorCode::CyclicTypeAlias,
                                NAME,
                                alias.origin,
                                format!("type alias `{}` is cyclic", alias.name),
                            ));
                            Some(TypeSpec::Invalid(Box::new(alias.type_ref.clone())))
                        }
                    },
                    // Target already invalid; the alias stays referenceable.
                    None => Some(TypeSpec::Invalid(Box::new(alias.type_ref.clone()))),
                };
            }
            Member::TypeStruct(def) => {
                for (_, field_ty) in &mut def.fields {
                    *field_ty = resolver.resolve(field_ty.clone());
                }
            }
            Member::TypeDef(def) => {
                if let Some(spec) = def.type_spec.take() {
                    def.type_spec = Some(resolver.resolve(spec));
                }
            }
            _ => {}
        }
    }

    // (c) Resolve ascriptions everywhere else.
    for member in &mut members {
        match member {
            Member::Bnd(bnd) => {
                if let Some(asc) = bnd.type_asc.take() {
                    bnd.type_asc = Some(resolver.resolve(asc));
                }
                if let Some(lambda) = bnd.lambda_mut() {
                    for param in &mut lambda.params {
                        if let Some(asc) = param.type_asc.take() {
                            param.type_asc = Some(resolver.resolve(asc));
                        }
                    }
                    if let Some(ret) = lambda.ret_asc.take() {
                        lambda.ret_asc = Some(resolver.resolve(ret));
                    }
                    resolver.resolve_expr_ascriptions(&mut lambda.body);
                } else {
                    resolver.resolve_expr_ascriptions(&mut bnd.value);
                }
            }
            Member::BinOp(op) => {
                for param in [&mut op.lhs, &mut op.rhs] {
                    if let Some(asc) = param.type_asc.take() {
                        param.type_asc = Some(resolver.resolve(asc));
                    }
                }
                if let Some(ret) = op.ret_asc.take() {
                    op.ret_asc = Some(resolver.resolve(ret));
                }
                resolver.resolve_expr_ascriptions(&mut op.body);
            }
            Member::UnaryOp(op) => {
                if let Some(asc) = op.param.type_asc.take() {
                    op.param.type_asc = Some(resolver.resolve(asc));
                }
                if let Some(ret) = op.ret_asc.take() {
                    op.ret_asc = Some(resolver.resolve(ret));
                }
                resolver.resolve_expr_ascriptions(&mut op.body);
            }
            _ => {}
        }
    }

    state.module.members = members;
    state.errors.append(&mut resolver.errors);
    state.reindex();
    state
}

impl Resolver {
    /// Resolve every `TypeRef` inside a type spec; unknown names wrap as
    /// `Invalid`.
    fn resolve(&mut self, spec: TypeSpec) -> TypeSpec {
        match spec {
            TypeSpec::Ref(mut r) => match self.map.get(&r.name) {
                Some((id, _)) => {
                    r.resolved = Some(id.clone());
                    TypeSpec::Ref(r)
                }
                None => {
                    self.errors.push(Diagnostic::error(
                        ErrorCode::UndefinedTypeRef,
                        NAME,
                        r.origin,
                        format!("unknown type `{}`", r.name),
                    ));
                    TypeSpec::Invalid(Box::new(TypeSpec::Ref(r)))
                }
            },
            TypeSpec::NativePointer(elem) => {
                TypeSpec::NativePointer(Box::new(self.resolve(*elem)))
            }
            TypeSpec::NativeStruct(mut s) => {
                for (_, field_ty) in &mut s.fields {
                    *field_ty = self.resolve(field_ty.clone());
                }
                TypeSpec::NativeStruct(s)
            }
            TypeSpec::Fn(mut f) => {
                for p in &mut f.params {
                    *p = self.resolve(p.clone());
                }
                f.ret = self.resolve(f.ret.clone());
                TypeSpec::Fn(f)
            }
            TypeSpec::Tuple(elems) => {
                TypeSpec::Tuple(elems.into_iter().map(|e| self.resolve(e)).collect())
            }
            TypeSpec::Union(alts) => {
                TypeSpec::Union(alts.into_iter().map(|e| self.resolve(e)).collect())
            }
            TypeSpec::Intersection(alts) => {
                TypeSpec::Intersection(alts.into_iter().map(|e| self.resolve(e)).collect())
            }
            TypeSpec::Application(mut app) => {
                app.ctor = self.resolve(app.ctor.clone());
                for a in &mut app.args {
                    *a = self.resolve(a.clone());
                }
                TypeSpec::Application(app)
            }
            other @ (TypeSpec::NativePrimitive(_)
            | TypeSpec::Unit
            | TypeSpec::Variable(_)
            | TypeSpec::Invalid(_)) => other,
        }
    }

    /// Follow an alias chain to the ultimate type spec. `None` = cycle.
    fn ultimate(&mut self, name: &str, visiting: &mut Vec<String>) -> Option<TypeSpec> {
        if let Some(memo) = self.ultimates.get(name) {
            return memo.clone();
        }
        if visiting.iter().any(|n| n == name) {
            return None;
        }
        visiting.push(name.to_string());

        let result = match self.map.get(name) {
            Some((id, TypeTarget::Native(spec))) => {
                let spec = spec.clone();
                let id = id.clone();
                match spec {
                    Some(spec) => Some(self.resolve(spec)),
                    // Opaque native type: the ultimate spec is the reference.
                    None => Some(resolved_ref(name, id)),
                }
            }
            Some((id, TypeTarget::Struct)) => Some(resolved_ref(name, id.clone())),
            Some((_, TypeTarget::Alias(target))) => {
                let target = target.clone();
                self.ultimate(&target, visiting)
            }
            None => Some(TypeSpec::Invalid(Box::new(TypeSpec::named(name)))),
        };

        visiting.pop();
        self.ultimates.insert(name.to_string(), result.clone());
        result
    }

    /// Resolve the rare in-expression type ascriptions (`Ref.type_asc`).
    fn resolve_expr_ascriptions(&mut self, expr: &mut mml_ir::Expr) {
        for term in &mut expr.terms {
            self.resolve_term_ascriptions(term);
        }
    }

    fn resolve_term_ascriptions(&mut self, term: &mut Term) {
        match term {
            Term::Ref(r) => {
                if let Some(asc) = r.type_asc.take() {
                    r.type_asc = Some(self.resolve(asc));
                }
            }
            Term::App(a) => {
                self.resolve_term_ascriptions(&mut a.func);
                self.resolve_expr_ascriptions(&mut a.arg);
            }
            Term::Lambda(l) => {
                for param in &mut l.params {
                    if let Some(asc) = param.type_asc.take() {
                        param.type_asc = Some(self.resolve(asc));
                    }
                }
                if let Some(ret) = l.ret_asc.take() {
                    l.ret_asc = Some(self.resolve(ret));
                }
                self.resolve_expr_ascriptions(&mut l.body);
            }
            Term::Cond(c) => {
                self.resolve_expr_ascriptions(&mut c.cond);
                self.resolve_expr_ascriptions(&mut c.if_true);
                self.resolve_expr_ascriptions(&mut c.if_false);
            }
            Term::Tuple(t) => {
                for e in &mut t.elems {
                    self.resolve_expr_ascriptions(e);
                }
            }
            Term::Group(g) => self.resolve_expr_ascriptions(&mut g.inner),
            _ => {}
        }
    }
}

fn resolved_ref(name: &str, id: ResolvableId) -> TypeSpec {
    let mut spec = TypeSpec::named(name);
    if let TypeSpec::Ref(r) = &mut spec {
        r.resolved = Some(id);
        r.origin = SourceOrigin::Synth;
    }
    spec
}
