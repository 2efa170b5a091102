//! Stable ids for reference targets and the out-of-band lookup index.
//!
//! AST nodes never hold pointers to each other. A `Ref` records the
//! [`ResolvableId`] of its target and the [`ResolvablesIndex`] maps ids back
//! to a snapshot of the declaration. The index is cheap to rebuild and is
//! reconstructed after every phase that creates or replaces members.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ast::member::{Assoc, Member, Module};
use crate::ast::term::{FnParam, NativeImpl};
use crate::ast::types::{TypeFn, TypeSpec};
use crate::span::SourceOrigin;

/// Stable identifier, unique within a module.
///
/// Shape: `Module::name#kind` for members, `{member}/name` for parameters.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ResolvableId(String);

impl ResolvableId {
    pub fn new(id: impl Into<String>) -> Self {
        ResolvableId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id for a parameter of the member with this id.
    pub fn param(&self, name: &str) -> ResolvableId {
        ResolvableId(format!("{}/{}", self.0, name))
    }
}

impl fmt::Debug for ResolvableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ResolvableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declaration kind, the grouping key for duplicate-name checking.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ResolvableKind {
    Bnd,
    Fn,
    BinOp,
    UnaryOp,
    TypeDef,
    TypeAlias,
    TypeStruct,
    Param,
}

impl ResolvableKind {
    pub fn tag(self) -> &'static str {
        match self {
            ResolvableKind::Bnd => "bnd",
            ResolvableKind::Fn => "fn",
            ResolvableKind::BinOp => "bin",
            ResolvableKind::UnaryOp => "unary",
            ResolvableKind::TypeDef => "typedef",
            ResolvableKind::TypeAlias => "typealias",
            ResolvableKind::TypeStruct => "typestruct",
            ResolvableKind::Param => "param",
        }
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            ResolvableKind::TypeDef | ResolvableKind::TypeAlias | ResolvableKind::TypeStruct
        )
    }

    pub fn is_operator(self) -> bool {
        matches!(self, ResolvableKind::BinOp | ResolvableKind::UnaryOp)
    }
}

/// Signature of one callee parameter, as the ownership analyzer and type
/// checker need it.
#[derive(Clone, PartialEq, Debug)]
pub struct ParamSig {
    pub name: String,
    pub borrowed: bool,
    pub type_spec: Option<TypeSpec>,
}

impl ParamSig {
    fn of(param: &FnParam) -> ParamSig {
        ParamSig {
            name: param.name.clone(),
            borrowed: param.borrowed,
            type_spec: param.type_spec.clone().or_else(|| param.type_asc.clone()),
        }
    }
}

/// Snapshot of a declaration, keyed by id.
#[derive(Clone, PartialEq, Debug)]
pub struct Resolvable {
    pub id: ResolvableId,
    pub name: String,
    pub kind: ResolvableKind,
    pub origin: SourceOrigin,
    /// Full signature: `TypeFn` for functions/operators/constructors, the
    /// (ascribed or computed) type for bindings, the resolved type for type
    /// declarations.
    pub type_spec: Option<TypeSpec>,
    pub arity: usize,
    pub precedence: Option<u8>,
    pub assoc: Option<Assoc>,
    pub native: Option<NativeImpl>,
    pub params: Vec<ParamSig>,
}

impl Resolvable {
    pub fn is_operator(&self) -> bool {
        self.kind.is_operator()
    }

    pub fn is_prefix_unary(&self) -> bool {
        self.kind == ResolvableKind::UnaryOp && self.assoc == Some(Assoc::Right)
    }

    pub fn is_postfix_unary(&self) -> bool {
        self.kind == ResolvableKind::UnaryOp && self.assoc == Some(Assoc::Left)
    }

    /// Return type of the signature, when it is a function type.
    pub fn return_type(&self) -> Option<&TypeSpec> {
        self.type_spec.as_ref().and_then(|t| t.as_fn()).map(|f| &f.ret)
    }
}

/// Id-to-declaration lookup, rebuilt after each rewriting phase.
#[derive(Clone, Default, Debug)]
pub struct ResolvablesIndex {
    by_id: FxHashMap<ResolvableId, Resolvable>,
    by_name: FxHashMap<String, Vec<ResolvableId>>,
}

impl ResolvablesIndex {
    /// Extract every member and parameter declaration from the module.
    /// Members without assigned ids are skipped; run [`assign_ids`] first.
    pub fn build(module: &Module) -> Self {
        let mut index = ResolvablesIndex::default();
        for member in &module.members {
            match member {
                Member::Bnd(bnd) => {
                    let Some(id) = bnd.id.clone() else { continue };
                    if let Some(lambda) = bnd.lambda() {
                        let params: Vec<ParamSig> = lambda.params.iter().map(ParamSig::of).collect();
                        let sig = function_sig(&params, lambda.ret_asc.as_ref());
                        for param in &lambda.params {
                            index.insert_param(param);
                        }
                        index.insert(Resolvable {
                            id,
                            name: bnd.name.clone(),
                            kind: ResolvableKind::Fn,
                            origin: bnd.origin,
                            type_spec: sig,
                            arity: lambda.params.len().max(1),
                            precedence: None,
                            assoc: None,
                            native: bnd.native().cloned(),
                            params,
                        });
                    } else {
                        index.insert(Resolvable {
                            id,
                            name: bnd.name.clone(),
                            kind: ResolvableKind::Bnd,
                            origin: bnd.origin,
                            type_spec: bnd
                                .type_spec
                                .clone()
                                .or_else(|| bnd.type_asc.clone()),
                            arity: 0,
                            precedence: None,
                            assoc: None,
                            native: bnd.native().cloned(),
                            params: Vec::new(),
                        });
                    }
                }
                Member::BinOp(op) => {
                    let Some(id) = op.id.clone() else { continue };
                    let params = vec![ParamSig::of(&op.lhs), ParamSig::of(&op.rhs)];
                    let sig = function_sig(&params, op.ret_asc.as_ref());
                    index.insert_param(&op.lhs);
                    index.insert_param(&op.rhs);
                    index.insert(Resolvable {
                        id,
                        name: op.name.clone(),
                        kind: ResolvableKind::BinOp,
                        origin: op.origin,
                        type_spec: sig,
                        arity: 2,
                        precedence: Some(op.precedence),
                        assoc: Some(op.assoc),
                        native: native_of(&op.body),
                        params,
                    });
                }
                Member::UnaryOp(op) => {
                    let Some(id) = op.id.clone() else { continue };
                    let params = vec![ParamSig::of(&op.param)];
                    let sig = function_sig(&params, op.ret_asc.as_ref());
                    index.insert_param(&op.param);
                    index.insert(Resolvable {
                        id,
                        name: op.name.clone(),
                        kind: ResolvableKind::UnaryOp,
                        origin: op.origin,
                        type_spec: sig,
                        arity: 1,
                        precedence: Some(op.precedence),
                        assoc: Some(op.assoc),
                        native: native_of(&op.body),
                        params,
                    });
                }
                Member::TypeDef(def) => {
                    let Some(id) = def.id.clone() else { continue };
                    index.insert(Resolvable {
                        id,
                        name: def.name.clone(),
                        kind: ResolvableKind::TypeDef,
                        origin: def.origin,
                        type_spec: def.type_spec.clone(),
                        arity: 0,
                        precedence: None,
                        assoc: None,
                        native: None,
                        params: Vec::new(),
                    });
                }
                Member::TypeAlias(alias) => {
                    let Some(id) = alias.id.clone() else { continue };
                    index.insert(Resolvable {
                        id,
                        name: alias.name.clone(),
                        kind: ResolvableKind::TypeAlias,
                        origin: alias.origin,
                        type_spec: alias.type_spec.clone(),
                        arity: 0,
                        precedence: None,
                        assoc: None,
                        native: None,
                        params: Vec::new(),
                    });
                }
                Member::TypeStruct(def) => {
                    let Some(id) = def.id.clone() else { continue };
                    // A struct type doubles as its constructor.
                    let params: Vec<ParamSig> = def
                        .fields
                        .iter()
                        .map(|(name, ty)| ParamSig {
                            name: name.clone(),
                            borrowed: false,
                            type_spec: Some(ty.clone()),
                        })
                        .collect();
                    let mut ctor = TypeSpec::named(&def.name);
                    if let TypeSpec::Ref(r) = &mut ctor {
                        r.resolved = Some(id.clone());
                    }
                    let sig = TypeSpec::Fn(Box::new(TypeFn::new(
                        def.fields.iter().map(|(_, t)| t.clone()).collect(),
                        ctor,
                    )));
                    index.insert(Resolvable {
                        id,
                        name: def.name.clone(),
                        kind: ResolvableKind::TypeStruct,
                        origin: def.origin,
                        type_spec: Some(sig),
                        arity: def.fields.len(),
                        precedence: None,
                        assoc: None,
                        native: None,
                        params,
                    });
                }
                Member::Duplicate(_) | Member::Invalid(_) | Member::ParseError(_) => {}
            }
        }
        index
    }

    fn insert(&mut self, resolvable: Resolvable) {
        self.by_name
            .entry(resolvable.name.clone())
            .or_default()
            .push(resolvable.id.clone());
        self.by_id.insert(resolvable.id.clone(), resolvable);
    }

    fn insert_param(&mut self, param: &FnParam) {
        let Some(id) = param.id.clone() else { return };
        self.by_id.insert(
            id.clone(),
            Resolvable {
                id,
                name: param.name.clone(),
                kind: ResolvableKind::Param,
                origin: param.origin,
                type_spec: param.type_spec.clone().or_else(|| param.type_asc.clone()),
                arity: 0,
                precedence: None,
                assoc: None,
                native: None,
                params: Vec::new(),
            },
        );
    }

    /// Register a synthetic resolvable (eta parameters, ownership temps).
    pub fn insert_synthetic(&mut self, resolvable: Resolvable) {
        self.insert(resolvable);
    }

    /// Update a signature as the type checker infers it.
    pub fn set_type_spec(&mut self, id: &ResolvableId, spec: TypeSpec) {
        if let Some(resolvable) = self.by_id.get_mut(id) {
            resolvable.type_spec = Some(spec);
        }
    }

    pub fn get(&self, id: &ResolvableId) -> Option<&Resolvable> {
        self.by_id.get(id)
    }

    /// Module-level declarations with this name, in declaration order.
    pub fn named(&self, name: &str) -> &[ResolvableId] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resolvable> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn function_sig(params: &[ParamSig], ret: Option<&TypeSpec>) -> Option<TypeSpec> {
    let ret = ret.cloned()?;
    if params.is_empty() {
        // Nullary functions are applied to the unit literal.
        return Some(TypeSpec::Fn(Box::new(TypeFn::new(vec![TypeSpec::Unit], ret))));
    }
    let mut tys = Vec::with_capacity(params.len());
    for p in params {
        tys.push(p.type_spec.clone()?);
    }
    Some(TypeSpec::Fn(Box::new(TypeFn::new(tys, ret))))
}

fn native_of(body: &crate::ast::term::Expr) -> Option<NativeImpl> {
    match body.only_term() {
        Some(crate::ast::term::Term::Native(n)) => Some(n.clone()),
        _ => None,
    }
}

/// Assign stable ids to every declaring member and its parameters.
///
/// Deterministic in declaration order, so re-running on an unchanged module
/// yields identical ids. Ids already present are overwritten with the same
/// value; duplicates within a `(name, kind)` group get an `@N` disambiguator
/// until the duplicate checker wraps them.
pub fn assign_ids(module: &mut Module) {
    let mut seen: FxHashMap<String, u32> = FxHashMap::default();
    let module_name = module.name.clone();
    for member in &mut module.members {
        let (name, kind) = match member {
            Member::Bnd(bnd) => (
                bnd.name.clone(),
                if bnd.is_function() {
                    ResolvableKind::Fn
                } else {
                    ResolvableKind::Bnd
                },
            ),
            Member::TypeDef(d) => (d.name.clone(), ResolvableKind::TypeDef),
            Member::TypeAlias(a) => (a.name.clone(), ResolvableKind::TypeAlias),
            Member::TypeStruct(s) => (s.name.clone(), ResolvableKind::TypeStruct),
            Member::BinOp(o) => (o.name.clone(), ResolvableKind::BinOp),
            Member::UnaryOp(o) => (o.name.clone(), ResolvableKind::UnaryOp),
            Member::Duplicate(_) | Member::Invalid(_) | Member::ParseError(_) => continue,
        };
        let base = format!("{module_name}::{name}#{}", kind.tag());
        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let id = if *count == 1 {
            ResolvableId::new(base)
        } else {
            ResolvableId::new(format!("{base}@{count}"))
        };
        set_member_id(member, &id);
    }
}

fn set_member_id(member: &mut Member, id: &ResolvableId) {
    match member {
        Member::Bnd(bnd) => {
            bnd.id = Some(id.clone());
            if let Some(lambda) = bnd.lambda_mut() {
                for param in &mut lambda.params {
                    param.id = Some(id.param(&param.name));
                }
            }
        }
        Member::TypeDef(d) => d.id = Some(id.clone()),
        Member::TypeAlias(a) => a.id = Some(id.clone()),
        Member::TypeStruct(s) => s.id = Some(id.clone()),
        Member::BinOp(o) => {
            o.id = Some(id.clone());
            o.lhs.id = Some(id.param(&o.lhs.name));
            o.rhs.id = Some(id.param(&o.rhs.name));
        }
        Member::UnaryOp(o) => {
            o.id = Some(id.clone());
            o.param.id = Some(id.param(&o.param.name));
        }
        Member::Duplicate(_) | Member::Invalid(_) | Member::ParseError(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::term::{Expr, Lambda, Term};

    fn module_with_fn(name: &str) -> Module {
        let mut module = Module::new(SourceOrigin::Synth, "Test");
        let lambda = Lambda::new(
            SourceOrigin::Synth,
            vec![FnParam::new(
                SourceOrigin::Synth,
                "x",
                Some(TypeSpec::named("Int")),
            )],
            Expr::single(Term::unit()),
        );
        module.members.push(Member::Bnd(crate::ast::member::Bnd {
            origin: SourceOrigin::Synth,
            id: None,
            name: name.into(),
            value: Expr::single(Term::Lambda(Box::new(lambda))),
            type_spec: None,
            type_asc: None,
            doc: None,
        }));
        module
    }

    #[test]
    fn ids_are_stable_across_runs() {
        let mut a = module_with_fn("foo");
        let mut b = module_with_fn("foo");
        assign_ids(&mut a);
        assign_ids(&mut b);
        assert_eq!(a.members[0].id(), b.members[0].id());
        assert_eq!(a.members[0].id().unwrap().as_str(), "Test::foo#fn");
        // Re-running does not change anything.
        let before = a.clone();
        assign_ids(&mut a);
        assert_eq!(a, before);
    }

    #[test]
    fn duplicate_names_get_disambiguators() {
        let mut module = module_with_fn("foo");
        let extra = module.members[0].clone();
        module.members.push(extra);
        assign_ids(&mut module);
        assert_eq!(module.members[0].id().unwrap().as_str(), "Test::foo#fn");
        assert_eq!(module.members[1].id().unwrap().as_str(), "Test::foo#fn@2");
    }

    #[test]
    fn index_exposes_params_and_arity() {
        let mut module = module_with_fn("foo");
        assign_ids(&mut module);
        let index = ResolvablesIndex::build(&module);
        let ids = index.named("foo");
        assert_eq!(ids.len(), 1);
        let resolvable = index.get(&ids[0]).unwrap();
        assert_eq!(resolvable.kind, ResolvableKind::Fn);
        assert_eq!(resolvable.arity, 1);
        assert_eq!(resolvable.params[0].name, "x");
        // The parameter itself is addressable.
        let param_id = ids[0].param("x");
        assert_eq!(index.get(&param_id).unwrap().kind, ResolvableKind::Param);
    }
}
