//! Expression and term nodes.
//!
//! The parser produces *flat* expressions: an [`Expr`] is an ordered sequence
//! of [`Term`]s with no precedence applied. The expression rewriter turns
//! that sequence into a single application tree; after simplification an
//! `Expr` at a block boundary (member body, lambda body, conditional branch)
//! may again hold several terms — the ownership analyzer appends cleanup
//! calls there, and the emitter evaluates terms in order, yielding the last.

use std::collections::BTreeMap;
use std::fmt;

use crate::ast::types::TypeSpec;
use crate::resolvable::ResolvableId;
use crate::span::SourceOrigin;

/// A flat sequence of terms.
#[derive(Clone, PartialEq)]
pub struct Expr {
    pub origin: SourceOrigin,
    pub terms: Vec<Term>,
    pub type_spec: Option<TypeSpec>,
}

impl Expr {
    pub fn new(origin: SourceOrigin, terms: Vec<Term>) -> Self {
        Expr {
            origin,
            terms,
            type_spec: None,
        }
    }

    /// Wrap a single term.
    pub fn single(term: Term) -> Self {
        Expr {
            origin: term.origin(),
            terms: vec![term],
            type_spec: None,
        }
    }

    /// The sole term, if this expression holds exactly one.
    pub fn only_term(&self) -> Option<&Term> {
        match self.terms.as_slice() {
            [t] => Some(t),
            _ => None,
        }
    }

    /// The result term of a block: the last one in sequence.
    pub fn result_term(&self) -> Option<&Term> {
        self.terms.last()
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.terms).finish()
    }
}

/// Reference to a resolvable (binding, function, operator, parameter, type
/// constructor) or, when `qualifier` is a value of struct type, a field
/// selection.
#[derive(Clone, PartialEq)]
pub struct Ref {
    pub origin: SourceOrigin,
    pub name: String,
    pub qualifier: Option<Box<Ref>>,
    /// All in-scope declarations matching `name`, filled by reference
    /// resolution; narrowed to one by the expression rewriter.
    pub candidates: Vec<ResolvableId>,
    pub resolved: Option<ResolvableId>,
    pub type_spec: Option<TypeSpec>,
    pub type_asc: Option<TypeSpec>,
}

impl Ref {
    pub fn new(origin: SourceOrigin, name: impl Into<String>) -> Self {
        Ref {
            origin,
            name: name.into(),
            qualifier: None,
            candidates: Vec::new(),
            resolved: None,
            type_spec: None,
            type_asc: None,
        }
    }

    /// Synthetic reference already pinned to a resolvable.
    pub fn synth(name: impl Into<String>, resolved: ResolvableId) -> Self {
        let mut r = Ref::new(SourceOrigin::Synth, name);
        r.candidates = vec![resolved.clone()];
        r.resolved = Some(resolved);
        r
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(q) = &self.qualifier {
            write!(f, "Ref({:?}.{})", q, self.name)
        } else {
            write!(f, "Ref({})", self.name)
        }
    }
}

/// Single-argument application. `func` is constrained to `Ref | App | Lambda`
/// after rewriting; violating that is a compiler bug, not a user error.
#[derive(Clone, PartialEq, Debug)]
pub struct App {
    pub origin: SourceOrigin,
    pub func: Term,
    pub arg: Expr,
    pub type_spec: Option<TypeSpec>,
}

impl App {
    pub fn new(origin: SourceOrigin, func: Term, arg: Expr) -> Self {
        App {
            origin,
            func,
            arg,
            type_spec: None,
        }
    }
}

/// Function parameter. `borrowed` marks a `&name: T` declaration, which
/// leaves ownership of heap arguments with the caller.
#[derive(Clone, PartialEq, Debug)]
pub struct FnParam {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    pub type_asc: Option<TypeSpec>,
    pub type_spec: Option<TypeSpec>,
    pub borrowed: bool,
}

impl FnParam {
    pub fn new(origin: SourceOrigin, name: impl Into<String>, type_asc: Option<TypeSpec>) -> Self {
        FnParam {
            origin,
            id: None,
            name: name.into(),
            type_asc,
            type_spec: None,
            borrowed: false,
        }
    }
}

/// Record attached to eta-expanded lambdas so the emitter can name the
/// function after the binding it implements.
#[derive(Clone, PartialEq, Debug)]
pub struct LambdaMeta {
    pub original_name: String,
    pub arity: usize,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Lambda {
    pub origin: SourceOrigin,
    pub params: Vec<FnParam>,
    pub body: Expr,
    pub ret_asc: Option<TypeSpec>,
    pub type_spec: Option<TypeSpec>,
    pub meta: Option<LambdaMeta>,
}

impl Lambda {
    pub fn new(origin: SourceOrigin, params: Vec<FnParam>, body: Expr) -> Self {
        Lambda {
            origin,
            params,
            body,
            ret_asc: None,
            type_spec: None,
            meta: None,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Cond {
    pub origin: SourceOrigin,
    pub cond: Expr,
    pub if_true: Expr,
    pub if_false: Expr,
    pub type_spec: Option<TypeSpec>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct TupleTerm {
    pub origin: SourceOrigin,
    pub elems: Vec<Expr>,
    pub type_spec: Option<TypeSpec>,
}

/// Parenthesized expression. Stripped by the simplifier once precedence has
/// been applied.
#[derive(Clone, PartialEq, Debug)]
pub struct TermGroup {
    pub origin: SourceOrigin,
    pub inner: Expr,
}

/// `???` — typed abort.
#[derive(Clone, PartialEq, Debug)]
pub struct Hole {
    pub origin: SourceOrigin,
    pub type_spec: Option<TypeSpec>,
}

/// Memory effect a native declares for its result.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum MemEffect {
    /// Returns a fresh owned heap value.
    Alloc,
    /// Returns a borrowed view; caller must not free.
    View,
    /// No heap interaction.
    #[default]
    Pure,
}

/// Body of an `@native[...]` declaration.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct NativeImpl {
    pub origin: SourceOrigin,
    pub attrs: BTreeMap<String, String>,
}

impl NativeImpl {
    pub fn new(origin: SourceOrigin) -> Self {
        NativeImpl {
            origin,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn mem_effect(&self) -> MemEffect {
        match self.attr("mem") {
            Some("alloc") => MemEffect::Alloc,
            Some("view") => MemEffect::View,
            _ => MemEffect::Pure,
        }
    }

    /// Native operator selector (`op=` attribute), e.g. `add`, `icmp_slt`.
    pub fn selector(&self) -> Option<&str> {
        self.attr("op")
    }

    /// Inline IR template (`tpl=` attribute).
    pub fn template(&self) -> Option<&str> {
        self.attr("tpl")
    }

    /// Underlying LLVM type (`t=` attribute) for native type declarations.
    pub fn llvm_type(&self) -> Option<&str> {
        self.attr("t")
    }
}

/// An expression the pipeline could not make sense of; later phases treat it
/// as opaque and emit no further errors for it.
#[derive(Clone, PartialEq, Debug)]
pub struct InvalidExpression {
    pub origin: SourceOrigin,
    pub original: Expr,
}

/// A term-level parse failure with the raw source that failed.
#[derive(Clone, PartialEq, Debug)]
pub struct TermError {
    pub origin: SourceOrigin,
    pub message: String,
    pub failed_code: String,
}

/// The closed set of term forms.
#[derive(Clone, PartialEq)]
pub enum Term {
    Int {
        origin: SourceOrigin,
        value: i64,
        type_spec: Option<TypeSpec>,
    },
    Float {
        origin: SourceOrigin,
        value: f64,
        type_spec: Option<TypeSpec>,
    },
    /// Raw string contents (escapes are materialized at code-gen time).
    Str {
        origin: SourceOrigin,
        value: String,
        type_spec: Option<TypeSpec>,
    },
    Bool {
        origin: SourceOrigin,
        value: bool,
        type_spec: Option<TypeSpec>,
    },
    Unit {
        origin: SourceOrigin,
    },
    Ref(Ref),
    App(Box<App>),
    Lambda(Box<Lambda>),
    Cond(Box<Cond>),
    Tuple(TupleTerm),
    Group(Box<TermGroup>),
    Hole(Hole),
    Placeholder {
        origin: SourceOrigin,
    },
    Native(NativeImpl),
    Invalid(Box<InvalidExpression>),
    Error(TermError),
}

impl Term {
    pub fn int(origin: SourceOrigin, value: i64) -> Term {
        Term::Int {
            origin,
            value,
            type_spec: None,
        }
    }

    pub fn unit() -> Term {
        Term::Unit {
            origin: SourceOrigin::Synth,
        }
    }

    pub fn origin(&self) -> SourceOrigin {
        match self {
            Term::Int { origin, .. }
            | Term::Float { origin, .. }
            | Term::Str { origin, .. }
            | Term::Bool { origin, .. }
            | Term::Unit { origin }
            | Term::Placeholder { origin } => *origin,
            Term::Ref(r) => r.origin,
            Term::App(a) => a.origin,
            Term::Lambda(l) => l.origin,
            Term::Cond(c) => c.origin,
            Term::Tuple(t) => t.origin,
            Term::Group(g) => g.origin,
            Term::Hole(h) => h.origin,
            Term::Native(n) => n.origin,
            Term::Invalid(i) => i.origin,
            Term::Error(e) => e.origin,
        }
    }

    pub fn type_spec(&self) -> Option<&TypeSpec> {
        match self {
            Term::Int { type_spec, .. }
            | Term::Float { type_spec, .. }
            | Term::Str { type_spec, .. }
            | Term::Bool { type_spec, .. } => type_spec.as_ref(),
            Term::Unit { .. } => None,
            Term::Ref(r) => r.type_spec.as_ref(),
            Term::App(a) => a.type_spec.as_ref(),
            Term::Lambda(l) => l.type_spec.as_ref(),
            Term::Cond(c) => c.type_spec.as_ref(),
            Term::Tuple(t) => t.type_spec.as_ref(),
            Term::Group(g) => g.inner.type_spec.as_ref(),
            Term::Hole(h) => h.type_spec.as_ref(),
            Term::Placeholder { .. } | Term::Native(_) | Term::Invalid(_) | Term::Error(_) => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Term::Invalid(_) | Term::Error(_))
    }

    /// Valid in function position of an `App` after rewriting.
    pub fn is_applicable(&self) -> bool {
        matches!(self, Term::Ref(_) | Term::App(_) | Term::Lambda(_))
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Int { value, .. } => write!(f, "Int({value})"),
            Term::Float { value, .. } => write!(f, "Float({value})"),
            Term::Str { value, .. } => write!(f, "Str({value:?})"),
            Term::Bool { value, .. } => write!(f, "Bool({value})"),
            Term::Unit { .. } => write!(f, "Unit"),
            Term::Ref(r) => write!(f, "{r:?}"),
            Term::App(a) => write!(f, "App({:?}, {:?})", a.func, a.arg),
            Term::Lambda(l) => {
                let names: Vec<&str> = l.params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "Lambda({names:?}, {:?})", l.body)
            }
            Term::Cond(c) => write!(f, "Cond({:?}, {:?}, {:?})", c.cond, c.if_true, c.if_false),
            Term::Tuple(t) => write!(f, "Tuple({:?})", t.elems),
            Term::Group(g) => write!(f, "Group({:?})", g.inner),
            Term::Hole(_) => write!(f, "Hole"),
            Term::Placeholder { .. } => write!(f, "Placeholder"),
            Term::Native(n) => write!(f, "Native({:?})", n.attrs),
            Term::Invalid(i) => write!(f, "InvalidExpression({:?})", i.original),
            Term::Error(e) => write!(f, "TermError({})", e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_chain_shape() {
        // f a b  ==  App(App(f, a), b)
        let f = Term::Ref(Ref::new(SourceOrigin::Synth, "f"));
        let a = Term::int(SourceOrigin::Synth, 1);
        let b = Term::int(SourceOrigin::Synth, 2);
        let inner = Term::App(Box::new(App::new(
            SourceOrigin::Synth,
            f,
            Expr::single(a),
        )));
        assert!(inner.is_applicable());
        let outer = App::new(SourceOrigin::Synth, inner, Expr::single(b));
        assert!(outer.func.is_applicable());
    }

    #[test]
    fn literal_not_applicable() {
        assert!(!Term::int(SourceOrigin::Synth, 3).is_applicable());
        assert!(!Term::unit().is_applicable());
    }

    #[test]
    fn native_impl_attrs() {
        let n = NativeImpl::new(SourceOrigin::Synth)
            .with_attr("mem", "alloc")
            .with_attr("op", "add")
            .with_attr("tpl", "%r = add %type %operand1, %operand2");
        assert_eq!(n.mem_effect(), MemEffect::Alloc);
        assert_eq!(n.selector(), Some("add"));
        assert!(n.template().unwrap().contains("%operand1"));
        assert_eq!(NativeImpl::new(SourceOrigin::Synth).mem_effect(), MemEffect::Pure);
    }

    #[test]
    fn expr_only_term() {
        let e = Expr::single(Term::unit());
        assert!(e.only_term().is_some());
        let e2 = Expr::new(SourceOrigin::Synth, vec![Term::unit(), Term::unit()]);
        assert!(e2.only_term().is_none());
        assert!(e2.result_term().is_some());
    }
}
