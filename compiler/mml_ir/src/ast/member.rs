//! Module and member nodes.
//!
//! A source file is one module. Members are the closed set of top-level
//! declarations plus the error wrappers that keep malformed or duplicated
//! declarations in the tree without stopping the pipeline.

use std::fmt;

use crate::ast::term::{Expr, FnParam, Lambda, NativeImpl, Term};
use crate::ast::types::TypeSpec;
use crate::resolvable::ResolvableId;
use crate::span::SourceOrigin;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Visibility {
    Public,
    Protected,
    Lexical,
}

/// `#- ... -#` comment attached to the following member.
#[derive(Clone, PartialEq, Debug)]
pub struct DocComment {
    pub origin: SourceOrigin,
    pub text: String,
}

#[derive(Clone, PartialEq)]
pub struct Module {
    pub origin: SourceOrigin,
    pub name: String,
    pub visibility: Visibility,
    pub members: Vec<Member>,
    pub doc: Option<DocComment>,
}

impl Module {
    pub fn new(origin: SourceOrigin, name: impl Into<String>) -> Self {
        Module {
            origin,
            name: name.into(),
            visibility: Visibility::Public,
            members: Vec::new(),
            doc: None,
        }
    }

    /// Iterate members that declare a name (skips error wrappers).
    pub fn declarations(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.declared_name().is_some())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Module({}, {} members)", self.name, self.members.len())
    }
}

/// Associativity of an operator.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Assoc {
    Left,
    Right,
}

/// Value binding. Top-level functions are bindings whose value is a lambda.
#[derive(Clone, PartialEq, Debug)]
pub struct Bnd {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    pub value: Expr,
    pub type_spec: Option<TypeSpec>,
    pub type_asc: Option<TypeSpec>,
    pub doc: Option<DocComment>,
}

impl Bnd {
    /// The lambda this binding wraps, when it is a function definition.
    pub fn lambda(&self) -> Option<&Lambda> {
        match self.value.only_term() {
            Some(Term::Lambda(l)) => Some(l),
            _ => None,
        }
    }

    pub fn lambda_mut(&mut self) -> Option<&mut Lambda> {
        match self.value.terms.as_mut_slice() {
            [Term::Lambda(l)] => Some(l),
            _ => None,
        }
    }

    /// Native body, for `= @native[...]` declarations (directly or inside
    /// the function lambda).
    pub fn native(&self) -> Option<&NativeImpl> {
        match self.value.only_term() {
            Some(Term::Native(n)) => Some(n),
            Some(Term::Lambda(l)) => match l.body.only_term() {
                Some(Term::Native(n)) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        self.lambda().is_some()
    }
}

/// Native or opaque type declaration: `type Int64 = @native[t=i64];`.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeDef {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    pub type_spec: Option<TypeSpec>,
    pub doc: Option<DocComment>,
}

/// `type Int = Int64;` — a new name for an existing type.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeAlias {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    /// The aliased type as written (a `TypeRef` until resolution).
    pub type_ref: TypeSpec,
    /// The ultimate type at the end of the alias chain, set by resolution.
    pub type_spec: Option<TypeSpec>,
    pub doc: Option<DocComment>,
}

/// `type Point = { x: Int, y: Int };` — a user record type.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeStructDef {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    pub fields: Vec<(String, TypeSpec)>,
    pub doc: Option<DocComment>,
}

/// `op NAME (a: T, b: T) PREC ASSOC = EXPR;`
#[derive(Clone, PartialEq, Debug)]
pub struct BinOpDef {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    pub precedence: u8,
    pub assoc: Assoc,
    pub lhs: FnParam,
    pub rhs: FnParam,
    pub ret_asc: Option<TypeSpec>,
    pub type_spec: Option<TypeSpec>,
    pub body: Expr,
    pub doc: Option<DocComment>,
}

/// Unary operator. `Assoc::Right` declares a prefix operator, `Assoc::Left`
/// a postfix one.
#[derive(Clone, PartialEq, Debug)]
pub struct UnaryOpDef {
    pub origin: SourceOrigin,
    pub id: Option<ResolvableId>,
    pub name: String,
    pub precedence: u8,
    pub assoc: Assoc,
    pub param: FnParam,
    pub ret_asc: Option<TypeSpec>,
    pub type_spec: Option<TypeSpec>,
    pub body: Expr,
    pub doc: Option<DocComment>,
}

impl UnaryOpDef {
    pub fn is_prefix(&self) -> bool {
        self.assoc == Assoc::Right
    }
}

/// A declaration whose `(name, kind)` already exists. The first occurrence
/// survives unwrapped; later ones are wrapped here so the tree stays
/// navigable for tooling.
#[derive(Clone, PartialEq, Debug)]
pub struct DuplicateMember {
    pub origin: SourceOrigin,
    pub original: Box<Member>,
    pub first_origin: SourceOrigin,
}

/// A structurally present but semantically rejected declaration.
#[derive(Clone, PartialEq, Debug)]
pub struct InvalidMember {
    pub origin: SourceOrigin,
    pub original: Box<Member>,
    pub reason: String,
}

/// A member that failed to parse; carries the raw source that failed.
#[derive(Clone, PartialEq, Debug)]
pub struct MemberParseError {
    pub origin: SourceOrigin,
    pub message: String,
    pub failed_code: String,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Member {
    Bnd(Bnd),
    TypeDef(TypeDef),
    TypeAlias(TypeAlias),
    TypeStruct(TypeStructDef),
    BinOp(BinOpDef),
    UnaryOp(UnaryOpDef),
    Duplicate(DuplicateMember),
    Invalid(InvalidMember),
    ParseError(MemberParseError),
}

impl Member {
    pub fn origin(&self) -> SourceOrigin {
        match self {
            Member::Bnd(m) => m.origin,
            Member::TypeDef(m) => m.origin,
            Member::TypeAlias(m) => m.origin,
            Member::TypeStruct(m) => m.origin,
            Member::BinOp(m) => m.origin,
            Member::UnaryOp(m) => m.origin,
            Member::Duplicate(m) => m.origin,
            Member::Invalid(m) => m.origin,
            Member::ParseError(m) => m.origin,
        }
    }

    /// The declared name, or `None` for error wrappers.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Member::Bnd(m) => Some(&m.name),
            Member::TypeDef(m) => Some(&m.name),
            Member::TypeAlias(m) => Some(&m.name),
            Member::TypeStruct(m) => Some(&m.name),
            Member::BinOp(m) => Some(&m.name),
            Member::UnaryOp(m) => Some(&m.name),
            Member::Duplicate(_) | Member::Invalid(_) | Member::ParseError(_) => None,
        }
    }

    pub fn id(&self) -> Option<&ResolvableId> {
        match self {
            Member::Bnd(m) => m.id.as_ref(),
            Member::TypeDef(m) => m.id.as_ref(),
            Member::TypeAlias(m) => m.id.as_ref(),
            Member::TypeStruct(m) => m.id.as_ref(),
            Member::BinOp(m) => m.id.as_ref(),
            Member::UnaryOp(m) => m.id.as_ref(),
            Member::Duplicate(_) | Member::Invalid(_) | Member::ParseError(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Member::Duplicate(_) | Member::Invalid(_) | Member::ParseError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bnd(name: &str, value: Expr) -> Bnd {
        Bnd {
            origin: SourceOrigin::Synth,
            id: None,
            name: name.into(),
            value,
            type_spec: None,
            type_asc: None,
            doc: None,
        }
    }

    #[test]
    fn function_binding_detection() {
        let lam = Lambda::new(SourceOrigin::Synth, Vec::new(), Expr::single(Term::unit()));
        let f = bnd("main", Expr::single(Term::Lambda(Box::new(lam))));
        assert!(f.is_function());
        let v = bnd("x", Expr::single(Term::int(SourceOrigin::Synth, 1)));
        assert!(!v.is_function());
    }

    #[test]
    fn native_body_through_lambda() {
        let native = NativeImpl::new(SourceOrigin::Synth).with_attr("mem", "view");
        let lam = Lambda::new(
            SourceOrigin::Synth,
            vec![FnParam::new(SourceOrigin::Synth, "s", None)],
            Expr::single(Term::Native(native)),
        );
        let f = bnd("print", Expr::single(Term::Lambda(Box::new(lam))));
        assert!(f.native().is_some());
    }

    #[test]
    fn error_members_declare_nothing() {
        let err = Member::ParseError(MemberParseError {
            origin: SourceOrigin::Synth,
            message: "bad".into(),
            failed_code: "le x =".into(),
        });
        assert!(err.declared_name().is_none());
        assert!(err.is_error());
    }
}
