//! AST, spans, and resolvable index for the MinnieML compiler.
//!
//! This crate is the vocabulary every other compiler crate speaks: source
//! locations ([`SrcSpan`], [`SourceOrigin`]), the module AST
//! ([`Module`], [`Member`], [`Term`], [`TypeSpec`]), and the out-of-band
//! [`ResolvablesIndex`] that maps stable ids back to declarations.

pub mod ast;
pub mod pretty;
mod resolvable;
mod source;
mod span;

pub use ast::member::{
    Assoc, BinOpDef, Bnd, DocComment, DuplicateMember, InvalidMember, Member, MemberParseError,
    Module, TypeAlias, TypeDef, TypeStructDef, UnaryOpDef, Visibility,
};
pub use ast::term::{
    App, Cond, Expr, FnParam, Hole, InvalidExpression, Lambda, LambdaMeta, MemEffect, NativeImpl,
    Ref, Term, TermError, TermGroup, TupleTerm,
};
pub use ast::types::{NativeStruct, TypeApplication, TypeFn, TypeRef, TypeSpec};
pub use resolvable::{
    assign_ids, ParamSig, Resolvable, ResolvableId, ResolvableKind, ResolvablesIndex,
};
pub use source::SourceInfo;
pub use span::{SourceOrigin, SrcPoint, SrcSpan};
