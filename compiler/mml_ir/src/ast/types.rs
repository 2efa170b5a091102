//! Type specification nodes.
//!
//! `TypeSpec` is the closed variant set used everywhere a type appears:
//! member ascriptions, parameter annotations, computed expression types, and
//! the right-hand side of `type` declarations.

use std::fmt;

use crate::resolvable::ResolvableId;
use crate::span::SourceOrigin;

/// A by-name reference to a declared type.
#[derive(Clone, PartialEq)]
pub struct TypeRef {
    pub origin: SourceOrigin,
    pub name: String,
    pub resolved: Option<ResolvableId>,
}

impl TypeRef {
    pub fn new(origin: SourceOrigin, name: impl Into<String>) -> Self {
        TypeRef {
            origin,
            name: name.into(),
            resolved: None,
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resolved {
            Some(id) => write!(f, "TypeRef({} -> {id:?})", self.name),
            None => write!(f, "TypeRef({})", self.name),
        }
    }
}

/// A struct laid out with C rules, describable to LLVM.
///
/// Both the injected runtime types (`String`, `Buffer`, ...) and user
/// `TypeStruct` declarations resolve to one of these before codegen.
#[derive(Clone, PartialEq, Debug)]
pub struct NativeStruct {
    pub name: String,
    pub fields: Vec<(String, TypeSpec)>,
}

impl NativeStruct {
    pub fn field(&self, name: &str) -> Option<(usize, &TypeSpec)> {
        self.fields
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| (i, &self.fields[i].1))
    }
}

/// Curried function type. Application consumes `params` one at a time.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeFn {
    pub params: Vec<TypeSpec>,
    pub ret: TypeSpec,
}

impl TypeFn {
    pub fn new(params: Vec<TypeSpec>, ret: TypeSpec) -> Self {
        TypeFn { params, ret }
    }

    /// The type after applying one argument: either a narrower arrow or the
    /// return type when this was the last parameter.
    pub fn apply_one(&self) -> TypeSpec {
        if self.params.len() <= 1 {
            self.ret.clone()
        } else {
            TypeSpec::Fn(Box::new(TypeFn {
                params: self.params[1..].to_vec(),
                ret: self.ret.clone(),
            }))
        }
    }
}

/// Type application, e.g. `Array Int`. Parsed and carried but not expanded;
/// generic instantiation is outside the current checker.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeApplication {
    pub ctor: TypeSpec,
    pub args: Vec<TypeSpec>,
}

/// The closed set of type forms.
#[derive(Clone, PartialEq)]
pub enum TypeSpec {
    Ref(TypeRef),
    /// An LLVM scalar: `i64`, `double`, `i1`, `i8`, ...
    NativePrimitive(String),
    /// Pointer to an element type.
    NativePointer(Box<TypeSpec>),
    NativeStruct(NativeStruct),
    Fn(Box<TypeFn>),
    Tuple(Vec<TypeSpec>),
    Unit,
    Union(Vec<TypeSpec>),
    Intersection(Vec<TypeSpec>),
    Application(Box<TypeApplication>),
    Variable(String),
    /// A type that failed resolution; wraps the original for diagnostics.
    Invalid(Box<TypeSpec>),
}

impl TypeSpec {
    pub fn prim(name: &str) -> TypeSpec {
        TypeSpec::NativePrimitive(name.to_string())
    }

    pub fn named(name: &str) -> TypeSpec {
        TypeSpec::Ref(TypeRef::new(SourceOrigin::Synth, name))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, TypeSpec::Invalid(_))
    }

    pub fn is_fn(&self) -> bool {
        matches!(self, TypeSpec::Fn(_))
    }

    pub fn as_fn(&self) -> Option<&TypeFn> {
        match self {
            TypeSpec::Fn(f) => Some(f),
            _ => None,
        }
    }

    /// Name of the referenced type, if this is a plain reference.
    pub fn ref_name(&self) -> Option<&str> {
        match self {
            TypeSpec::Ref(r) => Some(&r.name),
            _ => None,
        }
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Ref(r) => write!(f, "{r:?}"),
            TypeSpec::NativePrimitive(t) => write!(f, "Prim({t})"),
            TypeSpec::NativePointer(elem) => write!(f, "Ptr({elem:?})"),
            TypeSpec::NativeStruct(s) => write!(f, "Struct({})", s.name),
            TypeSpec::Fn(func) => {
                write!(f, "Fn(")?;
                for p in &func.params {
                    write!(f, "{p:?} -> ")?;
                }
                write!(f, "{:?})", func.ret)
            }
            TypeSpec::Tuple(elems) => write!(f, "Tuple{elems:?}"),
            TypeSpec::Unit => write!(f, "Unit"),
            TypeSpec::Union(alts) => write!(f, "Union{alts:?}"),
            TypeSpec::Intersection(alts) => write!(f, "Intersection{alts:?}"),
            TypeSpec::Application(app) => write!(f, "App({:?}, {:?})", app.ctor, app.args),
            TypeSpec::Variable(v) => write!(f, "Var('{v})"),
            TypeSpec::Invalid(orig) => write!(f, "InvalidType({orig:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_one_narrows_arrow() {
        let func = TypeFn::new(
            vec![TypeSpec::named("Int"), TypeSpec::named("Int")],
            TypeSpec::named("Int"),
        );
        let after_one = func.apply_one();
        let arrow = after_one.as_fn().unwrap();
        assert_eq!(arrow.params.len(), 1);
        assert_eq!(arrow.ret, TypeSpec::named("Int"));

        let after_two = arrow.apply_one();
        assert_eq!(after_two, TypeSpec::named("Int"));
    }

    #[test]
    fn native_struct_field_lookup() {
        let s = NativeStruct {
            name: "String".into(),
            fields: vec![
                ("length".into(), TypeSpec::prim("i64")),
                ("data".into(), TypeSpec::NativePointer(Box::new(TypeSpec::prim("i8")))),
                ("__cap".into(), TypeSpec::prim("i64")),
            ],
        };
        let (idx, ty) = s.field("data").unwrap();
        assert_eq!(idx, 1);
        assert!(matches!(ty, TypeSpec::NativePointer(_)));
        assert!(s.field("missing").is_none());
    }
}
