//! TypeSpec resolution for emission: LLVM types, MML type names, layouts.

use mml_ir::{ResolvableKind, ResolvablesIndex, TypeSpec};

use crate::layout::{scalar_size_align, StructLayout};
use crate::CodeGenError;

pub(crate) struct TypeInfo<'a> {
    pub index: &'a ResolvablesIndex,
}

impl<'a> TypeInfo<'a> {
    pub fn new(index: &'a ResolvablesIndex) -> Self {
        TypeInfo { index }
    }

    /// Chase alias and native type-def references to a structural form.
    pub fn canon<'t>(&'t self, ty: &'t TypeSpec) -> &'t TypeSpec {
        if let TypeSpec::Ref(r) = ty {
            if let Some(id) = &r.resolved {
                if let Some(res) = self.index.get(id) {
                    if matches!(res.kind, ResolvableKind::TypeAlias | ResolvableKind::TypeDef) {
                        if let Some(spec) = &res.type_spec {
                            return self.canon(spec);
                        }
                    }
                }
            }
        }
        ty
    }

    /// The LLVM type of a value of `ty`.
    pub fn llvm_type(&self, ty: &TypeSpec) -> Result<String, CodeGenError> {
        match self.canon(ty) {
            TypeSpec::NativePrimitive(p) => Ok(p.clone()),
            TypeSpec::NativePointer(_) => Ok("ptr".to_string()),
            TypeSpec::NativeStruct(s) => Ok(format!("%struct.{}", s.name)),
            TypeSpec::Unit => Ok("void".to_string()),
            TypeSpec::Ref(r) => {
                let res = r
                    .resolved
                    .as_ref()
                    .and_then(|id| self.index.get(id))
                    .ok_or_else(|| {
                        CodeGenError::missing_type(format!("unresolved type `{}`", r.name))
                    })?;
                match res.kind {
                    ResolvableKind::TypeStruct => Ok(format!("%struct.{}", res.name)),
                    // Opaque native type with no concrete spec.
                    _ => Ok("ptr".to_string()),
                }
            }
            TypeSpec::Tuple(elems) => {
                let mut parts = Vec::with_capacity(elems.len());
                for e in elems {
                    parts.push(self.llvm_type(e)?);
                }
                Ok(format!("{{ {} }}", parts.join(", ")))
            }
            TypeSpec::Fn(_) => Ok("ptr".to_string()),
            TypeSpec::Invalid(_) => Err(CodeGenError::missing_type(
                "cannot emit a value of an invalid type",
            )),
            other => Err(CodeGenError::missing_type(format!(
                "cannot lower type {other:?}"
            ))),
        }
    }

    /// The nominal MML name of a type, for TBAA tags.
    pub fn mml_name(&self, ty: &TypeSpec) -> String {
        match ty {
            TypeSpec::Ref(r) => r.name.clone(),
            TypeSpec::NativePrimitive(p) => p.clone(),
            TypeSpec::NativePointer(_) => "Ptr".to_string(),
            TypeSpec::NativeStruct(s) => s.name.clone(),
            TypeSpec::Unit => "Unit".to_string(),
            TypeSpec::Tuple(_) => "Tuple".to_string(),
            TypeSpec::Fn(_) => "Fn".to_string(),
            _ => "Unknown".to_string(),
        }
    }

    pub fn is_unit(&self, ty: &TypeSpec) -> bool {
        matches!(self.canon(ty), TypeSpec::Unit)
    }

    /// Struct layout of `ty` when it is struct-like, with recursive sizes
    /// for nested aggregates.
    pub fn struct_layout(&self, ty: &TypeSpec) -> Result<Option<StructLayout>, CodeGenError> {
        let fields: Vec<(String, TypeSpec)> = match self.canon(ty) {
            TypeSpec::NativeStruct(s) => s.fields.clone(),
            TypeSpec::Ref(r) => {
                let Some(res) = r.resolved.as_ref().and_then(|id| self.index.get(id)) else {
                    return Ok(None);
                };
                if res.kind != ResolvableKind::TypeStruct {
                    return Ok(None);
                }
                res.params
                    .iter()
                    .map(|p| {
                        p.type_spec
                            .clone()
                            .map(|t| (p.name.clone(), t))
                            .ok_or_else(|| {
                                CodeGenError::missing_type(format!(
                                    "field `{}` of `{}` has no type",
                                    p.name, res.name
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            _ => return Ok(None),
        };

        let name = self.struct_name(ty)?;
        let mut laid = Vec::with_capacity(fields.len());
        for (fname, fty) in fields {
            let llvm = self.llvm_type(&fty)?;
            let mml = self.mml_name(&fty);
            let (size, align) = match self.struct_layout(&fty)? {
                Some(nested) => (nested.size, nested.align),
                None => scalar_size_align(&llvm),
            };
            laid.push((fname, llvm, mml, size, align));
        }
        Ok(Some(StructLayout::compute(&name, laid)))
    }

    fn struct_name(&self, ty: &TypeSpec) -> Result<String, CodeGenError> {
        match self.canon(ty) {
            TypeSpec::NativeStruct(s) => Ok(s.name.clone()),
            TypeSpec::Ref(r) => Ok(r.name.clone()),
            other => Err(CodeGenError::missing_type(format!(
                "not a struct type: {other:?}"
            ))),
        }
    }
}
