//! Module-level emission: assembles the final IR text.
//!
//! Output order: module header (triple, source filename), native struct
//! type definitions, global string constants, globals, external
//! declarations, function definitions, the `@llvm.global_ctors` array, and
//! metadata (TBAA nodes, alias scope domains) at the end.

use mml_ir::{Member, Module, ResolvablesIndex, Term, TypeSpec};
use tracing::debug;

use crate::func::{declare_native, emit_function, emit_initializer, ensure_struct_defined};
use crate::mangle;
use crate::state::CodeGenState;
use crate::types::TypeInfo;
use crate::{CodeGenError, CompileMode, EmitOptions};

pub(crate) fn emit(
    module: &Module,
    index: &ResolvablesIndex,
    options: &EmitOptions,
) -> Result<String, CodeGenError> {
    let mut state = CodeGenState::new(index, options, &module.name);
    debug!(module = %module.name, triple = %options.triple, "emitting LLVM IR");

    // Natives declare eagerly so an empty module still emits its shell.
    for member in &module.members {
        if let Member::Bnd(bnd) = member {
            if bnd.native().is_some() {
                if let Some(id) = &bnd.id {
                    if let Some(res) = index.get(id) {
                        declare_native(&mut state, res)?;
                    }
                }
            }
        }
    }

    let mut user_main: Option<TypeSpec> = None;

    for member in &module.members {
        match member {
            Member::Bnd(bnd) => {
                if bnd.native().is_some() {
                    continue;
                }
                if let Some(lambda) = bnd.lambda() {
                    let ret_ty = lambda
                        .ret_asc
                        .clone()
                        .or_else(|| {
                            lambda
                                .type_spec
                                .as_ref()
                                .and_then(TypeSpec::as_fn)
                                .map(|f| f.ret.clone())
                        })
                        .ok_or_else(|| {
                            CodeGenError::missing_type(format!(
                                "return type of `{}`",
                                bnd.name
                            ))
                        })?;
                    let symbol = mangle::mangle_function(&module.name, &bnd.name);
                    emit_function(
                        &mut state,
                        &symbol,
                        &lambda.params,
                        &ret_ty,
                        &lambda.body,
                        bnd.id.as_ref(),
                    )?;
                    if bnd.name == "main" {
                        user_main = Some(ret_ty);
                    }
                } else {
                    emit_global(&mut state, module, bnd)?;
                }
            }
            Member::BinOp(op) => {
                if matches!(op.body.only_term(), Some(Term::Native(_))) {
                    continue;
                }
                let ret_ty = operator_ret(op.ret_asc.as_ref(), op.type_spec.as_ref(), &op.name)?;
                let symbol = mangle::mangle_operator(&module.name, &op.name, 2);
                let params = [op.lhs.clone(), op.rhs.clone()];
                emit_function(&mut state, &symbol, &params, &ret_ty, &op.body, op.id.as_ref())?;
            }
            Member::UnaryOp(op) => {
                if matches!(op.body.only_term(), Some(Term::Native(_))) {
                    continue;
                }
                let ret_ty = operator_ret(op.ret_asc.as_ref(), op.type_spec.as_ref(), &op.name)?;
                let symbol = mangle::mangle_operator(&module.name, &op.name, 1);
                let params = [op.param.clone()];
                emit_function(&mut state, &symbol, &params, &ret_ty, &op.body, op.id.as_ref())?;
            }
            // Type declarations materialize on use; error wrappers are
            // unreachable here (the driver gates emission on a clean run).
            _ => {}
        }
    }

    if options.mode == CompileMode::Binary {
        if let Some(ret_ty) = user_main {
            synthesize_main(&mut state, &module.name, &ret_ty)?;
        }
    }

    Ok(assemble(&state, module, options))
}

fn operator_ret(
    ret_asc: Option<&TypeSpec>,
    sig: Option<&TypeSpec>,
    name: &str,
) -> Result<TypeSpec, CodeGenError> {
    ret_asc
        .cloned()
        .or_else(|| sig.and_then(TypeSpec::as_fn).map(|f| f.ret.clone()))
        .ok_or_else(|| CodeGenError::missing_type(format!("return type of operator `{name}`")))
}

/// A module-level value binding: a literal initializer emits a constant
/// global; anything else emits a zero global plus an initializer function
/// registered in `@llvm.global_ctors`.
fn emit_global(
    state: &mut CodeGenState<'_>,
    module: &Module,
    bnd: &mml_ir::Bnd,
) -> Result<(), CodeGenError> {
    let ty = bnd
        .type_spec
        .as_ref()
        .ok_or_else(|| CodeGenError::missing_type(format!("type of `{}`", bnd.name)))?;
    let ti = TypeInfo::new(state.index);
    if ti.is_unit(ty) {
        return Ok(());
    }
    let llvm = ti.llvm_type(ty)?;
    ensure_struct_defined(state, &ti, ty)?;
    let symbol = mangle::mangle_function(&module.name, &bnd.name);

    match bnd.value.only_term() {
        Some(Term::Int { value, .. }) => {
            state.globals.push(format!("@{symbol} = global {llvm} {value}"));
        }
        Some(Term::Bool { value, .. }) => {
            state
                .globals
                .push(format!("@{symbol} = global {llvm} {}", i32::from(*value)));
        }
        Some(Term::Float { value, .. }) => {
            state.globals.push(format!(
                "@{symbol} = global {llvm} 0x{:016X}",
                value.to_bits()
            ));
        }
        _ => {
            state
                .globals
                .push(format!("@{symbol} = global {llvm} zeroinitializer"));
            let init_name = format!("_init_global_{}", bnd.name);
            emit_initializer(state, &init_name, &symbol, ty, &bnd.value)?;
            state.ctors.push(init_name);
        }
    }
    Ok(())
}

/// In Binary mode a user `main` is mangled away and a C-ABI `@main` is
/// synthesized over it. An `Int` result becomes the process exit code.
fn synthesize_main(
    state: &mut CodeGenState<'_>,
    module_name: &str,
    ret_ty: &TypeSpec,
) -> Result<(), CodeGenError> {
    let ti = TypeInfo::new(state.index);
    let ret_llvm = ti.llvm_type(ret_ty)?;
    let user_symbol = mangle::mangle_function(module_name, "main");

    let mut lines = vec![
        "define i32 @main(i32 %argc, ptr %argv) {".to_string(),
        "entry:".to_string(),
    ];
    match ret_llvm.as_str() {
        "void" => {
            lines.push(format!("  call void @{user_symbol}()"));
            lines.push("  ret i32 0".to_string());
        }
        "i64" => {
            lines.push(format!("  %code = call i64 @{user_symbol}()"));
            lines.push("  %trunc = trunc i64 %code to i32".to_string());
            lines.push("  ret i32 %trunc".to_string());
        }
        "i32" => {
            lines.push(format!("  %code = call i32 @{user_symbol}()"));
            lines.push("  ret i32 %code".to_string());
        }
        _ => {
            lines.push(format!("  call {ret_llvm} @{user_symbol}()"));
            lines.push("  ret i32 0".to_string());
        }
    }
    lines.push("}".to_string());
    state.functions.push(lines.join("\n"));
    Ok(())
}

fn assemble(state: &CodeGenState<'_>, module: &Module, options: &EmitOptions) -> String {
    let mut out = Vec::new();
    out.push(format!("; ModuleID = '{}'", module.name));
    out.push(format!("source_filename = \"{}.mml\"", module.name));
    out.push(format!("target triple = \"{}\"", options.triple));
    out.push(String::new());

    if !state.type_defs.is_empty() {
        out.extend(state.type_defs.values().cloned());
        out.push(String::new());
    }
    if !state.string_consts.is_empty() {
        out.extend(state.string_consts.iter().cloned());
        out.push(String::new());
    }
    if !state.globals.is_empty() {
        out.extend(state.globals.iter().cloned());
        out.push(String::new());
    }
    if !state.declares.is_empty() {
        out.extend(state.declares.values().cloned());
        out.push(String::new());
    }
    for function in &state.functions {
        out.push(function.clone());
        out.push(String::new());
    }
    if !state.ctors.is_empty() {
        let entries: Vec<String> = state
            .ctors
            .iter()
            .map(|name| format!("{{ i32 65535, ptr @{name}, ptr null }}"))
            .collect();
        out.push(format!(
            "@llvm.global_ctors = appending global [{} x {{ i32, ptr, ptr }}] [{}]",
            state.ctors.len(),
            entries.join(", ")
        ));
        out.push(String::new());
    }
    let metadata = state.tbaa.render();
    if !metadata.is_empty() {
        out.extend(metadata);
    }
    let mut text = out.join("\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
