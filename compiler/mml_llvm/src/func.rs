//! Function body lowering.
//!
//! One [`FnCtx`] per emitted function. Tail positions flow through
//! [`FnCtx::emit_tail`], which implements tail-recursion loopification:
//! when the body ends in a direct self-call (including through conditional
//! chains) the function lowers as a `loop.header` / `loop.latch` /
//! `loop.exit.N` structure with one phi per parameter. Everything else
//! flows through [`FnCtx::emit_term`].

use mml_ir::{
    Expr, FnParam, Ref, Resolvable, ResolvableId, ResolvableKind, SourceOrigin, Term, TypeSpec,
};
use rustc_hash::FxHashMap;

use crate::abi::{classify_param, classify_return, ParamClass, ReturnClass};
use crate::layout::StructLayout;
use crate::mangle;
use crate::state::CodeGenState;
use crate::templates;
use crate::types::TypeInfo;
use crate::CodeGenError;

/// An SSA value: its textual representation, LLVM type, and MML type name
/// (the TBAA tag).
#[derive(Clone, Debug)]
pub(crate) struct Value {
    pub repr: String,
    pub ty: String,
    pub mml: String,
}

struct LoopInfo {
    /// `(param name, llvm type)` in declaration order.
    params: Vec<(String, String)>,
    /// `(predecessor block, per-param next values)` per tail self-call.
    incomings: Vec<(String, Vec<String>)>,
    exits: u32,
}

pub(crate) struct FnCtx<'s, 'a> {
    pub state: &'s mut CodeGenState<'a>,
    pub lines: Vec<String>,
    reg: u32,
    label: u32,
    block: String,
    scope: FxHashMap<ResolvableId, Value>,
    ret_llvm: String,
    self_id: Option<ResolvableId>,
    loop_info: Option<LoopInfo>,
    header_slot: Option<usize>,
    last_line: u32,
}

/// Emit one function definition into `state.functions`.
pub(crate) fn emit_function(
    state: &mut CodeGenState<'_>,
    symbol: &str,
    params: &[FnParam],
    ret_ty: &TypeSpec,
    body: &Expr,
    self_id: Option<&ResolvableId>,
) -> Result<(), CodeGenError> {
    let ti = TypeInfo::new(state.index);
    let ret_llvm = ti.llvm_type(ret_ty)?;

    let mut param_parts = Vec::with_capacity(params.len());
    let mut scope = FxHashMap::default();
    for param in params {
        let ty = param
            .type_spec
            .as_ref()
            .ok_or_else(|| CodeGenError::missing_type(format!("parameter `{}`", param.name)))?;
        if ti.is_unit(ty) {
            continue;
        }
        let llvm = ti.llvm_type(ty)?;
        ensure_struct_defined(state, &ti, ty)?;
        param_parts.push(format!("{llvm} %{}", param.name));
        if let Some(id) = &param.id {
            scope.insert(
                id.clone(),
                Value {
                    repr: format!("%{}", param.name),
                    ty: llvm,
                    mml: ti.mml_name(ty),
                },
            );
        }
    }
    ensure_struct_defined(state, &ti, ret_ty)?;

    let loopify = !state.options.no_tco
        && self_id.is_some_and(|id| tail_self_call(body, id));

    let mut ctx = FnCtx {
        state,
        lines: Vec::new(),
        reg: 0,
        label: 0,
        block: "entry".to_string(),
        scope,
        ret_llvm,
        self_id: self_id.cloned(),
        loop_info: None,
        header_slot: None,
        last_line: 0,
    };

    ctx.lines
        .push(format!("define {} @{symbol}({}) {{", ctx.ret_llvm, param_parts.join(", ")));
    ctx.lines.push("entry:".to_string());

    if loopify {
        ctx.lines.push("  br label %loop.header".to_string());
        ctx.header_slot = Some(ctx.lines.len());
        ctx.lines.push("loop.body:".to_string());
        ctx.block = "loop.body".to_string();

        let mut loop_params = Vec::new();
        for param in params {
            let Some(id) = &param.id else { continue };
            let Some(value) = ctx.scope.get(id).cloned() else {
                continue;
            };
            let phi_repr = format!("%{}.loop", param.name);
            loop_params.push((param.name.clone(), value.ty.clone()));
            ctx.scope.insert(
                id.clone(),
                Value {
                    repr: phi_repr,
                    ty: value.ty,
                    mml: value.mml,
                },
            );
        }
        ctx.loop_info = Some(LoopInfo {
            params: loop_params,
            incomings: Vec::new(),
            exits: 0,
        });
    }

    ctx.emit_block_tail(body)?;

    if let Some(info) = ctx.loop_info.take() {
        // The latch: one phi per parameter collecting every tail-call site.
        ctx.lines.push("loop.latch:".to_string());
        for (i, (name, ty)) in info.params.iter().enumerate() {
            let incomings: Vec<String> = info
                .incomings
                .iter()
                .map(|(pred, vals)| format!("[ {}, %{pred} ]", vals[i]))
                .collect();
            ctx.lines
                .push(format!("  %{name}.next = phi {ty} {}", incomings.join(", ")));
        }
        ctx.lines.push("  br label %loop.header".to_string());

        // The header, spliced in ahead of the body.
        let mut header = vec!["loop.header:".to_string()];
        for (name, ty) in &info.params {
            header.push(format!(
                "  %{name}.loop = phi {ty} [ %{name}, %entry ], [ %{name}.next, %loop.latch ]"
            ));
        }
        header.push("  br label %loop.body".to_string());
        let slot = ctx
            .header_slot
            .unwrap_or_else(|| unreachable!("compiler bug: loop header slot not reserved"));
        for (i, line) in header.into_iter().enumerate() {
            ctx.lines.insert(slot + i, line);
        }
    }

    ctx.lines.push("}".to_string());
    let rendered = ctx.lines.join("\n");
    state.functions.push(rendered);
    Ok(())
}

impl<'a> FnCtx<'_, 'a> {
    fn next_reg(&mut self) -> String {
        let reg = self.reg;
        self.reg += 1;
        format!("%r{reg}")
    }

    fn next_label(&mut self) -> u32 {
        let label = self.label;
        self.label += 1;
        label
    }

    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(format!("  {}", text.into()));
    }

    fn open_block(&mut self, label: &str) {
        self.lines.push(format!("{label}:"));
        self.block = label.to_string();
    }

    fn note_source(&mut self, origin: SourceOrigin) {
        if let Some(span) = origin.span() {
            if span.start.line != self.last_line {
                self.last_line = span.start.line;
                self.lines.push(format!("  ; line {}", span.start.line));
            }
        }
    }

    /// A type resolver borrowing the index, not the emission state, so it
    /// can coexist with mutation of the output buffers.
    fn ti(&self) -> TypeInfo<'a> {
        TypeInfo::new(self.state.index)
    }

    // -- Block and tail emission --

    /// Emit a block whose value is returned from the function.
    fn emit_block_tail(&mut self, expr: &Expr) -> Result<(), CodeGenError> {
        let Some((last, init)) = expr.terms.split_last() else {
            self.emit_ret(None);
            return Ok(());
        };
        for term in init {
            self.emit_term(term)?;
        }
        self.emit_tail(last)
    }

    /// Emit a block used as a value (conditional branches in non-tail
    /// position, synthetic let bodies, groups).
    fn emit_block_value(&mut self, expr: &Expr) -> Result<Option<Value>, CodeGenError> {
        let Some((last, init)) = expr.terms.split_last() else {
            return Ok(None);
        };
        for term in init {
            self.emit_term(term)?;
        }
        self.emit_term(last)
    }

    fn emit_tail(&mut self, term: &Term) -> Result<(), CodeGenError> {
        // Direct self-call in tail position: jump to the latch.
        if self.loop_info.is_some() {
            if let Term::App(_) = term {
                let (callee, args) = collapse_chain(term);
                if let Term::Ref(r) = callee {
                    if r.resolved == self.self_id {
                        let mut vals = Vec::with_capacity(args.len());
                        for arg in &args {
                            let v = self.emit_block_value(arg)?.ok_or_else(|| {
                                CodeGenError::other("tail-call argument has no value")
                            })?;
                            vals.push(v.repr);
                        }
                        let pred = self.block.clone();
                        if let Some(info) = self.loop_info.as_mut() {
                            info.incomings.push((pred, vals));
                        }
                        self.line("br label %loop.latch");
                        return Ok(());
                    }
                }
            }
        }

        if let Term::Cond(c) = term {
            // Tail conditionals keep each branch terminal: no merge block.
            self.note_source(c.origin);
            let n = self.next_label();
            let guard = self.emit_guard(&c.cond)?;
            self.line(format!("br i1 {guard}, label %then{n}, label %else{n}"));
            self.open_block(&format!("then{n}"));
            self.emit_block_tail(&c.if_true)?;
            self.open_block(&format!("else{n}"));
            self.emit_block_tail(&c.if_false)?;
            return Ok(());
        }

        let value = self.emit_term(term)?;
        self.emit_ret(value);
        Ok(())
    }

    fn emit_ret(&mut self, value: Option<Value>) {
        if self.loop_info.is_some() {
            let exit = {
                let info = self
                    .loop_info
                    .as_mut()
                    .unwrap_or_else(|| unreachable!("compiler bug: loop info vanished"));
                let exit = info.exits;
                info.exits += 1;
                exit
            };
            self.line(format!("br label %loop.exit.{exit}"));
            self.open_block(&format!("loop.exit.{exit}"));
        }
        match value {
            Some(v) if self.ret_llvm != "void" => self.line(format!("ret {} {}", v.ty, v.repr)),
            _ => {
                if self.ret_llvm == "void" {
                    self.line("ret void");
                } else {
                    // A void value feeding a non-void return only happens
                    // after an abort; keep the block well-formed.
                    self.line(format!("ret {} poison", self.ret_llvm));
                }
            }
        }
    }

    // -- Term emission --

    fn emit_term(&mut self, term: &Term) -> Result<Option<Value>, CodeGenError> {
        match term {
            Term::Int { origin, value, type_spec } => {
                self.note_source(*origin);
                let ty = self.llvm_of(type_spec.as_ref(), "Int")?;
                let mml = type_spec
                    .as_ref()
                    .map_or_else(|| "Int".to_string(), |t| self.ti().mml_name(t));
                let reg = self.next_reg();
                self.line(format!("{reg} = add {ty} 0, {value}"));
                Ok(Some(Value { repr: reg, ty, mml }))
            }
            Term::Float { origin, value, .. } => {
                self.note_source(*origin);
                Ok(Some(Value {
                    repr: format!("0x{:016X}", value.to_bits()),
                    ty: "double".to_string(),
                    mml: "Double".to_string(),
                }))
            }
            Term::Bool { origin, value, .. } => {
                self.note_source(*origin);
                Ok(Some(Value {
                    repr: if *value { "1" } else { "0" }.to_string(),
                    ty: "i1".to_string(),
                    mml: "Bool".to_string(),
                }))
            }
            Term::Unit { .. } => Ok(None),
            Term::Str { origin, value, .. } => {
                self.note_source(*origin);
                self.emit_string_literal(value)
            }
            Term::Ref(r) => self.emit_ref(r),
            Term::App(_) => self.emit_call(term),
            Term::Cond(c) => self.emit_cond_value(c),
            Term::Hole(hole) => self.emit_hole(hole),
            Term::Tuple(t) => self.emit_tuple(t),
            Term::Group(g) => self.emit_block_value(&g.inner),
            Term::Lambda(_) => Err(CodeGenError::other(
                "lambda values are only supported in call position",
            )),
            Term::Native(_) => Err(CodeGenError::other(
                "a native body cannot appear as an expression",
            )),
            Term::Placeholder { origin } => {
                Err(CodeGenError::other("`_` reached the emitter").at(*origin))
            }
            Term::Invalid(i) => Err(CodeGenError::other(
                "invalid expression reached the emitter",
            )
            .at(i.origin)),
            Term::Error(e) => {
                Err(CodeGenError::other("parse error reached the emitter").at(e.origin))
            }
        }
    }

    /// Literal strings build the runtime `{ length, data, __cap }` struct
    /// on the stack with `__cap = -1` marking static data.
    fn emit_string_literal(&mut self, raw: &str) -> Result<Option<Value>, CodeGenError> {
        let string_ty = self.string_type_spec()?;
        let ti = self.ti();
        let layout = ti
            .struct_layout(&string_ty)?
            .ok_or_else(|| CodeGenError::missing_type("String layout"))?;
        ensure_struct_defined(self.state, &ti, &string_ty)?;
        let (global, len) = self.state.intern_string(raw);

        let slot = self.next_reg();
        self.line(format!("{slot} = alloca %struct.String, align 8"));
        let stores = [
            (0u64, "i64", format!("{len}"), "Int"),
            (1, "ptr", global, "CharPtr"),
            (2, "i64", "-1".to_string(), "Int"),
        ];
        for (idx, ty, value, mml) in stores {
            let field = &layout.fields[idx as usize];
            let ptr = self.next_reg();
            self.line(format!(
                "{ptr} = getelementptr inbounds %struct.String, ptr {slot}, i32 0, i32 {idx}"
            ));
            let tag = self.field_tag(&layout, field.offset, mml);
            let attach = self.state.tbaa.field_attachment("String", tag);
            self.line(format!("store {ty} {value}, ptr {ptr}{attach}"));
        }
        let reg = self.next_reg();
        self.line(format!("{reg} = load %struct.String, ptr {slot}"));
        Ok(Some(Value {
            repr: reg,
            ty: "%struct.String".to_string(),
            mml: "String".to_string(),
        }))
    }

    fn emit_ref(&mut self, r: &Ref) -> Result<Option<Value>, CodeGenError> {
        // Field selection on a struct value.
        if let Some(qualifier) = r.qualifier.as_deref() {
            let owner = self
                .emit_ref(qualifier)?
                .ok_or_else(|| CodeGenError::other("field access on a void value"))?;
            let owner_ty = qualifier
                .type_spec
                .as_ref()
                .ok_or_else(|| CodeGenError::missing_type(format!("`{}`", qualifier.name)))?;
            let ti = self.ti();
            let layout = ti.struct_layout(owner_ty)?.ok_or_else(|| {
                CodeGenError::missing_type(format!("`{}` is not a struct", qualifier.name))
            })?;
            let idx = layout.field_index(&r.name).ok_or_else(|| {
                CodeGenError::other(format!("no field `{}` on `{}`", r.name, layout.name))
            })?;
            let field = &layout.fields[idx];
            let reg = self.next_reg();
            self.line(format!(
                "{reg} = extractvalue {} {}, {idx}",
                owner.ty, owner.repr
            ));
            return Ok(Some(Value {
                repr: reg,
                ty: field.llvm.clone(),
                mml: field.mml.clone(),
            }));
        }

        let id = r
            .resolved
            .as_ref()
            .ok_or_else(|| CodeGenError::other(format!("unresolved `{}`", r.name)).at(r.origin))?;
        if let Some(value) = self.scope.get(id) {
            if value.ty == "void" {
                return Ok(None);
            }
            return Ok(Some(value.clone()));
        }

        // Module-level value binding: load from its global.
        let res = self
            .state
            .index
            .get(id)
            .ok_or_else(|| CodeGenError::other(format!("unknown resolvable `{id}`")))?;
        if res.kind == ResolvableKind::Bnd {
            let ty = res
                .type_spec
                .as_ref()
                .ok_or_else(|| CodeGenError::missing_type(format!("`{}`", r.name)))?;
            let ti = self.ti();
            let llvm = ti.llvm_type(ty)?;
            let mml = ti.mml_name(ty);
            if llvm == "void" {
                return Ok(None);
            }
            let symbol = mangle::mangle_function(&self.state.module_name, &res.name);
            let reg = self.next_reg();
            let attach = self.state.tbaa.scalar_attachment(&mml);
            self.line(format!("{reg} = load {llvm}, ptr @{symbol}{attach}"));
            return Ok(Some(Value { repr: reg, ty: llvm, mml }));
        }
        Err(CodeGenError::other(format!(
            "`{}` cannot be used as a value here",
            r.name
        ))
        .at(r.origin))
    }

    fn emit_cond_value(&mut self, c: &mml_ir::Cond) -> Result<Option<Value>, CodeGenError> {
        self.note_source(c.origin);
        // Reserve the label set before descending so nested conditionals
        // cannot collide.
        let n = self.next_label();
        let guard = self.emit_guard(&c.cond)?;
        self.line(format!("br i1 {guard}, label %then{n}, label %else{n}"));

        self.open_block(&format!("then{n}"));
        let then_value = self.emit_block_value(&c.if_true)?;
        let then_exit = self.block.clone();
        self.line(format!("br label %merge{n}"));

        self.open_block(&format!("else{n}"));
        let else_value = self.emit_block_value(&c.if_false)?;
        let else_exit = self.block.clone();
        self.line(format!("br label %merge{n}"));

        self.open_block(&format!("merge{n}"));
        match (then_value, else_value) {
            (Some(t), Some(e)) => {
                let reg = self.next_reg();
                self.line(format!(
                    "{reg} = phi {} [ {}, %{then_exit} ], [ {}, %{else_exit} ]",
                    t.ty, t.repr, e.repr
                ));
                Ok(Some(Value {
                    repr: reg,
                    ty: t.ty,
                    mml: t.mml,
                }))
            }
            // Unit branches merge without a phi.
            _ => Ok(None),
        }
    }

    fn emit_guard(&mut self, cond: &Expr) -> Result<String, CodeGenError> {
        let value = self
            .emit_block_value(cond)?
            .ok_or_else(|| CodeGenError::other("conditional guard has no value"))?;
        if value.ty == "i1" {
            return Ok(value.repr);
        }
        // Integer guards coerce through a zero comparison.
        let reg = self.next_reg();
        self.line(format!("{reg} = icmp ne {} {}, 0", value.ty, value.repr));
        Ok(reg)
    }

    fn emit_hole(&mut self, hole: &mml_ir::Hole) -> Result<Option<Value>, CodeGenError> {
        let (l1, c1, l2, c2) = match hole.origin.span() {
            Some(span) => (
                span.start.line,
                span.start.col,
                span.end.line,
                span.end.col,
            ),
            None => (0, 0, 0, 0),
        };
        self.state.declare(
            "__mml_sys_hole",
            "declare void @__mml_sys_hole(i64, i64, i64, i64)".to_string(),
        );
        self.line(format!(
            "call void @__mml_sys_hole(i64 {l1}, i64 {c1}, i64 {l2}, i64 {c2})"
        ));
        self.line("unreachable");
        // Continue in a fresh (dead) block so the function stays
        // well-formed if anything follows the abort.
        let n = self.next_label();
        self.open_block(&format!("hole.cont{n}"));
        match &hole.type_spec {
            Some(ty) if !self.ti().is_unit(ty) => {
                let llvm = self.ti().llvm_type(ty)?;
                let mml = self.ti().mml_name(ty);
                Ok(Some(Value {
                    repr: "poison".to_string(),
                    ty: llvm,
                    mml,
                }))
            }
            _ => Ok(None),
        }
    }

    fn emit_tuple(&mut self, t: &mml_ir::TupleTerm) -> Result<Option<Value>, CodeGenError> {
        let ty = t
            .type_spec
            .as_ref()
            .ok_or_else(|| CodeGenError::missing_type("tuple"))?;
        let llvm = self.ti().llvm_type(ty)?;
        let mut current = "undef".to_string();
        for (i, elem) in t.elems.iter().enumerate() {
            let v = self
                .emit_block_value(elem)?
                .ok_or_else(|| CodeGenError::other("tuple element has no value"))?;
            let reg = self.next_reg();
            self.line(format!(
                "{reg} = insertvalue {llvm} {current}, {} {}, {i}",
                v.ty, v.repr
            ));
            current = reg;
        }
        Ok(Some(Value {
            repr: current,
            ty: llvm,
            mml: "Tuple".to_string(),
        }))
    }

    // -- Calls --

    fn emit_call(&mut self, term: &Term) -> Result<Option<Value>, CodeGenError> {
        let (callee, args) = collapse_chain(term);
        match callee {
            // Synthetic let: bind arguments, inline the body.
            Term::Lambda(lambda) => {
                for (param, arg) in lambda.params.iter().zip(&args) {
                    let value = self.emit_block_value(arg)?;
                    if let Some(id) = &param.id {
                        let bound = value.unwrap_or(Value {
                            repr: String::new(),
                            ty: "void".to_string(),
                            mml: "Unit".to_string(),
                        });
                        self.scope.insert(id.clone(), bound);
                    }
                }
                self.emit_block_value(&lambda.body)
            }
            Term::Ref(r) => {
                self.note_source(r.origin);
                let id = r.resolved.as_ref().ok_or_else(|| {
                    CodeGenError::other(format!("unresolved callee `{}`", r.name)).at(r.origin)
                })?;
                let res = self
                    .state
                    .index
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CodeGenError::other(format!("unknown callee `{id}`")))?;
                self.emit_resolved_call(&res, &args)
            }
            other => Err(CodeGenError::other(
                "compiler bug: application head is neither a reference nor a lambda",
            )
            .at(other.origin())),
        }
    }

    fn emit_resolved_call(
        &mut self,
        res: &Resolvable,
        args: &[&Expr],
    ) -> Result<Option<Value>, CodeGenError> {
        if res.kind == ResolvableKind::TypeStruct {
            return self.emit_struct_ctor(res, args);
        }

        let sig = res
            .type_spec
            .as_ref()
            .and_then(TypeSpec::as_fn)
            .ok_or_else(|| CodeGenError::missing_type(format!("signature of `{}`", res.name)))?;
        let ret_ty = sig.ret.clone();

        // Argument values.
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.emit_block_value(arg)?);
        }
        let scalars: Vec<Value> = values.into_iter().flatten().collect();

        if let Some(native) = &res.native {
            if let Some(selector) = native.selector() {
                let operands: Vec<String> = scalars.iter().map(|v| v.repr.clone()).collect();
                let ty = scalars
                    .first()
                    .map_or_else(|| "i64".to_string(), |v| v.ty.clone());
                let (rhs, out_ty) = templates::expand_selector(selector, &ty, &operands)?;
                let reg = self.next_reg();
                self.line(format!("{reg} = {rhs}"));
                return Ok(Some(Value {
                    repr: reg,
                    ty: out_ty,
                    mml: self.ti().mml_name(&ret_ty),
                }));
            }
            if let Some(template) = native.template() {
                // Inlined at each call site; no declaration is generated.
                let operands: Vec<String> = scalars.iter().map(|v| v.repr.clone()).collect();
                let ty = scalars
                    .first()
                    .map_or_else(|| "i64".to_string(), |v| v.ty.clone());
                let expanded = templates::expand_template(template, &ty, &operands)?;
                let reg = self.next_reg();
                self.line(format!("{reg} = {expanded}"));
                let llvm = self.ti().llvm_type(&ret_ty)?;
                return Ok(Some(Value {
                    repr: reg,
                    ty: llvm,
                    mml: self.ti().mml_name(&ret_ty),
                }));
            }
            // External native function at the ABI boundary.
            let symbol = native
                .attr("extern")
                .unwrap_or(&res.name)
                .to_string();
            return self.emit_native_call(&symbol, sig, &scalars, &ret_ty);
        }

        // User-to-user call: native to LLVM's defaults.
        let symbol = match res.kind {
            ResolvableKind::BinOp => {
                mangle::mangle_operator(&self.state.module_name, &res.name, 2)
            }
            ResolvableKind::UnaryOp => {
                mangle::mangle_operator(&self.state.module_name, &res.name, 1)
            }
            _ => mangle::mangle_function(&self.state.module_name, &res.name),
        };
        let ret_llvm = self.ti().llvm_type(&ret_ty)?;
        let arg_list: Vec<String> = scalars
            .iter()
            .map(|v| format!("{} {}", v.ty, v.repr))
            .collect();
        if ret_llvm == "void" {
            self.line(format!("call void @{symbol}({})", arg_list.join(", ")));
            Ok(None)
        } else {
            let reg = self.next_reg();
            self.line(format!(
                "{reg} = call {ret_llvm} @{symbol}({})",
                arg_list.join(", ")
            ));
            Ok(Some(Value {
                repr: reg,
                ty: ret_llvm,
                mml: self.ti().mml_name(&ret_ty),
            }))
        }
    }

    /// Call a C-ABI native function, lowering aggregates per the target.
    fn emit_native_call(
        &mut self,
        symbol: &str,
        sig: &mml_ir::TypeFn,
        scalars: &[Value],
        ret_ty: &TypeSpec,
    ) -> Result<Option<Value>, CodeGenError> {
        let abi = self.state.options.abi;
        let ti_ret_layout = self.ti().struct_layout(ret_ty)?;
        let ret_llvm = self.ti().llvm_type(ret_ty)?;

        let mut decl_parts: Vec<String> = Vec::new();
        let mut call_parts: Vec<String> = Vec::new();

        // Hidden sret pointer first.
        let sret_slot = match &ti_ret_layout {
            Some(layout) if classify_return(abi, layout) == ReturnClass::Sret => {
                let ti = self.ti();
                ensure_struct_defined(self.state, &ti, ret_ty)?;
                let slot = self.next_reg();
                self.line(format!("{slot} = alloca {ret_llvm}, align 8"));
                decl_parts.push(format!("ptr sret({ret_llvm}) align 8"));
                call_parts.push(format!("ptr sret({ret_llvm}) align 8 {slot}"));
                Some(slot)
            }
            _ => None,
        };

        let mut value_idx = 0usize;
        for param_ty in &sig.params {
            if self.ti().is_unit(param_ty) {
                continue;
            }
            let value = scalars.get(value_idx).cloned().ok_or_else(|| {
                CodeGenError::other(format!("missing argument in call to `{symbol}`"))
            })?;
            value_idx += 1;

            let layout = self.ti().struct_layout(param_ty)?;
            let Some(layout) = layout else {
                decl_parts.push(value.ty.clone());
                call_parts.push(format!("{} {}", value.ty, value.repr));
                continue;
            };
            let ti = self.ti();
            ensure_struct_defined(self.state, &ti, param_ty)?;
            match classify_param(abi, &layout) {
                ParamClass::Direct => {
                    decl_parts.push(value.ty.clone());
                    call_parts.push(format!("{} {}", value.ty, value.repr));
                }
                ParamClass::ByvalPtr => {
                    let slot = self.spill(&value)?;
                    decl_parts.push(format!("ptr byval({}) align 8", value.ty));
                    call_parts.push(format!("ptr byval({}) align 8 {slot}", value.ty));
                }
                ParamClass::PlainPtr => {
                    let slot = self.spill(&value)?;
                    decl_parts.push("ptr".to_string());
                    call_parts.push(format!("ptr {slot}"));
                }
                ParamClass::Split(parts) => {
                    if parts.len() == layout.fields.len() {
                        for (i, part_ty) in parts.iter().enumerate() {
                            let reg = self.next_reg();
                            self.line(format!(
                                "{reg} = extractvalue {} {}, {i}",
                                value.ty, value.repr
                            ));
                            decl_parts.push(part_ty.clone());
                            call_parts.push(format!("{part_ty} {reg}"));
                        }
                    } else {
                        // Packed form: reload the aggregate as raw words.
                        let slot = self.spill(&value)?;
                        for (i, part_ty) in parts.iter().enumerate() {
                            let ptr = self.next_reg();
                            self.line(format!(
                                "{ptr} = getelementptr inbounds i8, ptr {slot}, i64 {}",
                                i as u64 * 8
                            ));
                            let reg = self.next_reg();
                            self.line(format!("{reg} = load {part_ty}, ptr {ptr}"));
                            decl_parts.push(part_ty.clone());
                            call_parts.push(format!("{part_ty} {reg}"));
                        }
                    }
                }
            }
        }

        // Record the forward declaration.
        let decl_ret = if sret_slot.is_some() { "void" } else { ret_llvm.as_str() };
        self.state.declare(
            symbol,
            format!("declare {decl_ret} @{symbol}({})", decl_parts.join(", ")),
        );

        if let Some(slot) = sret_slot {
            self.line(format!("call void @{symbol}({})", call_parts.join(", ")));
            let reg = self.next_reg();
            self.line(format!("{reg} = load {ret_llvm}, ptr {slot}"));
            return Ok(Some(Value {
                repr: reg,
                ty: ret_llvm,
                mml: self.ti().mml_name(ret_ty),
            }));
        }
        if ret_llvm == "void" {
            self.line(format!("call void @{symbol}({})", call_parts.join(", ")));
            return Ok(None);
        }
        let reg = self.next_reg();
        self.line(format!(
            "{reg} = call {ret_llvm} @{symbol}({})",
            call_parts.join(", ")
        ));
        Ok(Some(Value {
            repr: reg,
            ty: ret_llvm,
            mml: self.ti().mml_name(ret_ty),
        }))
    }

    /// Store an aggregate value into a fresh stack slot.
    fn spill(&mut self, value: &Value) -> Result<String, CodeGenError> {
        let slot = self.next_reg();
        self.line(format!("{slot} = alloca {}, align 8", value.ty));
        self.line(format!("store {} {}, ptr {slot}", value.ty, value.repr));
        Ok(slot)
    }

    /// Struct construction: alloca, store each field with its TBAA access
    /// tag, load the composite.
    fn emit_struct_ctor(
        &mut self,
        res: &Resolvable,
        args: &[&Expr],
    ) -> Result<Option<Value>, CodeGenError> {
        let ctor_ty = res
            .type_spec
            .as_ref()
            .and_then(TypeSpec::as_fn)
            .map(|f| f.ret.clone())
            .ok_or_else(|| CodeGenError::missing_type(format!("constructor `{}`", res.name)))?;
        let ti = self.ti();
        let layout = ti
            .struct_layout(&ctor_ty)?
            .ok_or_else(|| CodeGenError::missing_type(format!("layout of `{}`", res.name)))?;
        ensure_struct_defined(self.state, &ti, &ctor_ty)?;

        let name = layout.name.clone();
        let slot = self.next_reg();
        self.line(format!("{slot} = alloca %struct.{name}, align {}", layout.align));
        for (i, arg) in args.iter().enumerate() {
            let value = self
                .emit_block_value(arg)?
                .ok_or_else(|| CodeGenError::other("struct field has no value"))?;
            let field = layout.fields.get(i).ok_or_else(|| {
                CodeGenError::other(format!("too many fields for `{name}`"))
            })?;
            let offset = field.offset;
            let mml = field.mml.clone();
            let ptr = self.next_reg();
            self.line(format!(
                "{ptr} = getelementptr inbounds %struct.{name}, ptr {slot}, i32 0, i32 {i}"
            ));
            let tag = self.field_tag(&layout, offset, &mml);
            let attach = self.state.tbaa.field_attachment(&name, tag);
            self.line(format!("store {} {}, ptr {ptr}{attach}", value.ty, value.repr));
        }
        let reg = self.next_reg();
        self.line(format!("{reg} = load %struct.{name}, ptr {slot}"));
        Ok(Some(Value {
            repr: reg,
            ty: format!("%struct.{name}"),
            mml: name,
        }))
    }

    // -- Helpers --

    fn field_tag(&mut self, layout: &StructLayout, offset: u64, field_mml: &str) -> u32 {
        let field_nodes: Vec<(u32, u64)> = layout
            .fields
            .iter()
            .map(|f| {
                let node = self.state.tbaa.scalar(&f.mml);
                (node, f.offset)
            })
            .collect();
        let struct_node = self.state.tbaa.struct_node(&layout.name, &field_nodes);
        let access = self.state.tbaa.scalar(field_mml);
        self.state.tbaa.access_tag(struct_node, access, offset)
    }

    fn llvm_of(&self, ty: Option<&TypeSpec>, fallback: &str) -> Result<String, CodeGenError> {
        match ty {
            Some(ty) => self.ti().llvm_type(ty),
            None => Ok(match fallback {
                "Int" => "i64".to_string(),
                other => other.to_string(),
            }),
        }
    }

    fn string_type_spec(&self) -> Result<TypeSpec, CodeGenError> {
        let id = self
            .state
            .index
            .named("String")
            .first()
            .cloned()
            .ok_or_else(|| CodeGenError::missing_type("the String type is not declared"))?;
        let mut spec = TypeSpec::named("String");
        if let TypeSpec::Ref(r) = &mut spec {
            r.resolved = Some(id);
        }
        Ok(spec)
    }
}

/// Collapse `App(App(f, a), b)` into `(f, [a, b])`.
pub(crate) fn collapse_chain(term: &Term) -> (&Term, Vec<&Expr>) {
    let mut args = Vec::new();
    let mut cursor = term;
    while let Term::App(app) = cursor {
        args.push(&app.arg);
        cursor = &app.func;
    }
    args.reverse();
    (cursor, args)
}

/// Does the body end in a direct self-call, possibly through conditionals?
pub(crate) fn tail_self_call(body: &Expr, self_id: &ResolvableId) -> bool {
    match body.result_term() {
        Some(Term::App(_)) => {
            let (callee, _) = collapse_chain(
                body.result_term()
                    .unwrap_or_else(|| unreachable!("compiler bug: result term vanished")),
            );
            matches!(callee, Term::Ref(r) if r.resolved.as_ref() == Some(self_id))
        }
        Some(Term::Cond(c)) => {
            tail_self_call(&c.if_true, self_id) || tail_self_call(&c.if_false, self_id)
        }
        _ => false,
    }
}

/// Register a `%struct.NAME = type { ... }` definition when `ty` is
/// struct-like; recurses into nested struct fields.
pub(crate) fn ensure_struct_defined(
    state: &mut CodeGenState<'_>,
    ti: &TypeInfo<'_>,
    ty: &TypeSpec,
) -> Result<(), CodeGenError> {
    let Some(layout) = ti.struct_layout(ty)? else {
        return Ok(());
    };
    let field_types: Vec<String> = layout.fields.iter().map(|f| f.llvm.clone()).collect();
    state.define_struct(&layout.name, &field_types);
    Ok(())
}

/// Eagerly declare an external native function so modules without callers
/// still carry the declaration. Selector and template natives never
/// declare anything.
pub(crate) fn declare_native(
    state: &mut CodeGenState<'_>,
    res: &Resolvable,
) -> Result<(), CodeGenError> {
    let Some(native) = &res.native else {
        return Ok(());
    };
    if native.selector().is_some() || native.template().is_some() {
        return Ok(());
    }
    let Some(sig) = res.type_spec.as_ref().and_then(TypeSpec::as_fn) else {
        return Ok(());
    };
    let symbol = native.attr("extern").unwrap_or(&res.name).to_string();
    let ti = TypeInfo::new(state.index);
    let abi = state.options.abi;

    let ret_llvm = ti.llvm_type(&sig.ret)?;
    let mut parts: Vec<String> = Vec::new();
    let ret_layout = ti.struct_layout(&sig.ret)?;
    let sret = matches!(
        &ret_layout,
        Some(layout) if classify_return(abi, layout) == ReturnClass::Sret
    );
    if sret {
        ensure_struct_defined(state, &ti, &sig.ret)?;
        parts.push(format!("ptr sret({ret_llvm}) align 8"));
    }

    for param_ty in &sig.params {
        if ti.is_unit(param_ty) {
            continue;
        }
        let llvm = ti.llvm_type(param_ty)?;
        match ti.struct_layout(param_ty)? {
            None => parts.push(llvm),
            Some(layout) => {
                ensure_struct_defined(state, &ti, param_ty)?;
                match classify_param(abi, &layout) {
                    ParamClass::Direct => parts.push(llvm),
                    ParamClass::ByvalPtr => parts.push(format!("ptr byval({llvm}) align 8")),
                    ParamClass::PlainPtr => parts.push("ptr".to_string()),
                    ParamClass::Split(split) => parts.extend(split),
                }
            }
        }
    }

    let decl_ret = if sret { "void" } else { ret_llvm.as_str() };
    state.declare(
        &symbol,
        format!("declare {decl_ret} @{symbol}({})", parts.join(", ")),
    );
    Ok(())
}

/// Emit `define internal void @NAME()` computing a non-literal global's
/// value and storing it; registered in `@llvm.global_ctors` by the caller.
pub(crate) fn emit_initializer(
    state: &mut CodeGenState<'_>,
    init_name: &str,
    global_symbol: &str,
    ty: &TypeSpec,
    body: &Expr,
) -> Result<(), CodeGenError> {
    let ti = TypeInfo::new(state.index);
    let mml = ti.mml_name(ty);
    let mut ctx = FnCtx {
        state,
        lines: Vec::new(),
        reg: 0,
        label: 0,
        block: "entry".to_string(),
        scope: FxHashMap::default(),
        ret_llvm: "void".to_string(),
        self_id: None,
        loop_info: None,
        header_slot: None,
        last_line: 0,
    };
    ctx.lines
        .push(format!("define internal void @{init_name}() {{"));
    ctx.lines.push("entry:".to_string());
    let value = ctx.emit_block_value(body)?;
    if let Some(v) = value {
        let attach = ctx.state.tbaa.scalar_attachment(&mml);
        ctx.line(format!(
            "store {} {}, ptr @{global_symbol}{attach}",
            v.ty, v.repr
        ));
    }
    ctx.line("ret void");
    ctx.lines.push("}".to_string());
    let rendered = ctx.lines.join("\n");
    state.functions.push(rendered);
    Ok(())
}
