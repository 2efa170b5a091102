//! Standard library injector.
//!
//! Prepends the fixed set of native types, aliases, operators, and intrinsic
//! function declarations to a freshly parsed module. Everything injected
//! carries `SourceOrigin::Synth`, which keeps it out of user diagnostics.
//!
//! The injector stands in for a module system: a proper one would import
//! these declarations from other files.

use mml_ir::{
    Assoc, BinOpDef, Bnd, Expr, FnParam, Lambda, Member, Module, NativeImpl, NativeStruct,
    SourceOrigin, Term, TypeAlias, TypeDef, TypeRef, TypeSpec, UnaryOpDef,
};

/// Precedence of prefix unary operators.
pub const PREFIX_PRECEDENCE: u8 = 95;
/// Precedence of postfix unary operators.
pub const POSTFIX_PRECEDENCE: u8 = 98;
/// Implicit precedence of juxtaposition (function application).
pub const JUXTAPOSITION_PRECEDENCE: u8 = 100;

pub fn inject_stdlib(module: &mut Module) {
    let mut members = Vec::with_capacity(module.members.len() + 48);
    members.extend(native_types());
    members.extend(type_aliases());
    members.extend(operators());
    members.extend(intrinsics());
    members.append(&mut module.members);
    module.members = members;
}

/// The three-field runtime heap layout shared by `String`, `Buffer`, and
/// the array types: `{ i64 length, ptr data, i64 __cap }`. `__cap` is the
/// heap witness: `>= 0` for heap allocations, `-1` for static data.
fn runtime_struct(name: &str, elem: TypeSpec) -> TypeSpec {
    TypeSpec::NativeStruct(NativeStruct {
        name: name.to_string(),
        fields: vec![
            ("length".to_string(), TypeSpec::prim("i64")),
            ("data".to_string(), TypeSpec::NativePointer(Box::new(elem))),
            ("__cap".to_string(), TypeSpec::prim("i64")),
        ],
    })
}

fn native_types() -> Vec<Member> {
    let prim = |name: &str, llvm: &str| {
        Member::TypeDef(TypeDef {
            origin: SourceOrigin::Synth,
            id: None,
            name: name.to_string(),
            type_spec: Some(TypeSpec::prim(llvm)),
            doc: None,
        })
    };
    let def = |name: &str, spec: TypeSpec| {
        Member::TypeDef(TypeDef {
            origin: SourceOrigin::Synth,
            id: None,
            name: name.to_string(),
            type_spec: Some(spec),
            doc: None,
        })
    };
    vec![
        prim("Int8", "i8"),
        prim("Int16", "i16"),
        prim("Int32", "i32"),
        prim("Int64", "i64"),
        prim("Float", "float"),
        prim("Double", "double"),
        prim("Bool", "i1"),
        prim("Char", "i8"),
        prim("SizeT", "i64"),
        def("Unit", TypeSpec::Unit),
        def(
            "CharPtr",
            TypeSpec::NativePointer(Box::new(TypeSpec::prim("i8"))),
        ),
        def("String", runtime_struct("String", TypeSpec::prim("i8"))),
        def("Buffer", runtime_struct("Buffer", TypeSpec::prim("i8"))),
        def("IntArray", runtime_struct("IntArray", TypeSpec::prim("i64"))),
        def(
            "StringArray",
            runtime_struct("StringArray", TypeSpec::named("String")),
        ),
    ]
}

fn type_aliases() -> Vec<Member> {
    let alias = |name: &str, target: &str| {
        Member::TypeAlias(TypeAlias {
            origin: SourceOrigin::Synth,
            id: None,
            name: name.to_string(),
            type_ref: TypeSpec::Ref(TypeRef::new(SourceOrigin::Synth, target)),
            type_spec: None,
            doc: None,
        })
    };
    vec![alias("Int", "Int64"), alias("Byte", "Int8"), alias("Word", "Int8")]
}

fn native_body(selector: &str) -> Expr {
    Expr::single(Term::Native(
        NativeImpl::new(SourceOrigin::Synth).with_attr("op", selector),
    ))
}

fn param(name: &str, ty: &str) -> FnParam {
    FnParam::new(
        SourceOrigin::Synth,
        name,
        Some(TypeSpec::Ref(TypeRef::new(SourceOrigin::Synth, ty))),
    )
}

fn borrowed_param(name: &str, ty: &str) -> FnParam {
    let mut p = param(name, ty);
    p.borrowed = true;
    p
}

fn bin_op(name: &str, precedence: u8, assoc: Assoc, operand: &str, ret: &str, selector: &str) -> Member {
    Member::BinOp(BinOpDef {
        origin: SourceOrigin::Synth,
        id: None,
        name: name.to_string(),
        precedence,
        assoc,
        lhs: param("a", operand),
        rhs: param("b", operand),
        ret_asc: Some(TypeSpec::Ref(TypeRef::new(SourceOrigin::Synth, ret))),
        type_spec: None,
        body: native_body(selector),
        doc: None,
    })
}

fn unary_op(name: &str, assoc: Assoc, operand: &str, ret: &str, body: Expr) -> Member {
    let precedence = match assoc {
        Assoc::Right => PREFIX_PRECEDENCE,
        Assoc::Left => POSTFIX_PRECEDENCE,
    };
    Member::UnaryOp(UnaryOpDef {
        origin: SourceOrigin::Synth,
        id: None,
        name: name.to_string(),
        precedence,
        assoc,
        param: param("a", operand),
        ret_asc: Some(TypeSpec::Ref(TypeRef::new(SourceOrigin::Synth, ret))),
        type_spec: None,
        body,
        doc: None,
    })
}

fn operators() -> Vec<Member> {
    use Assoc::{Left, Right};
    vec![
        bin_op("^", 90, Right, "Int", "Int", "xor"),
        bin_op("*", 85, Left, "Int", "Int", "mul"),
        bin_op("/", 85, Left, "Int", "Int", "sdiv"),
        bin_op("+", 80, Left, "Int", "Int", "add"),
        bin_op("-", 80, Left, "Int", "Int", "sub"),
        bin_op("<", 70, Left, "Int", "Bool", "icmp_slt"),
        bin_op("<=", 70, Left, "Int", "Bool", "icmp_sle"),
        bin_op(">", 70, Left, "Int", "Bool", "icmp_sgt"),
        bin_op(">=", 70, Left, "Int", "Bool", "icmp_sge"),
        bin_op("==", 60, Left, "Int", "Bool", "icmp_eq"),
        bin_op("!=", 60, Left, "Int", "Bool", "icmp_ne"),
        bin_op("and", 40, Left, "Bool", "Bool", "and"),
        bin_op("or", 30, Left, "Bool", "Bool", "or"),
        unary_op("-", Right, "Int", "Int", native_body("neg")),
        unary_op("+", Right, "Int", "Int", native_body("pos")),
        unary_op("not", Right, "Bool", "Bool", native_body("not")),
        // Postfix factorial, provided by the runtime.
        unary_op(
            "!",
            Left,
            "Int",
            "Int",
            Expr::single(Term::Native(
                NativeImpl::new(SourceOrigin::Synth).with_attr("extern", "mml_factorial"),
            )),
        ),
    ]
}

fn native_fn(name: &str, params: Vec<FnParam>, ret: &str, native: NativeImpl) -> Member {
    let mut lambda = Lambda::new(
        SourceOrigin::Synth,
        params,
        Expr::single(Term::Native(native)),
    );
    lambda.ret_asc = Some(if ret == "Unit" {
        TypeSpec::Unit
    } else {
        TypeSpec::Ref(TypeRef::new(SourceOrigin::Synth, ret))
    });
    Member::Bnd(Bnd {
        origin: SourceOrigin::Synth,
        id: None,
        name: name.to_string(),
        value: Expr::single(Term::Lambda(Box::new(lambda))),
        type_spec: None,
        type_asc: None,
        doc: None,
    })
}

fn intrinsics() -> Vec<Member> {
    let pure = || NativeImpl::new(SourceOrigin::Synth).with_attr("mem", "pure");
    let alloc = || NativeImpl::new(SourceOrigin::Synth).with_attr("mem", "alloc");
    let mut members = vec![
        native_fn("print", vec![borrowed_param("s", "String")], "Unit", pure()),
        native_fn("println", vec![borrowed_param("s", "String")], "Unit", pure()),
        native_fn(
            "concat",
            vec![borrowed_param("a", "String"), borrowed_param("b", "String")],
            "String",
            alloc(),
        ),
        native_fn("to_string", vec![param("n", "Int")], "String", alloc()),
        native_fn("readline", Vec::new(), "String", alloc()),
    ];
    // Free/clone stubs the ownership analyzer targets. Parameters are
    // borrow-marked so the analyzer does not recurse into its own cleanup.
    for ty in ["String", "Buffer", "IntArray", "StringArray"] {
        members.push(native_fn(
            &format!("__free_{ty}"),
            vec![borrowed_param("v", ty)],
            "Unit",
            pure(),
        ));
        members.push(native_fn(
            &format!("__clone_{ty}"),
            vec![borrowed_param("v", ty)],
            ty,
            alloc(),
        ));
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use mml_ir::{assign_ids, ResolvableKind, ResolvablesIndex};

    fn injected_module() -> Module {
        let mut module = Module::new(SourceOrigin::Synth, "Test");
        inject_stdlib(&mut module);
        assign_ids(&mut module);
        module
    }

    #[test]
    fn injects_everything_synthetic() {
        let module = injected_module();
        assert!(module.members.iter().all(|m| m.origin().is_synth()));
    }

    #[test]
    fn binary_and_unary_minus_coexist() {
        let module = injected_module();
        let index = ResolvablesIndex::build(&module);
        let minus = index.named("-");
        assert_eq!(minus.len(), 2);
        let kinds: Vec<ResolvableKind> =
            minus.iter().map(|id| index.get(id).unwrap().kind).collect();
        assert!(kinds.contains(&ResolvableKind::BinOp));
        assert!(kinds.contains(&ResolvableKind::UnaryOp));
    }

    #[test]
    fn intrinsics_carry_memory_effects() {
        let module = injected_module();
        let index = ResolvablesIndex::build(&module);
        let concat = index.get(&index.named("concat")[0]).unwrap();
        assert_eq!(
            concat.native.as_ref().unwrap().mem_effect(),
            mml_ir::MemEffect::Alloc
        );
        assert!(concat.params.iter().all(|p| p.borrowed));
        let print = index.get(&index.named("print")[0]).unwrap();
        assert_eq!(
            print.native.as_ref().unwrap().mem_effect(),
            mml_ir::MemEffect::Pure
        );
    }

    #[test]
    fn string_type_is_the_runtime_layout() {
        let module = injected_module();
        let string_def = module.members.iter().find_map(|m| match m {
            Member::TypeDef(d) if d.name == "String" => Some(d),
            _ => None,
        });
        let TypeSpec::NativeStruct(s) = string_def.unwrap().type_spec.as_ref().unwrap() else {
            panic!("String must be a native struct");
        };
        let names: Vec<&str> = s.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["length", "data", "__cap"]);
    }

    #[test]
    fn aliases_point_at_native_ints() {
        let module = injected_module();
        let int_alias = module.members.iter().find_map(|m| match m {
            Member::TypeAlias(a) if a.name == "Int" => Some(a),
            _ => None,
        });
        assert_eq!(
            int_alias.unwrap().type_ref.ref_name(),
            Some("Int64")
        );
    }
}
