use pretty_assertions::assert_eq;

use mml_ir::{pretty, Assoc, Member, SourceInfo, Term, TypeSpec};

use crate::{parse, ParseError, ParseOutput, ParseWarning};

fn parse_src(source: &str) -> ParseOutput {
    let info = SourceInfo::new(source);
    parse(&info, "Test")
}

#[test]
fn let_binding() {
    let out = parse_src("let answer = 42;");
    assert!(out.errors.is_empty());
    assert_eq!(out.module.members.len(), 1);
    let Member::Bnd(bnd) = &out.module.members[0] else {
        panic!("expected a binding");
    };
    assert_eq!(bnd.name, "answer");
    assert_eq!(pretty::expr(&bnd.value), "42");
}

#[test]
fn let_with_ascription() {
    let out = parse_src("let x: Int = 1;");
    let Member::Bnd(bnd) = &out.module.members[0] else {
        panic!("expected a binding");
    };
    assert_eq!(bnd.type_asc.as_ref().unwrap().ref_name(), Some("Int"));
}

#[test]
fn fn_is_binding_with_lambda() {
    let out = parse_src("fn add(a: Int, b: Int): Int = a + b;");
    assert!(out.errors.is_empty());
    let Member::Bnd(bnd) = &out.module.members[0] else {
        panic!("expected a binding");
    };
    let lambda = bnd.lambda().expect("function value is a lambda");
    assert_eq!(lambda.params.len(), 2);
    assert_eq!(lambda.params[0].name, "a");
    assert_eq!(lambda.ret_asc.as_ref().unwrap().ref_name(), Some("Int"));
    // Flat body: three terms, precedence not yet applied.
    assert_eq!(lambda.body.terms.len(), 3);
}

#[test]
fn expressions_stay_flat() {
    let out = parse_src("let v = 1 + 2 * 3;");
    let Member::Bnd(bnd) = &out.module.members[0] else {
        panic!("expected a binding");
    };
    assert_eq!(bnd.value.terms.len(), 5);
}

#[test]
fn groups_and_tuples() {
    let out = parse_src("let g = (1 + 2); let t = (1, 2); let u = ();");
    assert!(out.errors.is_empty());
    let Member::Bnd(g) = &out.module.members[0] else { panic!() };
    assert!(matches!(g.value.terms[0], Term::Group(_)));
    let Member::Bnd(t) = &out.module.members[1] else { panic!() };
    let Term::Tuple(tuple) = &t.value.terms[0] else {
        panic!("expected tuple");
    };
    assert_eq!(tuple.elems.len(), 2);
    let Member::Bnd(u) = &out.module.members[2] else { panic!() };
    assert!(matches!(u.value.terms[0], Term::Unit { .. }));
}

#[test]
fn conditional_with_dangling_else() {
    let out = parse_src("fn f(x: Int): Int = if x then if x then 1 else 2 else 3;");
    assert!(out.errors.is_empty());
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    let body = &bnd.lambda().unwrap().body;
    let Term::Cond(outer) = &body.terms[0] else {
        panic!("expected conditional");
    };
    // The inner conditional took the first else; outer kept the 3.
    assert!(matches!(outer.if_true.terms[0], Term::Cond(_)));
    assert_eq!(pretty::expr(&outer.if_false), "3");
}

#[test]
fn operator_definition_binary() {
    let out = parse_src("op ** (a: Int, b: Int) 80 left = a * b;");
    assert!(out.errors.is_empty());
    let Member::BinOp(op) = &out.module.members[0] else {
        panic!("expected binary operator");
    };
    assert_eq!(op.name, "**");
    assert_eq!(op.precedence, 80);
    assert_eq!(op.assoc, Assoc::Left);
    assert_eq!(op.lhs.name, "a");
}

#[test]
fn operator_definition_unary_prefix() {
    let out = parse_src("op not (b: Bool) 95 right = if b then false else true;");
    let Member::UnaryOp(op) = &out.module.members[0] else {
        panic!("expected unary operator");
    };
    assert_eq!(op.name, "not");
    assert!(op.is_prefix());
}

#[test]
fn type_declarations() {
    let out = parse_src(
        "type Int = Int64; type Point = { x: Int, y: Int }; type Int64 = @native[t=i64];",
    );
    assert!(out.errors.is_empty());
    assert!(matches!(out.module.members[0], Member::TypeAlias(_)));
    let Member::TypeStruct(point) = &out.module.members[1] else {
        panic!("expected struct type");
    };
    assert_eq!(point.fields.len(), 2);
    let Member::TypeDef(def) = &out.module.members[2] else {
        panic!("expected native type def");
    };
    assert_eq!(
        def.type_spec,
        Some(TypeSpec::NativePrimitive("i64".into()))
    );
}

#[test]
fn native_function_with_attrs() {
    let out = parse_src(r#"fn readline(): String = @native[mem=alloc];"#);
    assert!(out.errors.is_empty());
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    let native = bnd.native().expect("native body");
    assert_eq!(native.attr("mem"), Some("alloc"));
}

#[test]
fn borrowed_parameter_marker() {
    let out = parse_src("fn show(&s: String): Unit = print s;");
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    assert!(bnd.lambda().unwrap().params[0].borrowed);
}

#[test]
fn qualified_reference_chain() {
    let out = parse_src("let v = point.x;");
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    let Term::Ref(r) = &bnd.value.terms[0] else {
        panic!("expected ref");
    };
    assert_eq!(r.name, "x");
    assert_eq!(r.qualifier.as_ref().unwrap().name, "point");
}

#[test]
fn hole_and_placeholder() {
    let out = parse_src("fn main(): Int = ???;");
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    assert!(matches!(
        bnd.lambda().unwrap().body.terms[0],
        Term::Hole(_)
    ));
}

#[test]
fn doc_comment_attaches_to_next_member() {
    let out = parse_src("#- adds things -#\nfn add(a: Int): Int = a;\n");
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    assert_eq!(bnd.doc.as_ref().unwrap().text, "adds things");
}

#[test]
fn trailing_doc_comment_warns() {
    let out = parse_src("let x = 1;\n#- lost -#\n");
    assert_eq!(out.warnings.len(), 1);
    assert!(matches!(
        out.warnings[0],
        ParseWarning::UnattachedDocComment { .. }
    ));
}

#[test]
fn member_recovery_at_semicolon() {
    let out = parse_src("let = 1;\nlet ok = 2;");
    assert_eq!(out.module.members.len(), 2);
    assert!(matches!(out.module.members[0], Member::ParseError(_)));
    let Member::Bnd(bnd) = &out.module.members[1] else {
        panic!("second member should have parsed");
    };
    assert_eq!(bnd.name, "ok");
    assert!(out
        .errors
        .iter()
        .any(|e| matches!(e, ParseError::Member { .. })));
}

#[test]
fn member_recovery_at_next_keyword() {
    // No semicolon before the next member start; recovery stops at `fn`.
    let out = parse_src("let x = \nfn main(): Int = 1;");
    assert!(matches!(out.module.members[0], Member::ParseError(_)));
    let Member::Bnd(bnd) = &out.module.members[1] else {
        panic!("function should have parsed");
    };
    assert_eq!(bnd.name, "main");
}

#[test]
fn parse_error_member_keeps_failed_code() {
    let out = parse_src("op ?? = broken;");
    let Member::ParseError(err) = &out.module.members[0] else {
        panic!("expected parse error member");
    };
    assert!(err.failed_code.contains("broken"));
}

#[test]
fn malformed_type_identifier() {
    let out = parse_src("type Foo_bar = Int;");
    assert!(out
        .errors
        .iter()
        .any(|e| matches!(e, ParseError::MalformedIdentifier { .. })));
    assert!(matches!(out.module.members[0], Member::ParseError(_)));
}

#[test]
fn spans_anchor_to_source() {
    let src = "fn main(): Int = ???;";
    let out = parse_src(src);
    let Member::Bnd(bnd) = &out.module.members[0] else { panic!() };
    let Term::Hole(hole) = &bnd.lambda().unwrap().body.terms[0] else {
        panic!();
    };
    let span = hole.origin.span().unwrap();
    assert_eq!((span.start.line, span.start.col), (1, 18));
    assert_eq!((span.end.line, span.end.col), (1, 21));
}

#[test]
fn empty_module_parses() {
    let out = parse_src("");
    assert!(out.errors.is_empty());
    assert!(out.module.members.is_empty());
}
