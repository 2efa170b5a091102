//! End-to-end pipeline scenarios: exact source in, observable state out.

use pretty_assertions::assert_eq;

use mml_diagnostic::ErrorCode;
use mml_ir::{pretty, Member};
use mml_llvm::CompileMode;

use crate::{compile, module_name_from_stem, Config, CompilerState};

fn compile_ok(source: &str) -> CompilerState {
    let state = compile(source, "Test", Config::default());
    assert_eq!(state.errors, vec![], "expected a clean compile");
    assert!(state.llvm_ir.is_some(), "expected emitted IR");
    state
}

fn ir(state: &CompilerState) -> &str {
    state.llvm_ir.as_deref().unwrap_or("")
}

#[test]
fn hello_world() {
    let state = compile_ok(r#"fn main(): Unit = println "hello";"#);
    let ir = ir(&state);
    assert!(ir.contains("call void @println"), "{ir}");
    assert!(ir.contains(r#"c"hello\00""#), "{ir}");
    assert!(ir.contains("define i32 @main(i32 %argc, ptr %argv)"), "{ir}");
}

#[test]
fn custom_binary_operator() {
    let state = compile_ok("op ** (a: Int, b: Int) 80 left = a * b;  fn main(): Int = 2 ** 3;");
    let ir = ir(&state);
    assert!(ir.contains("define i64 @test_op.star_star.2"), "{ir}");
    assert!(ir.contains("call i64 @test_op.star_star.2"), "{ir}");
}

#[test]
fn precedence_shapes_the_tree() {
    let state = compile_ok("fn main(): Unit = println (to_string (1 + 2 * 3));");
    let main = state
        .module
        .members
        .iter()
        .find_map(|m| match m {
            Member::Bnd(b) if b.name == "main" => Some(b),
            _ => None,
        })
        .unwrap();
    let body = pretty::expr(&main.lambda().unwrap().body);
    // Ownership may wrap the allocation; the precedence-shaped application
    // survives inside it.
    assert!(body.contains("(to_string (+ 1 (* 2 3)))"), "{body}");
}

#[test]
fn partial_application() {
    let state = compile_ok(
        r#"let greet = concat "Hello, "; fn main(): Unit = println (greet "world");"#,
    );
    let ir = ir(&state);
    assert!(
        ir.contains("define %struct.String @test_greet(%struct.String %p0)"),
        "{ir}"
    );
}

#[test]
fn tail_recursion() {
    let state = compile_ok(
        "fn sum(i: Int, acc: Int): Int = if i < 10 then sum (i + 1) (acc + i) else acc;\
         fn main(): Int = sum 0 0;",
    );
    let ir = ir(&state);
    assert!(ir.contains("loop.header"), "{ir}");
    assert!(ir.contains("phi i64"), "{ir}");
    assert!(ir.contains("loop.latch"), "{ir}");
}

#[test]
fn hole_abort_carries_the_source_position() {
    let state = compile_ok("fn main(): Int = ???;");
    assert!(
        ir(&state).contains("call void @__mml_sys_hole(i64 1, i64 18, i64 1, i64 21)"),
        "{}",
        ir(&state)
    );
}

#[test]
fn duplicate_against_stdlib_is_resilient() {
    let state = compile(
        "fn print(s: String): Unit = println s;",
        "Test",
        Config::default(),
    );
    let dups: Vec<_> = state
        .errors
        .iter()
        .filter(|e| e.code == ErrorCode::DuplicateName)
        .collect();
    assert_eq!(dups.len(), 1, "exactly one duplicate-name error");
    // The surfaced span is the user's line, not the synthetic stdlib.
    let span = dups[0].user_span().expect("a user span");
    assert_eq!(span.start.line, 1);
    assert!(state.llvm_ir.is_none(), "errors suppress emission");
}

#[test]
fn empty_module_compiles_to_a_shell() {
    let state = compile_ok("");
    let ir = ir(&state);
    assert!(ir.contains("target triple"), "{ir}");
    assert!(ir.contains("declare void @println"), "{ir}");
}

#[test]
fn errors_are_deterministic() {
    let source = "let x = nope; fn f(): Int = true;";
    let a = compile(source, "Test", Config::default());
    let b = compile(source, "Test", Config::default());
    assert_eq!(a.errors, b.errors);
    assert!(a.llvm_ir.is_none());
}

#[test]
fn emission_is_deterministic() {
    let source = r#"fn main(): Unit = println (to_string (6 * 7));"#;
    let a = compile(source, "Test", Config::default());
    let b = compile(source, "Test", Config::default());
    assert_eq!(a.llvm_ir, b.llvm_ir);
}

#[test]
fn no_tco_config_is_honored() {
    let config = Config {
        no_tco: true,
        ..Config::default()
    };
    let state = compile(
        "fn sum(i: Int, acc: Int): Int = if i < 10 then sum (i + 1) (acc + i) else acc;",
        "Test",
        config,
    );
    assert_eq!(state.errors, vec![]);
    assert!(!ir(&state).contains("loop.header"), "{}", ir(&state));
}

#[test]
fn library_mode_skips_the_entry_point() {
    let config = Config {
        mode: CompileMode::Library,
        ..Config::default()
    };
    let state = compile("fn main(): Int = 7;", "Test", config);
    assert_eq!(state.errors, vec![]);
    assert!(!ir(&state).contains("define i32 @main"), "{}", ir(&state));
}

#[test]
fn timings_cover_every_phase() {
    let state = compile_ok("fn main(): Int = 1;");
    let names: Vec<&str> = state
        .timings
        .entries()
        .iter()
        .map(|(n, _)| n.as_str())
        .collect();
    assert!(names.contains(&"parse"));
    assert!(names.iter().any(|n| n.contains("typecheck")));
    assert!(names.contains(&"ownership"));
    assert!(names.contains(&"codegen"));
}

#[test]
fn unattached_doc_comment_warns() {
    let state = compile("let x = 1;\n#- lost -#\n", "Test", Config::default());
    assert_eq!(state.errors, vec![]);
    assert!(state
        .warnings
        .iter()
        .any(|w| w.code == ErrorCode::UnattachedDocComment));
}

#[test]
fn malformed_identifier_surfaces_as_id_error() {
    let state = compile("type Foo_bar = Int;", "Test", Config::default());
    assert!(state.errors.iter().any(|e| e.code == ErrorCode::ParseIdError));
}

#[test]
fn module_names_derive_from_stems() {
    assert_eq!(module_name_from_stem("hello-world"), "HelloWorld");
    assert_eq!(module_name_from_stem("my_mod"), "MyMod");
    assert_eq!(module_name_from_stem("plain"), "Plain");
    assert_eq!(module_name_from_stem("a b"), "AB");
}

#[test]
fn semantic_errors_reference_their_phase() {
    let state = compile("let x = nope;", "Test", Config::default());
    let err = state
        .errors
        .iter()
        .find(|e| e.code == ErrorCode::UndefinedRef)
        .expect("an undefined-ref error");
    assert_eq!(err.phase, "mml_sem::phases::ref_resolve");
}
