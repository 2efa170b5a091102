use mml_ir::{ResolvablesIndex, SourceInfo};
use mml_sem::{run_pipeline, PhaseState};

use crate::{emit_module, CompileMode, EmitOptions, TargetAbi};

fn compile_with(source: &str, options: &EmitOptions) -> String {
    let info = SourceInfo::new(source);
    let out = mml_parse::parse(&info, "test");
    let state = run_pipeline(PhaseState::seed(out.module));
    assert_eq!(state.errors, vec![], "semantic pipeline must be clean");
    let owned = mml_own::analyze(state.module, &state.index);
    assert_eq!(owned.errors, vec![], "ownership must be clean");
    let index = ResolvablesIndex::build(&owned.module);
    emit_module(&owned.module, &index, options).expect("emission succeeds")
}

fn compile(source: &str) -> String {
    compile_with(source, &EmitOptions::default())
}

#[test]
fn hello_world() {
    let ir = compile(r#"fn main(): Unit = println "hello";"#);
    assert!(ir.contains("define void @test_main()"), "{ir}");
    assert!(ir.contains("call void @println"), "{ir}");
    assert!(ir.contains(r#"c"hello\00""#), "{ir}");
    // Binary mode synthesizes the C entry point.
    assert!(ir.contains("define i32 @main(i32 %argc, ptr %argv)"), "{ir}");
    assert!(ir.contains("%struct.String = type { i64, ptr, i64 }"), "{ir}");
}

#[test]
fn custom_operator_mangles_with_arity() {
    let ir = compile("op ** (a: Int, b: Int) 80 left = a * b;  fn main(): Int = 2 ** 3;");
    assert!(ir.contains("define i64 @test_op.star_star.2"), "{ir}");
    assert!(ir.contains("call i64 @test_op.star_star.2"), "{ir}");
    // The exit code flows out through the synthesized main.
    assert!(ir.contains("trunc i64"), "{ir}");
}

#[test]
fn precedence_lowered_arithmetic() {
    let ir = compile("fn main(): Unit = println (to_string (1 + 2 * 3));");
    assert!(ir.contains("mul i64"), "{ir}");
    assert!(ir.contains("add i64"), "{ir}");
    assert!(ir.contains("call"), "{ir}");
}

#[test]
fn partial_application_defines_the_eta_function() {
    let ir = compile(
        r#"let greet = concat "Hello, "; fn main(): Unit = println (greet "world");"#,
    );
    assert!(
        ir.contains("define %struct.String @test_greet(%struct.String %p0)"),
        "{ir}"
    );
    assert!(ir.contains("call %struct.String @test_greet"), "{ir}");
}

#[test]
fn tail_recursion_loopifies() {
    let ir = compile(
        "fn sum(i: Int, acc: Int): Int = if i < 10 then sum (i + 1) (acc + i) else acc;\
         fn main(): Int = sum 0 0;",
    );
    assert!(ir.contains("loop.header"), "{ir}");
    assert!(ir.contains("phi i64"), "{ir}");
    assert!(ir.contains("loop.latch"), "{ir}");
    assert!(ir.contains("loop.exit.0"), "{ir}");
}

#[test]
fn no_tco_disables_loopification() {
    let options = EmitOptions {
        no_tco: true,
        ..EmitOptions::default()
    };
    let ir = compile_with(
        "fn sum(i: Int, acc: Int): Int = if i < 10 then sum (i + 1) (acc + i) else acc;",
        &options,
    );
    assert!(!ir.contains("loop.header"), "{ir}");
    assert!(ir.contains("call i64 @test_sum"), "{ir}");
}

#[test]
fn hole_aborts_with_position() {
    let ir = compile("fn main(): Int = ???;");
    assert!(
        ir.contains("call void @__mml_sys_hole(i64 1, i64 18, i64 1, i64 21)"),
        "{ir}"
    );
    assert!(ir.contains("unreachable"), "{ir}");
    assert!(ir.contains("declare void @__mml_sys_hole(i64, i64, i64, i64)"), "{ir}");
}

#[test]
fn empty_module_emits_the_shell() {
    let ir = compile("");
    assert!(ir.contains("target triple"), "{ir}");
    // Injected natives are declared even with no callers.
    assert!(ir.contains("declare void @println"), "{ir}");
    assert!(ir.contains("@concat"), "{ir}");
    assert!(!ir.contains("define i32 @main"), "no user main, no entry: {ir}");
}

#[test]
fn uncalled_user_native_produces_only_a_declare() {
    let ir = compile("fn magic(n: Int): Int = @native;");
    assert!(ir.contains("declare i64 @magic(i64)"), "{ir}");
    assert!(!ir.contains("define i64 @magic"), "{ir}");
}

#[test]
fn literal_global_binding() {
    let ir = compile("let answer = 42; fn main(): Int = answer;");
    assert!(ir.contains("@test_answer = global i64 42"), "{ir}");
    assert!(ir.contains("load i64, ptr @test_answer"), "{ir}");
}

#[test]
fn computed_global_uses_a_constructor() {
    let ir = compile("let sq = 6 * 7; fn main(): Int = sq;");
    assert!(ir.contains("@test_sq = global i64 zeroinitializer"), "{ir}");
    assert!(ir.contains("define internal void @_init_global_sq()"), "{ir}");
    assert!(ir.contains("@llvm.global_ctors"), "{ir}");
}

#[test]
fn x86_64_strings_pass_byval_and_return_sret() {
    let ir = compile(r#"fn main(): Unit = println (concat "a" "b");"#);
    assert!(
        ir.contains("declare void @println(ptr byval(%struct.String) align 8)"),
        "{ir}"
    );
    assert!(ir.contains("sret(%struct.String)"), "{ir}");
}

#[test]
fn aarch64_strings_pass_plain_ptr() {
    let options = EmitOptions {
        triple: "aarch64-unknown-linux-gnu".to_string(),
        abi: TargetAbi::AArch64,
        mode: CompileMode::Binary,
        no_tco: false,
    };
    let ir = compile_with(r#"fn main(): Unit = println "hi";"#, &options);
    assert!(ir.contains("declare void @println(ptr)"), "{ir}");
    assert!(!ir.contains("byval"), "{ir}");
}

#[test]
fn struct_construction_stores_fields_with_tbaa() {
    let ir = compile(
        "type Point = { x: Int, y: Int }; fn origin(): Point = Point 1 2;",
    );
    assert!(ir.contains("%struct.Point = type { i64, i64 }"), "{ir}");
    assert!(ir.contains("getelementptr inbounds %struct.Point"), "{ir}");
    assert!(ir.contains("!tbaa"), "{ir}");
    assert!(ir.contains("load %struct.Point"), "{ir}");
}

#[test]
fn field_selection_extracts_by_index() {
    let ir = compile("type Point = { x: Int, y: Int }; fn getx(p: Point): Int = p.y;");
    assert!(ir.contains("extractvalue %struct.Point %p, 1"), "{ir}");
}

#[test]
fn tail_conditional_returns_per_branch() {
    let ir = compile("fn f(b: Bool): Int = if b then 1 else 2;");
    assert!(ir.contains("then0:"), "{ir}");
    assert!(ir.contains("else0:"), "{ir}");
    // Both branches return directly; no merge block needed in tail position.
    assert!(!ir.contains("merge0:"), "{ir}");
}

#[test]
fn value_conditional_merges_with_phi() {
    let ir = compile("fn f(b: Bool): Int = (if b then 1 else 2) + 10;");
    assert!(ir.contains("merge0:"), "{ir}");
    assert!(ir.contains("phi i64"), "{ir}");
}

#[test]
fn unit_conditional_has_no_phi() {
    let ir = compile(r#"fn g(b: Bool): Unit = if b then print "a" else print "b";"#);
    assert!(!ir.contains("phi"), "{ir}");
}

#[test]
fn tbaa_metadata_lands_at_the_end() {
    let ir = compile(r#"fn main(): Unit = println "x";"#);
    assert!(ir.contains("!{!\"mml-tbaa-root\"}"), "{ir}");
    assert!(ir.contains("!alias.scope"), "{ir}");
    assert!(ir.contains("!noalias"), "{ir}");
    // String's struct node carries the C offsets of data and __cap.
    assert!(ir.contains("i64 8"), "{ir}");
    assert!(ir.contains("i64 16"), "{ir}");
}

#[test]
fn library_mode_synthesizes_no_main() {
    let options = EmitOptions {
        mode: CompileMode::Library,
        ..EmitOptions::default()
    };
    let ir = compile_with("fn main(): Int = 7;", &options);
    assert!(ir.contains("define i64 @test_main()"), "{ir}");
    assert!(!ir.contains("define i32 @main"), "{ir}");
}

#[test]
fn ownership_frees_lower_to_runtime_calls() {
    let ir = compile(r#"fn main(): Unit = println (concat "a" "b");"#);
    assert!(ir.contains("@__free_String"), "{ir}");
}

#[test]
fn emission_is_deterministic() {
    let src = r#"fn main(): Unit = println (to_string (1 + 2));"#;
    assert_eq!(compile(src), compile(src));
}
