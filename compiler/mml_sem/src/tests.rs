use pretty_assertions::assert_eq;
use proptest::prelude::*;

use mml_diagnostic::ErrorCode;
use mml_ir::{pretty, Member, SourceInfo, Term};

use crate::{phases, run_pipeline, PhaseState};

fn pipeline(source: &str) -> PhaseState {
    let info = SourceInfo::new(source);
    let out = mml_parse::parse(&info, "Test");
    run_pipeline(PhaseState::seed(out.module))
}

fn body_of<'a>(state: &'a PhaseState, name: &str) -> &'a mml_ir::Expr {
    let bnd = state
        .module
        .members
        .iter()
        .find_map(|m| match m {
            Member::Bnd(b) if b.name == name => Some(b),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no binding named {name}"));
    match bnd.lambda() {
        Some(lambda) => &lambda.body,
        None => &bnd.value,
    }
}

fn has_error(state: &PhaseState, code: ErrorCode) -> bool {
    state.errors.iter().any(|e| e.code == code)
}

#[test]
fn empty_module_pipeline_is_clean() {
    let state = pipeline("");
    assert_eq!(state.errors, vec![]);
}

#[test]
fn precedence_juxtaposition_over_operators() {
    let state = pipeline("fn main(): Unit = println (to_string (1 + 2 * 3));");
    assert_eq!(state.errors, vec![]);
    assert_eq!(
        pretty::expr(body_of(&state, "main")),
        "(println (to_string (+ 1 (* 2 3))))"
    );
}

#[test]
fn precedence_symmetry() {
    let a = pipeline("fn f(a: Int, b: Int, c: Int): Int = a + b * c;");
    let b = pipeline("fn f(a: Int, b: Int, c: Int): Int = a + (b * c);");
    assert_eq!(
        pretty::expr(body_of(&a, "f")),
        pretty::expr(body_of(&b, "f"))
    );
}

#[test]
fn application_is_left_associative() {
    let state = pipeline(
        "fn h(a: Int, b: Int, c: Int): Int = a; fn g(): Int = h 1 2 3;",
    );
    assert_eq!(state.errors, vec![]);
    assert_eq!(pretty::expr(body_of(&state, "g")), "(h 1 2 3)");
}

#[test]
fn custom_binary_operator() {
    let state = pipeline("op ** (a: Int, b: Int) 80 left = a * b;  fn main(): Int = 2 ** 3;");
    assert_eq!(state.errors, vec![]);
    assert_eq!(pretty::expr(body_of(&state, "main")), "(** 2 3)");
}

#[test]
fn prefix_and_postfix_unary() {
    let state = pipeline("fn f(x: Int): Int = - x + x !;");
    assert_eq!(state.errors, vec![]);
    assert_eq!(pretty::expr(body_of(&state, "f")), "(+ (- x) (! x))");
}

#[test]
fn right_associative_operator() {
    // `^` is injected right-associative.
    let state = pipeline("fn f(a: Int, b: Int, c: Int): Int = a ^ b ^ c;");
    assert_eq!(state.errors, vec![]);
    assert_eq!(pretty::expr(body_of(&state, "f")), "(^ a (^ b c))");
}

#[test]
fn nullary_function_in_value_position_gets_unit() {
    let state = pipeline("fn zero(): Int = 1; let z: Int = zero;");
    assert_eq!(state.errors, vec![]);
    // The binding RHS became an application to the unit literal, which the
    // checker then eta-reduces into a plain value of type Int.
    let z = body_of(&state, "z");
    assert_eq!(pretty::expr(z), "(zero ())");
}

#[test]
fn duplicate_against_stdlib_reports_once_at_user_span() {
    let state = pipeline("fn print(s: String): Unit = println s;");
    let dups: Vec<_> = state
        .errors
        .iter()
        .filter(|e| e.code == ErrorCode::DuplicateName)
        .collect();
    assert_eq!(dups.len(), 1);
    // The first occurrence is the injected stdlib (synthetic); the surfaced
    // span must be the user's.
    let span = dups[0].user_span().expect("diagnostic has a user span");
    assert_eq!(span.start.line, 1);
    // The duplicate is wrapped, the original survives.
    assert!(state
        .module
        .members
        .iter()
        .any(|m| matches!(m, Member::Duplicate(_))));
}

#[test]
fn binary_and_unary_user_operators_coexist() {
    let state = pipeline(
        "op +++ (a: Int, b: Int) 80 left = a + b; op +++ (a: Int) 95 right = a;",
    );
    assert!(!has_error(&state, ErrorCode::DuplicateName));
}

#[test]
fn duplicate_parameter_invalidates_function() {
    let state = pipeline("fn f(a: Int, a: Int): Int = a;");
    assert!(has_error(&state, ErrorCode::DuplicateName));
    assert!(state
        .module
        .members
        .iter()
        .any(|m| matches!(m, Member::Invalid(_))));
}

#[test]
fn undefined_reference_invalidates_expression() {
    let state = pipeline("let x = nope;");
    assert!(has_error(&state, ErrorCode::UndefinedRef));
    let x = body_of(&state, "x");
    assert!(matches!(x.terms[0], Term::Invalid(_)));
}

#[test]
fn value_binding_cannot_reference_itself() {
    let state = pipeline("let x = x;");
    assert!(has_error(&state, ErrorCode::UndefinedRef));
}

#[test]
fn recursive_function_resolves() {
    let state = pipeline(
        "fn sum(i: Int, acc: Int): Int = if i < 10 then sum (i + 1) (acc + i) else acc;",
    );
    assert_eq!(state.errors, vec![]);
    assert_eq!(
        pretty::expr(body_of(&state, "sum")),
        "(if (< i 10) (sum (+ i 1) (+ acc i)) acc)"
    );
}

#[test]
fn mutually_recursive_functions_resolve() {
    let state = pipeline(
        "fn even(n: Int): Bool = if n == 0 then true else odd (n - 1);\
         fn odd(n: Int): Bool = if n == 0 then false else even (n - 1);",
    );
    assert_eq!(state.errors, vec![]);
}

#[test]
fn unknown_type_is_reported() {
    let state = pipeline("let v: Nope = 1;");
    assert!(has_error(&state, ErrorCode::UndefinedTypeRef));
}

#[test]
fn alias_chains_resolve() {
    let state = pipeline("type MyInt = Int; let v: MyInt = 1;");
    assert_eq!(state.errors, vec![]);
}

#[test]
fn cyclic_aliases_are_detected() {
    let state = pipeline("type A = B; type B = A;");
    assert!(has_error(&state, ErrorCode::CyclicTypeAlias));
}

#[test]
fn body_type_mismatch() {
    let state = pipeline("fn f(): Int = true;");
    assert!(has_error(&state, ErrorCode::TypeMismatch));
}

#[test]
fn conditional_branch_mismatch() {
    let state = pipeline(r#"fn f(b: Bool): Int = if b then 1 else "s";"#);
    assert!(has_error(&state, ErrorCode::ConditionalBranchTypeMismatch));
}

#[test]
fn conditional_guard_must_be_bool() {
    let state = pipeline("fn f(x: Int): Int = if x then 1 else 2;");
    assert!(has_error(&state, ErrorCode::TypeMismatch));
}

#[test]
fn typed_hole_is_accepted() {
    let state = pipeline("fn main(): Int = ???;");
    assert_eq!(state.errors, vec![]);
    let body = body_of(&state, "main");
    let Term::Hole(hole) = &body.terms[0] else {
        panic!("expected hole");
    };
    assert!(hole.type_spec.is_some());
}

#[test]
fn untyped_hole_is_rejected() {
    let state = pipeline("let h = ???;");
    assert!(has_error(&state, ErrorCode::UntypedHoleInBinding));
}

#[test]
fn missing_parameter_type() {
    let state = pipeline("fn f(x): Int = 1;");
    assert!(has_error(&state, ErrorCode::MissingParameterType));
}

#[test]
fn oversaturated_application() {
    let state = pipeline("fn f(x: Int): Int = x; fn g(): Int = f 1 2;");
    assert!(has_error(&state, ErrorCode::OversaturatedApplication));
}

#[test]
fn applying_a_value_is_invalid() {
    let state = pipeline("let v = 1; fn g(): Int = v 2;");
    assert!(has_error(&state, ErrorCode::InvalidApplication));
}

#[test]
fn literal_in_function_position_is_dangling() {
    let state = pipeline("fn g(): Int = 1 2;");
    assert!(has_error(&state, ErrorCode::DanglingTerms));
}

#[test]
fn partial_application_eta_expands() {
    let state = pipeline(
        r#"let greet = concat "Hello, "; fn main(): Unit = println (greet "world");"#,
    );
    assert_eq!(state.errors, vec![]);
    let greet = state
        .module
        .members
        .iter()
        .find_map(|m| match m {
            Member::Bnd(b) if b.name == "greet" => Some(b),
            _ => None,
        })
        .unwrap();
    let lambda = greet.lambda().expect("eta-expanded into a lambda");
    assert!(lambda.origin.is_synth());
    let meta = lambda.meta.as_ref().expect("eta lambda carries meta");
    assert_eq!(meta.original_name, "greet");
    assert_eq!(meta.arity, 1);
    assert_eq!(lambda.params.len(), 1);
}

#[test]
fn parse_error_members_surface_in_phase_one() {
    let state = pipeline("let = 1;");
    assert!(has_error(&state, ErrorCode::ParseErrorFound));
}

#[test]
fn struct_field_selection_types() {
    let state = pipeline(
        "type Point = { x: Int, y: Int }; fn get(p: Point): Int = p.x;",
    );
    assert_eq!(state.errors, vec![]);
}

#[test]
fn unknown_struct_field_is_reported() {
    let state = pipeline(
        "type Point = { x: Int, y: Int }; fn get(p: Point): Int = p.z;",
    );
    assert!(has_error(&state, ErrorCode::TypeMismatch));
}

#[test]
fn struct_constructor_applies_fields() {
    let state = pipeline(
        "type Point = { x: Int, y: Int }; fn origin(): Point = Point 0 0;",
    );
    assert_eq!(state.errors, vec![]);
    assert_eq!(pretty::expr(body_of(&state, "origin")), "(Point 0 0)");
}

#[test]
fn id_assignment_is_stable() {
    let info = SourceInfo::new("fn f(x: Int): Int = x; let v = 1;");
    let a = PhaseState::seed(mml_parse::parse(&info, "Test").module);
    let b = PhaseState::seed(mml_parse::parse(&info, "Test").module);
    let ids_a: Vec<_> = a.module.members.iter().filter_map(Member::id).collect();
    let ids_b: Vec<_> = b.module.members.iter().filter_map(Member::id).collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn simplifier_is_idempotent_on_fixture() {
    let state = pipeline("fn f(a: Int): Int = ((a + (1)));");
    assert_eq!(state.errors, vec![]);
    let again = phases::simplify::run(state.clone());
    assert_eq!(state.module, again.module);
}

fn arb_arith() -> impl Strategy<Value = String> {
    let leaf = (1i64..100).prop_map(|n| n.to_string());
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), any::<bool>(), inner.clone())
                .prop_map(|(a, mul, b)| format!("{a} {} {b}", if mul { "*" } else { "+" })),
            inner.prop_map(|e| format!("({e})")),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arithmetic_always_compiles_clean(expr in arb_arith()) {
        let state = pipeline(&format!("fn main(): Int = {expr};"));
        prop_assert!(state.errors.is_empty(), "errors: {:?}", state.errors);
    }

    #[test]
    fn simplify_is_idempotent(expr in arb_arith()) {
        let state = pipeline(&format!("fn main(): Int = {expr};"));
        let again = phases::simplify::run(state.clone());
        prop_assert_eq!(&state.module, &again.module);
    }

    #[test]
    fn pipeline_is_deterministic(expr in arb_arith()) {
        let src = format!("fn main(): Int = {expr};");
        let a = pipeline(&src);
        let b = pipeline(&src);
        prop_assert_eq!(pretty::module(&a.module), pretty::module(&b.module));
        prop_assert_eq!(a.errors.len(), b.errors.len());
    }
}
