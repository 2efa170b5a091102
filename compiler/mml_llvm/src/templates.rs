//! Native operator selectors and inline IR templates.
//!
//! Operators declared `@native[op=SELECTOR]` expand through the registry
//! below. Functions declared `@native[tpl="..."]` inline their template at
//! each call site with `%type` / `%operand` / `%operand1` / `%operand2`
//! substituted; no external declaration is generated for them.

use crate::{CodeGenError, CodeGenErrorKind};

/// Expand a registered selector into an instruction right-hand side and the
/// LLVM type of its result.
pub fn expand_selector(
    selector: &str,
    ty: &str,
    operands: &[String],
) -> Result<(String, String), CodeGenError> {
    let binary = |op: &str| -> Result<(String, String), CodeGenError> {
        let [a, b] = two(selector, operands)?;
        Ok((format!("{op} {ty} {a}, {b}"), ty.to_string()))
    };
    let icmp = |cond: &str| -> Result<(String, String), CodeGenError> {
        let [a, b] = two(selector, operands)?;
        Ok((format!("icmp {cond} {ty} {a}, {b}"), "i1".to_string()))
    };

    match selector {
        "add" => binary("add"),
        "sub" => binary("sub"),
        "mul" => binary("mul"),
        "sdiv" => binary("sdiv"),
        "and" => binary("and"),
        "or" => binary("or"),
        "xor" => binary("xor"),
        "shl" => binary("shl"),
        "lshr" => binary("lshr"),
        "ashr" => binary("ashr"),
        "icmp_eq" => icmp("eq"),
        "icmp_ne" => icmp("ne"),
        "icmp_slt" => icmp("slt"),
        "icmp_sle" => icmp("sle"),
        "icmp_sgt" => icmp("sgt"),
        "icmp_sge" => icmp("sge"),
        "neg" => {
            let [a] = one(selector, operands)?;
            Ok((format!("sub {ty} 0, {a}"), ty.to_string()))
        }
        "pos" => {
            let [a] = one(selector, operands)?;
            Ok((format!("add {ty} 0, {a}"), ty.to_string()))
        }
        "not" => {
            let [a] = one(selector, operands)?;
            let mask = if ty == "i1" { "true" } else { "-1" };
            Ok((format!("xor {ty} {a}, {mask}"), ty.to_string()))
        }
        other => Err(CodeGenError::new(
            CodeGenErrorKind::TemplateMismatch,
            format!("unknown native operator selector `{other}`"),
        )),
    }
}

/// Substitute operands into a `tpl="..."` template. The result type is the
/// operand type unless the template names one in a leading `TYPE:` prefix.
pub fn expand_template(
    template: &str,
    ty: &str,
    operands: &[String],
) -> Result<String, CodeGenError> {
    let mut out = template.to_string();
    out = out.replace("%type", ty);
    match operands.len() {
        1 => {
            if out.contains("%operand2") {
                return Err(CodeGenError::new(
                    CodeGenErrorKind::TemplateMismatch,
                    "template expects two operands but the operator is unary",
                ));
            }
            out = out.replace("%operand1", &operands[0]);
            out = out.replace("%operand", &operands[0]);
        }
        2 => {
            if !out.contains("%operand1") || !out.contains("%operand2") {
                return Err(CodeGenError::new(
                    CodeGenErrorKind::TemplateMismatch,
                    "binary template must use %operand1 and %operand2",
                ));
            }
            out = out.replace("%operand1", &operands[0]);
            out = out.replace("%operand2", &operands[1]);
        }
        n => {
            return Err(CodeGenError::new(
                CodeGenErrorKind::TemplateMismatch,
                format!("templates take one or two operands, found {n}"),
            ))
        }
    }
    if out.contains("%operand") {
        return Err(CodeGenError::new(
            CodeGenErrorKind::TemplateMismatch,
            "template placeholders left unsubstituted",
        ));
    }
    Ok(out)
}

fn two<'a>(selector: &str, operands: &'a [String]) -> Result<[&'a str; 2], CodeGenError> {
    match operands {
        [a, b] => Ok([a, b]),
        _ => Err(arity_error(selector, 2, operands.len())),
    }
}

fn one<'a>(selector: &str, operands: &'a [String]) -> Result<[&'a str; 1], CodeGenError> {
    match operands {
        [a] => Ok([a]),
        _ => Err(arity_error(selector, 1, operands.len())),
    }
}

fn arity_error(selector: &str, want: usize, got: usize) -> CodeGenError {
    CodeGenError::new(
        CodeGenErrorKind::TemplateMismatch,
        format!("selector `{selector}` takes {want} operands, found {got}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_selectors() {
        let (rhs, ty) = expand_selector("add", "i64", &["%a".into(), "%b".into()]).unwrap();
        assert_eq!(rhs, "add i64 %a, %b");
        assert_eq!(ty, "i64");
    }

    #[test]
    fn comparisons_yield_i1() {
        let (rhs, ty) = expand_selector("icmp_slt", "i64", &["%a".into(), "7".into()]).unwrap();
        assert_eq!(rhs, "icmp slt i64 %a, 7");
        assert_eq!(ty, "i1");
    }

    #[test]
    fn negation_subtracts_from_zero() {
        let (rhs, _) = expand_selector("neg", "i64", &["%x".into()]).unwrap();
        assert_eq!(rhs, "sub i64 0, %x");
    }

    #[test]
    fn boolean_not_xors_true() {
        let (rhs, _) = expand_selector("not", "i1", &["%b".into()]).unwrap();
        assert_eq!(rhs, "xor i1 %b, true");
    }

    #[test]
    fn wrong_arity_is_a_template_mismatch() {
        let err = expand_selector("add", "i64", &["%a".into()]).unwrap_err();
        assert_eq!(err.kind, CodeGenErrorKind::TemplateMismatch);
    }

    #[test]
    fn unary_template_substitution() {
        let out = expand_template(
            "call i64 @llvm.ctpop.i64(i64 %operand)",
            "i64",
            &["%x".into()],
        )
        .unwrap();
        assert_eq!(out, "call i64 @llvm.ctpop.i64(i64 %x)");
    }

    #[test]
    fn binary_template_substitution() {
        let out = expand_template(
            "call i64 @llvm.smax.i64(i64 %operand1, i64 %operand2)",
            "i64",
            &["%a".into(), "%b".into()],
        )
        .unwrap();
        assert_eq!(out, "call i64 @llvm.smax.i64(i64 %a, i64 %b)");
    }
}
