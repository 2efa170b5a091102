//! Stable s-expression rendering of terms and members.
//!
//! Used by tests asserting tree shape and by the driver's `--dump-ast`.
//! Application chains are flattened, so `App(App(f, a), b)` prints as
//! `(f a b)`.

use std::fmt::Write;

use crate::ast::member::{Member, Module};
use crate::ast::term::{Expr, Term};

pub fn module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "(module {}", module.name);
    for m in &module.members {
        let _ = writeln!(out, "  {}", member(m));
    }
    out.push(')');
    out
}

pub fn member(member: &Member) -> String {
    match member {
        Member::Bnd(bnd) => format!("(bnd {} {})", bnd.name, expr(&bnd.value)),
        Member::TypeDef(d) => format!("(typedef {})", d.name),
        Member::TypeAlias(a) => format!("(typealias {})", a.name),
        Member::TypeStruct(s) => {
            let fields: Vec<&str> = s.fields.iter().map(|(n, _)| n.as_str()).collect();
            format!("(typestruct {} {})", s.name, fields.join(" "))
        }
        Member::BinOp(op) => format!("(binop {} {})", op.name, expr(&op.body)),
        Member::UnaryOp(op) => format!("(unaryop {} {})", op.name, expr(&op.body)),
        Member::Duplicate(d) => format!("(duplicate {})", self::member(&d.original)),
        Member::Invalid(inv) => format!("(invalid {})", self::member(&inv.original)),
        Member::ParseError(e) => format!("(parse-error {:?})", e.message),
    }
}

pub fn expr(e: &Expr) -> String {
    match e.terms.as_slice() {
        [t] => term(t),
        terms => {
            let parts: Vec<String> = terms.iter().map(term).collect();
            format!("(seq {})", parts.join(" "))
        }
    }
}

pub fn term(t: &Term) -> String {
    match t {
        Term::Int { value, .. } => value.to_string(),
        Term::Float { value, .. } => format!("{value:?}"),
        Term::Str { value, .. } => format!("{value:?}"),
        Term::Bool { value, .. } => value.to_string(),
        Term::Unit { .. } => "()".to_string(),
        Term::Ref(r) => match &r.qualifier {
            Some(q) => format!("{}.{}", term(&Term::Ref((**q).clone())), r.name),
            None => r.name.clone(),
        },
        Term::App(_) => {
            let mut parts = Vec::new();
            flatten_app(t, &mut parts);
            format!("({})", parts.join(" "))
        }
        Term::Lambda(l) => {
            let names: Vec<&str> = l.params.iter().map(|p| p.name.as_str()).collect();
            format!("(lambda ({}) {})", names.join(" "), expr(&l.body))
        }
        Term::Cond(c) => format!(
            "(if {} {} {})",
            expr(&c.cond),
            expr(&c.if_true),
            expr(&c.if_false)
        ),
        Term::Tuple(tup) => {
            let parts: Vec<String> = tup.elems.iter().map(expr).collect();
            format!("(tuple {})", parts.join(" "))
        }
        Term::Group(g) => format!("(group {})", expr(&g.inner)),
        Term::Hole(_) => "???".to_string(),
        Term::Placeholder { .. } => "_".to_string(),
        Term::Native(n) => format!("(native {:?})", n.attrs.keys().collect::<Vec<_>>()),
        Term::Invalid(i) => format!("(invalid-expr {})", expr(&i.original)),
        Term::Error(e) => format!("(term-error {:?})", e.message),
    }
}

fn flatten_app(t: &Term, out: &mut Vec<String>) {
    match t {
        Term::App(a) => {
            flatten_app(&a.func, out);
            out.push(expr(&a.arg));
        }
        other => out.push(term(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::term::{App, Ref};
    use crate::span::SourceOrigin;

    #[test]
    fn app_chains_flatten() {
        // App(App(f, 1), 2) -> (f 1 2)
        let f = Term::Ref(Ref::new(SourceOrigin::Synth, "f"));
        let inner = Term::App(Box::new(App::new(
            SourceOrigin::Synth,
            f,
            Expr::single(Term::int(SourceOrigin::Synth, 1)),
        )));
        let outer = Term::App(Box::new(App::new(
            SourceOrigin::Synth,
            inner,
            Expr::single(Term::int(SourceOrigin::Synth, 2)),
        )));
        assert_eq!(term(&outer), "(f 1 2)");
    }

    #[test]
    fn multi_term_blocks_render_as_seq() {
        let e = Expr::new(
            SourceOrigin::Synth,
            vec![Term::unit(), Term::int(SourceOrigin::Synth, 7)],
        );
        assert_eq!(expr(&e), "(seq () 7)");
    }
}
