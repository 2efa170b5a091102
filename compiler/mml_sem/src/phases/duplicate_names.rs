//! Phase 2: duplicate-name checking.
//!
//! Declarations group by name. Within a group, one binary and one unary
//! operator may coexist; any other same-name pair is a duplicate. The first
//! occurrence survives unwrapped, later ones are wrapped in
//! `DuplicateMember`. Duplicate parameter names invalidate the whole
//! function or operator.
//!
//! One `DuplicateName` error is emitted per offending name, labelling every
//! occurrence; the diagnostic layer filters occurrences without a real
//! source span (e.g. the injected stdlib side of a clash).

use mml_diagnostic::{Diagnostic, ErrorCode};
use mml_ir::{
    DuplicateMember, FnParam, InvalidMember, Member, SourceOrigin,
};
use rustc_hash::FxHashMap;

use crate::PhaseState;

pub const NAME: &str = "mml_sem::phases::duplicate_names";

#[derive(Copy, Clone, Eq, PartialEq)]
enum DeclClass {
    BinOp,
    UnaryOp,
    Other,
}

pub fn run(mut state: PhaseState) -> PhaseState {
    let members = std::mem::take(&mut state.module.members);

    // First pass: duplicate parameter names invalidate the declaration.
    let members: Vec<Member> = members
        .into_iter()
        .map(|member| check_params(member, &mut state.errors))
        .collect();

    // Second pass: group declarations by name.
    let mut first_seen: FxHashMap<String, Vec<(DeclClass, SourceOrigin)>> = FxHashMap::default();
    let mut out = Vec::with_capacity(members.len());
    let mut offenders: Vec<(String, Vec<SourceOrigin>)> = Vec::new();

    for member in members {
        let Some(name) = member.declared_name().map(str::to_string) else {
            out.push(member);
            continue;
        };
        let class = match &member {
            Member::BinOp(_) => DeclClass::BinOp,
            Member::UnaryOp(_) => DeclClass::UnaryOp,
            _ => DeclClass::Other,
        };
        let origin = member.origin();
        let prior = first_seen.entry(name.clone()).or_default();

        let allowed = prior.is_empty()
            || match class {
                DeclClass::BinOp => prior.iter().all(|(c, _)| *c == DeclClass::UnaryOp),
                DeclClass::UnaryOp => prior.iter().all(|(c, _)| *c == DeclClass::BinOp),
                DeclClass::Other => false,
            };

        if allowed {
            prior.push((class, origin));
            out.push(member);
        } else {
            let first_origin = prior[0].1;
            match offenders.iter_mut().find(|(n, _)| *n == name) {
                Some((_, origins)) => origins.push(origin),
                None => offenders.push((name.clone(), vec![first_origin, origin])),
            }
            out.push(Member::Duplicate(DuplicateMember {
                origin,
                original: Box::new(member),
                first_origin,
            }));
        }
    }

    for (name, origins) in offenders {
        let mut diagnostic = Diagnostic::error(
            ErrorCode::DuplicateName,
            NAME,
            origins[0],
            format!("`{name}` is declared more than once"),
        );
        for origin in &origins[1..] {
            diagnostic = diagnostic.with_label(*origin, format!("`{name}` declared again here"));
        }
        state.errors.push(diagnostic);
    }

    state.module.members = out;
    state.reindex();
    state
}

fn check_params(member: Member, errors: &mut Vec<Diagnostic>) -> Member {
    let (params, origin, name): (Vec<&FnParam>, SourceOrigin, &str) = match &member {
        Member::Bnd(bnd) => match bnd.lambda() {
            Some(lambda) => (lambda.params.iter().collect(), bnd.origin, &bnd.name),
            None => return member,
        },
        Member::BinOp(op) => (vec![&op.lhs, &op.rhs], op.origin, &op.name),
        Member::UnaryOp(op) => (vec![&op.param], op.origin, &op.name),
        _ => return member,
    };

    let mut seen: Vec<&str> = Vec::with_capacity(params.len());
    let mut clash = None;
    for param in &params {
        if seen.contains(&param.name.as_str()) {
            clash = Some((param.name.clone(), param.origin));
            break;
        }
        seen.push(&param.name);
    }
    let Some((param_name, param_origin)) = clash else {
        return member;
    };

    let reason = format!("duplicate parameter `{param_name}` in `{name}`");
    errors.push(
        Diagnostic::error(ErrorCode::DuplicateName, NAME, param_origin, reason.clone())
            .with_label(origin, "in this declaration"),
    );
    Member::Invalid(InvalidMember {
        origin,
        original: Box::new(member),
        reason,
    })
}
