//! Symbol naming.
//!
//! Non-native user functions mangle as `{module}_{name}`; operators as
//! `{module}_op.{lexical}.{arity}` where symbolic characters map to
//! deterministic lexical names (`**` becomes `star_star`). Native functions
//! keep their raw names so the linker resolves them against the C runtime.

/// Lexical name of one operator character.
pub fn char_lexical_name(c: char) -> &'static str {
    match c {
        '=' => "eq",
        '!' => "bang",
        '#' => "hash",
        '$' => "dollar",
        '%' => "percent",
        '^' => "caret",
        '&' => "amp",
        '*' => "star",
        '+' => "plus",
        '<' => "lt",
        '>' => "gt",
        '?' => "qmark",
        '/' => "slash",
        '\\' => "bslash",
        '|' => "pipe",
        '~' => "tilde",
        '-' => "minus",
        _ => "sym",
    }
}

/// Deterministic lexical rendering of an operator name: alphanumeric
/// operators keep their spelling, symbolic ones join per-character names
/// with underscores.
pub fn operator_lexical_name(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return name.to_string();
    }
    let parts: Vec<&str> = name.chars().map(char_lexical_name).collect();
    parts.join("_")
}

/// The module prefix lowers to keep symbols shell-friendly: module `Test`
/// yields `test_main`.
pub fn mangle_function(module: &str, name: &str) -> String {
    format!("{}_{name}", module.to_lowercase())
}

pub fn mangle_operator(module: &str, name: &str, arity: usize) -> String {
    format!(
        "{}_op.{}.{arity}",
        module.to_lowercase(),
        operator_lexical_name(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_operator_names() {
        assert_eq!(operator_lexical_name("**"), "star_star");
        assert_eq!(operator_lexical_name("<="), "lt_eq");
        assert_eq!(operator_lexical_name("!"), "bang");
    }

    #[test]
    fn alphanumeric_operators_keep_spelling() {
        assert_eq!(operator_lexical_name("and"), "and");
        assert_eq!(operator_lexical_name("not"), "not");
    }

    #[test]
    fn mangled_symbols() {
        assert_eq!(mangle_function("Test", "main"), "test_main");
        assert_eq!(mangle_operator("Test", "**", 2), "test_op.star_star.2");
        assert_eq!(mangle_operator("Test", "and", 2), "test_op.and.2");
    }
}
