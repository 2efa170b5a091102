use pretty_assertions::assert_eq;

use mml_ir::SourceInfo;

use crate::{lex, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    let info = SourceInfo::new(source);
    lex(&info).iter().map(|t| t.kind.clone()).collect()
}

#[test]
fn keywords_and_idents() {
    assert_eq!(
        kinds("let x = fooBar_1;"),
        vec![
            TokenKind::Let,
            TokenKind::Ident("x".into()),
            TokenKind::Eq,
            TokenKind::Ident("fooBar_1".into()),
            TokenKind::Semicolon,
        ]
    );
}

#[test]
fn type_idents_have_no_underscores() {
    // `Foo_bar` splits: type ident, placeholder, ident.
    assert_eq!(
        kinds("Foo_bar"),
        vec![
            TokenKind::TypeIdent("Foo".into()),
            TokenKind::Placeholder,
            TokenKind::Ident("bar".into()),
        ]
    );
}

#[test]
fn symbolic_operators_munch_maximally() {
    assert_eq!(
        kinds("a <= b == c"),
        vec![
            TokenKind::Ident("a".into()),
            TokenKind::OpIdent("<=".into()),
            TokenKind::Ident("b".into()),
            TokenKind::OpIdent("==".into()),
            TokenKind::Ident("c".into()),
        ]
    );
}

#[test]
fn lone_equals_is_binding_equals() {
    assert_eq!(
        kinds("= == ="),
        vec![TokenKind::Eq, TokenKind::OpIdent("==".into()), TokenKind::Eq]
    );
}

#[test]
fn triple_question_is_hole() {
    assert_eq!(kinds("???"), vec![TokenKind::Hole]);
    assert_eq!(kinds("?"), vec![TokenKind::OpIdent("?".into())]);
}

#[test]
fn numeric_literals() {
    assert_eq!(
        kinds("42 3.25"),
        vec![TokenKind::Int(42), TokenKind::Float(3.25)]
    );
}

#[test]
fn string_literals_keep_raw_escapes() {
    assert_eq!(
        kinds(r#""hello\nworld""#),
        vec![TokenKind::Str("hello\\nworld".into())]
    );
}

#[test]
fn line_comments_are_trivia() {
    assert_eq!(
        kinds("let x = 1; # trailing words\nlet y = 2;"),
        vec![
            TokenKind::Let,
            TokenKind::Ident("x".into()),
            TokenKind::Eq,
            TokenKind::Int(1),
            TokenKind::Semicolon,
            TokenKind::Let,
            TokenKind::Ident("y".into()),
            TokenKind::Eq,
            TokenKind::Int(2),
            TokenKind::Semicolon,
        ]
    );
}

#[test]
fn doc_comments_survive_and_nest() {
    assert_eq!(
        kinds("#- outer #- inner -# end -# fn"),
        vec![
            TokenKind::DocComment("outer #- inner -# end".into()),
            TokenKind::Fn,
        ]
    );
}

#[test]
fn bare_hash_is_a_line_comment() {
    assert_eq!(kinds("#\nlet"), vec![TokenKind::Let]);
}

#[test]
fn native_attr_tokens() {
    assert_eq!(
        kinds(r#"@native[mem=alloc,tpl="x"]"#),
        vec![
            TokenKind::At,
            TokenKind::Ident("native".into()),
            TokenKind::LBracket,
            TokenKind::Ident("mem".into()),
            TokenKind::Eq,
            TokenKind::Ident("alloc".into()),
            TokenKind::Comma,
            TokenKind::Ident("tpl".into()),
            TokenKind::Eq,
            TokenKind::Str("x".into()),
            TokenKind::RBracket,
        ]
    );
}

#[test]
fn spans_are_line_col_anchored() {
    let info = SourceInfo::new("let x = 1;\nlet y = 2;");
    let tokens = lex(&info);
    let y = tokens
        .iter()
        .find(|t| t.kind == TokenKind::Ident("y".into()))
        .unwrap();
    assert_eq!(y.span.start.line, 2);
    assert_eq!(y.span.start.col, 5);
}

#[test]
fn unrecognized_bytes_become_error_tokens() {
    let toks = kinds("let ` x");
    assert!(toks
        .iter()
        .any(|t| matches!(t, TokenKind::Unrecognized(s) if s == "`")));
}
