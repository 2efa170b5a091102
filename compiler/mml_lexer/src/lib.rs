//! Lexer for MinnieML using logos.
//!
//! Produces a [`TokenList`] of spanned tokens. Line comments (`#`) are
//! trivia and vanish here; doc comments (`#- ... -#`, nesting) survive as
//! tokens so the parser can attach them to the following member. Escapes in
//! string literals are NOT processed — the emitter materializes them when
//! building IR constants.

use logos::Logos;
use mml_ir::{SourceInfo, SrcSpan};

mod token;

pub use token::{Token, TokenKind, TokenList};

/// Raw token from logos, before cooking into [`TokenKind`].
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
    // `#` line comment. The `[^-\n]` guard keeps it from eating the start
    // of a `#-` doc comment.
    #[regex(r"#([^-\n][^\n]*)?", logos::skip)]
    LineComment,

    // `#- ... -#` with nesting; the callback consumes to the matching
    // close and yields the inner text.
    #[token("#-", lex_doc_comment)]
    DocComment(String),

    #[token("let")]
    Let,
    #[token("fn")]
    Fn,
    #[token("op")]
    Op,
    #[token("type")]
    Type,
    #[token("module")]
    Module,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("_")]
    Underscore,

    // Binding identifiers start lowercase; underscores allowed.
    #[regex(r"[a-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Type identifiers start uppercase; no underscores.
    #[regex(r"[A-Z][A-Za-z0-9]*", |lex| lex.slice().to_string())]
    TypeIdent(String),

    // Symbolic operator identifiers. `#` is reserved for comments and is
    // not an operator character in practice.
    #[regex(r"[=!$%^&*+<>?/\\|~\-]+", |lex| lex.slice().to_string())]
    OpIdent(String),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    // Raw string literal; no escape processing at this level.
    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),
}

fn lex_doc_comment(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let rem = lex.remainder();
    let bytes = rem.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' && bytes.get(i + 1) == Some(&b'-') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'-' && bytes.get(i + 1) == Some(&b'#') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                let text = rem[..i - 2].trim().to_string();
                lex.bump(i);
                return Some(text);
            }
        } else {
            i += 1;
        }
    }
    // Unterminated doc comment: consume the rest so lexing terminates.
    lex.bump(rem.len());
    None
}

/// Lex the full buffer into a [`TokenList`].
///
/// Unrecognized input becomes [`TokenKind::Unrecognized`] tokens rather than
/// stopping the scan; the parser reports them during member recovery.
pub fn lex(source: &SourceInfo) -> TokenList {
    let mut tokens = Vec::new();
    let mut lexer = RawToken::lexer(source.text());

    while let Some(result) = lexer.next() {
        let span: SrcSpan = source.span(lexer.span());
        match result {
            Ok(RawToken::LineComment) => {}
            Ok(raw) => {
                let kind = cook(raw);
                tokens.push(Token::new(kind, span));
            }
            Err(()) => {
                tokens.push(Token::new(
                    TokenKind::Unrecognized(lexer.slice().to_string()),
                    span,
                ));
            }
        }
    }
    TokenList::new(tokens)
}

fn cook(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::LineComment => unreachable!("trivia filtered before cooking"),
        RawToken::DocComment(text) => TokenKind::DocComment(text),
        RawToken::Let => TokenKind::Let,
        RawToken::Fn => TokenKind::Fn,
        RawToken::Op => TokenKind::Op,
        RawToken::Type => TokenKind::Type,
        RawToken::Module => TokenKind::Module,
        RawToken::If => TokenKind::If,
        RawToken::Then => TokenKind::Then,
        RawToken::Else => TokenKind::Else,
        RawToken::True => TokenKind::Bool(true),
        RawToken::False => TokenKind::Bool(false),
        RawToken::Colon => TokenKind::Colon,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Dot => TokenKind::Dot,
        RawToken::At => TokenKind::At,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Underscore => TokenKind::Placeholder,
        RawToken::Ident(name) => TokenKind::Ident(name),
        RawToken::TypeIdent(name) => TokenKind::TypeIdent(name),
        // `=` alone is the binding equals; `???` is the hole.
        RawToken::OpIdent(sym) => match sym.as_str() {
            "=" => TokenKind::Eq,
            "???" => TokenKind::Hole,
            _ => TokenKind::OpIdent(sym),
        },
        RawToken::Float(v) => TokenKind::Float(v),
        RawToken::Int(v) => TokenKind::Int(v),
        RawToken::Str(v) => TokenKind::Str(v),
    }
}

#[cfg(test)]
mod tests;
