//! Expression grammar.
//!
//! Expressions are parsed *flat*: a run of terms collected until a stop
//! token. Application is juxtaposition and operators are ordinary
//! references here; the semantic rewriter applies precedence later.

use mml_ir::{
    Cond, Expr, NativeImpl, Ref, SrcSpan, Term, TermError, TermGroup, TupleTerm,
};
use mml_lexer::TokenKind;
use smallvec::SmallVec;

use crate::error::ParseError;
use crate::{Fail, PResult, Parser};

/// Tokens that end the current expression without being part of it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum Stop {
    Semi,
    RParen,
    Comma,
    Then,
    Else,
}

fn is_stop(kind: &TokenKind, stops: &[Stop]) -> bool {
    stops.iter().any(|stop| match stop {
        Stop::Semi => kind == &TokenKind::Semicolon,
        Stop::RParen => kind == &TokenKind::RParen,
        Stop::Comma => kind == &TokenKind::Comma,
        Stop::Then => kind == &TokenKind::Then,
        Stop::Else => kind == &TokenKind::Else,
    })
}

impl Parser<'_> {
    /// Collect terms until a stop token (not consumed). Unparseable input
    /// inside the expression becomes a `TermError` term and scanning resumes
    /// at the stop.
    pub(crate) fn parse_expr(&mut self, stops: &[Stop]) -> PResult<Expr> {
        let mut terms: SmallVec<[Term; 4]> = SmallVec::new();
        let start_span = self
            .peek()
            .map_or_else(|| self.eof_span(), |t| t.span);

        loop {
            let Some(token) = self.peek() else { break };
            if is_stop(&token.kind, stops) {
                break;
            }
            match self.parse_term(stops) {
                Ok(term) => terms.push(term),
                Err(fail) => {
                    let before = self.pos;
                    let skipped = self.skip_to_stop(stops, fail.span);
                    let failed_code = self.slice(skipped).to_string();
                    self.errors.push(ParseError::Term {
                        span: skipped,
                        message: fail.message.clone(),
                        failed_code: failed_code.clone(),
                    });
                    terms.push(Term::Error(TermError {
                        origin: self.origin(skipped),
                        message: fail.message,
                        failed_code,
                    }));
                    // A member-start keyword halts the skip without being
                    // consumed; leave it for member-level recovery.
                    if self.pos == before {
                        break;
                    }
                }
            }
        }

        if terms.is_empty() {
            return Err(Fail {
                span: start_span,
                message: "expected an expression".to_string(),
            });
        }
        let span = terms
            .iter()
            .filter_map(|t| t.origin().span())
            .fold(None::<SrcSpan>, |acc, s| {
                Some(acc.map_or(s, |a| a.merge(s)))
            })
            .unwrap_or(start_span);
        Ok(Expr::new(self.origin(span), terms.into_vec()))
    }

    fn parse_term(&mut self, stops: &[Stop]) -> PResult<Term> {
        let Some(token) = self.peek().cloned() else {
            return Err(Fail {
                span: self.eof_span(),
                message: "expected a term, found end of input".to_string(),
            });
        };
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Term::Int {
                    origin: self.origin(token.span),
                    value,
                    type_spec: None,
                })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Term::Float {
                    origin: self.origin(token.span),
                    value,
                    type_spec: None,
                })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Term::Str {
                    origin: self.origin(token.span),
                    value,
                    type_spec: None,
                })
            }
            TokenKind::Bool(value) => {
                self.advance();
                Ok(Term::Bool {
                    origin: self.origin(token.span),
                    value,
                    type_spec: None,
                })
            }
            TokenKind::Ident(_) | TokenKind::TypeIdent(_) => self.parse_ref_chain(),
            TokenKind::OpIdent(sym) => {
                self.advance();
                Ok(Term::Ref(Ref::new(self.origin(token.span), sym)))
            }
            TokenKind::LParen => self.parse_group(),
            TokenKind::If => self.parse_cond(stops),
            TokenKind::Hole => {
                self.advance();
                Ok(Term::Hole(mml_ir::Hole {
                    origin: self.origin(token.span),
                    type_spec: None,
                }))
            }
            TokenKind::Placeholder => {
                self.advance();
                Ok(Term::Placeholder {
                    origin: self.origin(token.span),
                })
            }
            TokenKind::At => {
                let native = self.parse_native()?;
                Ok(Term::Native(native))
            }
            other => Err(Fail {
                span: token.span,
                message: format!("expected a term, found {}", other.describe()),
            }),
        }
    }

    /// `a`, `Module.member`, `record.field` — a dot-separated chain where
    /// the rightmost segment is the referenced name.
    fn parse_ref_chain(&mut self) -> PResult<Term> {
        let first = self
            .advance()
            .unwrap_or_else(|| unreachable!("compiler bug: peeked token vanished"));
        let name = match first.kind {
            TokenKind::Ident(name) | TokenKind::TypeIdent(name) => name,
            _ => unreachable!("compiler bug: parse_ref_chain on non-identifier"),
        };
        let mut current = Ref::new(self.origin(first.span), name);

        while self.at(&TokenKind::Dot) {
            let segment_ok = matches!(
                self.peek_at(1).map(|t| &t.kind),
                Some(TokenKind::Ident(_) | TokenKind::TypeIdent(_))
            );
            if !segment_ok {
                let span = self
                    .peek()
                    .map_or_else(|| self.eof_span(), |t| t.span);
                return Err(Fail {
                    span,
                    message: "expected an identifier after `.`".to_string(),
                });
            }
            self.advance(); // `.`
            let segment = self
                .advance()
                .unwrap_or_else(|| unreachable!("compiler bug: peeked token vanished"));
            let segment_name = match segment.kind {
                TokenKind::Ident(name) | TokenKind::TypeIdent(name) => name,
                _ => unreachable!("compiler bug: qualifier segment not an identifier"),
            };
            let mut outer = Ref::new(self.origin(first.span.merge(segment.span)), segment_name);
            outer.qualifier = Some(Box::new(current));
            current = outer;
        }
        Ok(Term::Ref(current))
    }

    /// `()`, `(expr)`, or `(a, b, ...)`.
    fn parse_group(&mut self) -> PResult<Term> {
        let open = self.expect(&TokenKind::LParen)?;
        if self.at(&TokenKind::RParen) {
            let close = self
                .advance()
                .unwrap_or_else(|| unreachable!("compiler bug: peeked token vanished"));
            return Ok(Term::Unit {
                origin: self.origin(open.span.merge(close.span)),
            });
        }
        let first = self.parse_expr(&[Stop::RParen, Stop::Comma])?;
        if self.at(&TokenKind::Comma) {
            let mut elems = vec![first];
            while self.eat(&TokenKind::Comma) {
                elems.push(self.parse_expr(&[Stop::RParen, Stop::Comma])?);
            }
            let close = self.expect(&TokenKind::RParen)?;
            return Ok(Term::Tuple(TupleTerm {
                origin: self.origin(open.span.merge(close.span)),
                elems,
                type_spec: None,
            }));
        }
        let close = self.expect(&TokenKind::RParen)?;
        Ok(Term::Group(Box::new(TermGroup {
            origin: self.origin(open.span.merge(close.span)),
            inner: first,
        })))
    }

    /// `if COND then EXPR else EXPR`. The else-branch runs to the enclosing
    /// stop, so a dangling `else` binds to the innermost conditional.
    fn parse_cond(&mut self, stops: &[Stop]) -> PResult<Term> {
        let kw = self.expect(&TokenKind::If)?;
        let cond = self.parse_expr(&[Stop::Then])?;
        self.expect(&TokenKind::Then)?;
        let if_true = self.parse_expr(&[Stop::Else])?;
        self.expect(&TokenKind::Else)?;
        let if_false = self.parse_expr(stops)?;
        let span = kw.span.merge(self.prev_span());
        Ok(Term::Cond(Box::new(Cond {
            origin: self.origin(span),
            cond,
            if_true,
            if_false,
            type_spec: None,
        })))
    }

    /// `@native` or `@native[key=value, ...]`.
    pub(crate) fn parse_native(&mut self) -> PResult<NativeImpl> {
        let at = self.expect(&TokenKind::At)?;
        let word = self.expect_ident("attribute name")?;
        if word.0 != "native" {
            return Err(Fail {
                span: word.1,
                message: format!("expected `native` after `@`, found `{}`", word.0),
            });
        }
        let mut native = NativeImpl::new(self.origin(at.span.merge(word.1)));
        if !self.eat(&TokenKind::LBracket) {
            return Ok(native);
        }
        loop {
            if self.eat(&TokenKind::RBracket) {
                break;
            }
            let (key, _) = self.expect_ident("attribute name")?;
            let value = if self.eat(&TokenKind::Eq) {
                match self.peek().cloned() {
                    Some(token) => match token.kind {
                        TokenKind::Ident(v) | TokenKind::TypeIdent(v) | TokenKind::OpIdent(v) => {
                            self.advance();
                            v
                        }
                        TokenKind::Str(v) => {
                            self.advance();
                            v
                        }
                        TokenKind::Int(v) => {
                            self.advance();
                            v.to_string()
                        }
                        other => {
                            return Err(Fail {
                                span: token.span,
                                message: format!(
                                    "expected attribute value, found {}",
                                    other.describe()
                                ),
                            })
                        }
                    },
                    None => {
                        return Err(Fail {
                            span: self.eof_span(),
                            message: "expected attribute value, found end of input".to_string(),
                        })
                    }
                }
            } else {
                // Bare flag attribute.
                String::new()
            };
            native.attrs.insert(key, value);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBracket)?;
                break;
            }
        }
        Ok(native)
    }

    /// Consume tokens until a stop is visible at paren depth 0. Returns the
    /// span of the skipped region (at minimum the failing span).
    fn skip_to_stop(&mut self, stops: &[Stop], fail_span: SrcSpan) -> SrcSpan {
        let mut span = fail_span;
        let mut depth: u32 = 0;
        while let Some(token) = self.peek() {
            if depth == 0 && is_stop(&token.kind, stops) {
                break;
            }
            // Never run past a member boundary while recovering a term.
            if token.kind.starts_member() {
                break;
            }
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            let token = self
                .advance()
                .unwrap_or_else(|| unreachable!("compiler bug: peeked token vanished"));
            span = span.merge(token.span);
        }
        span
    }
}
