//! Member-level grammar: `let`, `fn`, `op`, `type`, and recovery.

use mml_ir::{
    Assoc, BinOpDef, Bnd, DocComment, Expr, FnParam, Lambda, Member, MemberParseError, SrcSpan,
    Term, TypeAlias, TypeDef, TypeRef, TypeSpec, TypeStructDef, UnaryOpDef,
};
use mml_lexer::TokenKind;
use tracing::trace;

use crate::error::ParseError;
use crate::expr::Stop;
use crate::{Fail, PResult, Parser};

impl Parser<'_> {
    pub(crate) fn parse_member(&mut self, doc: Option<DocComment>) -> Member {
        let start_pos = self.pos;
        let result = match self.peek_kind() {
            Some(TokenKind::Let) => self.parse_let(doc),
            Some(TokenKind::Fn) => self.parse_fn(doc),
            Some(TokenKind::Op) => self.parse_op(doc),
            Some(TokenKind::Type) => self.parse_type_decl(doc),
            Some(TokenKind::Module) => {
                let span = self.peek().map_or_else(|| self.eof_span(), |t| t.span);
                Err(Fail {
                    span,
                    message: "nested module declarations are not supported".to_string(),
                })
            }
            Some(other) => {
                let span = self.peek().map_or_else(|| self.eof_span(), |t| t.span);
                Err(Fail {
                    span,
                    message: format!("expected a declaration, found {}", other.describe()),
                })
            }
            None => Err(Fail {
                span: self.eof_span(),
                message: "expected a declaration, found end of input".to_string(),
            }),
        };
        match result {
            Ok(member) => member,
            Err(fail) => self.recover_member(start_pos, fail),
        }
    }

    /// Skip to the next member boundary: consume through the terminating
    /// `;`, or stop (without consuming) at the next member-start keyword.
    fn recover_member(&mut self, start_pos: usize, fail: Fail) -> Member {
        let start_span = self
            .tokens
            .get(start_pos)
            .map_or(fail.span, |t| t.span);
        let mut end_span = fail.span;

        // Always make progress, even when the failing token is itself a
        // member-start keyword (e.g. a stray `module`).
        if self.pos == start_pos {
            if let Some(token) = self.advance() {
                end_span = token.span;
            }
        }
        while let Some(token) = self.peek() {
            if token.kind.starts_member() {
                break;
            }
            let token = self
                .advance()
                .unwrap_or_else(|| unreachable!("compiler bug: peeked token vanished"));
            end_span = token.span;
            if token.kind == TokenKind::Semicolon {
                break;
            }
        }

        let span = start_span.merge(end_span);
        let failed_code = self.slice(span).to_string();
        self.errors.push(ParseError::Member {
            span,
            message: fail.message.clone(),
            failed_code: failed_code.clone(),
        });
        Member::ParseError(MemberParseError {
            origin: self.origin(span),
            message: fail.message,
            failed_code,
        })
    }

    /// `let NAME (: TYPE)? = EXPR ;`
    fn parse_let(&mut self, doc: Option<DocComment>) -> PResult<Member> {
        let kw = self.expect(&TokenKind::Let)?;
        let (name, _) = self.expect_ident("binding name")?;
        trace!(name = %name, "parsing let binding");
        let type_asc = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_spec()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq)?;
        let value = self.parse_expr(&[Stop::Semi])?;
        let semi = self.expect(&TokenKind::Semicolon)?;
        Ok(Member::Bnd(Bnd {
            origin: self.origin(kw.span.merge(semi.span)),
            id: None,
            name,
            value,
            type_spec: None,
            type_asc,
            doc,
        }))
    }

    /// `fn NAME ( PARAM* ) (: TYPE)? = EXPR ;`
    fn parse_fn(&mut self, doc: Option<DocComment>) -> PResult<Member> {
        let kw = self.expect(&TokenKind::Fn)?;
        let (name, _) = self.expect_ident("function name")?;
        trace!(name = %name, "parsing function");
        let params = self.parse_params()?;
        let ret_asc = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_spec()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq)?;
        let body = self.parse_expr(&[Stop::Semi])?;
        let semi = self.expect(&TokenKind::Semicolon)?;
        let span = kw.span.merge(semi.span);

        let mut lambda = Lambda::new(self.origin(span), params, body);
        lambda.ret_asc = ret_asc;
        Ok(Member::Bnd(Bnd {
            origin: self.origin(span),
            id: None,
            name,
            value: Expr::single(Term::Lambda(Box::new(lambda))),
            type_spec: None,
            type_asc: None,
            doc,
        }))
    }

    /// `op NAME ( PARAMS ) PREC ASSOC = EXPR ;`
    ///
    /// One parameter declares a unary operator (`right` = prefix, `left` =
    /// postfix); two declare a binary operator.
    fn parse_op(&mut self, doc: Option<DocComment>) -> PResult<Member> {
        let kw = self.expect(&TokenKind::Op)?;
        let name = match self.peek().cloned() {
            Some(token) => match token.kind {
                TokenKind::OpIdent(sym) => {
                    self.advance();
                    sym
                }
                // Alphanumeric operators: `and`, `or`, `not`.
                TokenKind::Ident(word) => {
                    self.advance();
                    word
                }
                other => {
                    return Err(Fail {
                        span: token.span,
                        message: format!("expected operator name, found {}", other.describe()),
                    })
                }
            },
            None => {
                return Err(Fail {
                    span: self.eof_span(),
                    message: "expected operator name, found end of input".to_string(),
                })
            }
        };
        trace!(name = %name, "parsing operator");
        let params = self.parse_params()?;

        let (precedence, prec_span) = match self.peek().cloned() {
            Some(token) => match token.kind {
                TokenKind::Int(v) if (0..=255).contains(&v) => {
                    self.advance();
                    (v as u8, token.span)
                }
                TokenKind::Int(v) => {
                    return Err(Fail {
                        span: token.span,
                        message: format!("operator precedence must be 0..=255, found {v}"),
                    })
                }
                other => {
                    return Err(Fail {
                        span: token.span,
                        message: format!("expected operator precedence, found {}", other.describe()),
                    })
                }
            },
            None => {
                return Err(Fail {
                    span: self.eof_span(),
                    message: "expected operator precedence, found end of input".to_string(),
                })
            }
        };

        let assoc = match self.peek().cloned() {
            Some(token) => match &token.kind {
                TokenKind::Ident(word) if word == "left" => {
                    self.advance();
                    Assoc::Left
                }
                TokenKind::Ident(word) if word == "right" => {
                    self.advance();
                    Assoc::Right
                }
                other => {
                    return Err(Fail {
                        span: token.span,
                        message: format!("expected `left` or `right`, found {}", other.describe()),
                    })
                }
            },
            None => {
                return Err(Fail {
                    span: self.eof_span(),
                    message: "expected `left` or `right`, found end of input".to_string(),
                })
            }
        };

        self.expect(&TokenKind::Eq)?;
        let body = self.parse_expr(&[Stop::Semi])?;
        let semi = self.expect(&TokenKind::Semicolon)?;
        let span = kw.span.merge(semi.span);

        let mut params = params;
        match params.len() {
            1 => Ok(Member::UnaryOp(UnaryOpDef {
                origin: self.origin(span),
                id: None,
                name,
                precedence,
                assoc,
                param: params.remove(0),
                ret_asc: None,
                type_spec: None,
                body,
                doc,
            })),
            2 => {
                let rhs = params.remove(1);
                let lhs = params.remove(0);
                Ok(Member::BinOp(BinOpDef {
                    origin: self.origin(span),
                    id: None,
                    name,
                    precedence,
                    assoc,
                    lhs,
                    rhs,
                    ret_asc: None,
                    type_spec: None,
                    body,
                    doc,
                }))
            }
            n => Err(Fail {
                span: prec_span,
                message: format!("operators take one or two parameters, found {n}"),
            }),
        }
    }

    /// `type NAME = TYPE ;` where TYPE is a struct literal, an `@native`
    /// body, or another type name (an alias).
    fn parse_type_decl(&mut self, doc: Option<DocComment>) -> PResult<Member> {
        let kw = self.expect(&TokenKind::Type)?;
        let (name, _) = self.expect_type_ident()?;
        trace!(name = %name, "parsing type declaration");
        self.expect(&TokenKind::Eq)?;

        let member = match self.peek_kind() {
            Some(TokenKind::LBrace) => {
                let fields = self.parse_struct_fields()?;
                let semi = self.expect(&TokenKind::Semicolon)?;
                Member::TypeStruct(TypeStructDef {
                    origin: self.origin(kw.span.merge(semi.span)),
                    id: None,
                    name,
                    fields,
                    doc,
                })
            }
            Some(TokenKind::At) => {
                let native = self.parse_native()?;
                let semi = self.expect(&TokenKind::Semicolon)?;
                let type_spec = native
                    .llvm_type()
                    .map(|t| TypeSpec::NativePrimitive(t.to_string()));
                Member::TypeDef(TypeDef {
                    origin: self.origin(kw.span.merge(semi.span)),
                    id: None,
                    name,
                    type_spec,
                    doc,
                })
            }
            _ => {
                let type_ref = self.parse_type_spec()?;
                let semi = self.expect(&TokenKind::Semicolon)?;
                Member::TypeAlias(TypeAlias {
                    origin: self.origin(kw.span.merge(semi.span)),
                    id: None,
                    name,
                    type_ref,
                    type_spec: None,
                    doc,
                })
            }
        };
        Ok(member)
    }

    /// `{ field: TYPE, ... }`
    fn parse_struct_fields(&mut self) -> PResult<Vec<(String, TypeSpec)>> {
        self.expect(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            let (name, _) = self.expect_ident("field name")?;
            self.expect(&TokenKind::Colon)?;
            let ty = self.parse_type_spec()?;
            fields.push((name, ty));
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace)?;
                break;
            }
        }
        Ok(fields)
    }

    /// `( (&)? NAME (: TYPE)? , ... )`
    pub(crate) fn parse_params(&mut self) -> PResult<Vec<FnParam>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            let borrowed = match self.peek_kind() {
                Some(TokenKind::OpIdent(sym)) if sym == "&" => {
                    self.advance();
                    true
                }
                _ => false,
            };
            let (name, name_span) = self.expect_ident("parameter name")?;
            let type_asc = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type_spec()?)
            } else {
                None
            };
            let mut param = FnParam::new(self.origin(name_span), name, type_asc);
            param.borrowed = borrowed;
            params.push(param);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    /// Type forms in ascription position: a type name, `()`, a
    /// parenthesized type, or a tuple type.
    pub(crate) fn parse_type_spec(&mut self) -> PResult<TypeSpec> {
        match self.peek().cloned() {
            Some(token) => match token.kind {
                TokenKind::TypeIdent(_) => {
                    let (name, span) = self.expect_type_ident()?;
                    Ok(TypeSpec::Ref(TypeRef::new(self.origin(span), name)))
                }
                TokenKind::LParen => {
                    self.advance();
                    if self.eat(&TokenKind::RParen) {
                        return Ok(TypeSpec::Unit);
                    }
                    let first = self.parse_type_spec()?;
                    if self.eat(&TokenKind::Comma) {
                        let mut elems = vec![first];
                        loop {
                            elems.push(self.parse_type_spec()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RParen)?;
                        Ok(TypeSpec::Tuple(elems))
                    } else {
                        self.expect(&TokenKind::RParen)?;
                        Ok(first)
                    }
                }
                other => Err(Fail {
                    span: token.span,
                    message: format!("expected a type, found {}", other.describe()),
                }),
            },
            None => Err(Fail {
                span: self.eof_span(),
                message: "expected a type, found end of input".to_string(),
            }),
        }
    }

    pub(crate) fn prev_span(&self) -> SrcSpan {
        if self.pos == 0 {
            return self.eof_span();
        }
        self.tokens
            .get(self.pos - 1)
            .map_or_else(|| self.eof_span(), |t| t.span)
    }
}
