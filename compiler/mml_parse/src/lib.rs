//! Recursive descent parser for MinnieML.
//!
//! Produces a [`Module`] of flat-term expressions: precedence is *not*
//! applied here — an expression is an ordered `Expr(terms)` sequence that
//! the semantic rewriter later climbs. The parser never fails hard on
//! malformed input; it leaves `MemberParseError` / `TermError` nodes in the
//! tree and resumes at the next synchronization point (`;` at member
//! boundaries, the matching `)` inside groups).

mod error;
mod expr;
mod members;

#[cfg(test)]
mod tests;

pub use error::{ParseError, ParseWarning};

use mml_ir::{Module, SourceInfo, SourceOrigin, SrcSpan, Visibility};
use mml_lexer::{Token, TokenKind, TokenList};
use tracing::debug;

/// Parse a source buffer into a module named `module_name`.
///
/// The module name is supplied by the caller (usually derived from the file
/// path) since a file is implicitly one public module.
pub fn parse(source: &SourceInfo, module_name: &str) -> ParseOutput {
    let tokens = mml_lexer::lex(source);
    debug!(module = module_name, tokens = tokens.len(), "parsing module");
    let mut parser = Parser::new(source, &tokens);
    let module = parser.parse_module(module_name);
    ParseOutput {
        module,
        errors: parser.errors,
        warnings: parser.warnings,
    }
}

/// Everything the parser produced.
#[derive(Clone, Debug)]
pub struct ParseOutput {
    pub module: Module,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
}

/// Internal failure carried up to the member-recovery loop.
#[derive(Clone, Debug)]
pub(crate) struct Fail {
    pub span: SrcSpan,
    pub message: String,
}

pub(crate) type PResult<T> = Result<T, Fail>;

pub(crate) struct Parser<'a> {
    pub(crate) source: &'a SourceInfo,
    pub(crate) tokens: &'a TokenList,
    pub(crate) pos: usize,
    pub(crate) errors: Vec<ParseError>,
    pub(crate) warnings: Vec<ParseWarning>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a SourceInfo, tokens: &'a TokenList) -> Self {
        Parser {
            source,
            tokens,
            pos: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn parse_module(&mut self, name: &str) -> Module {
        let mut module = Module::new(self.buffer_origin(), name);
        module.visibility = Visibility::Public;

        let mut pending_doc = None;
        loop {
            // Doc comments attach to the next member.
            while let Some(token) = self.peek() {
                if let TokenKind::DocComment(text) = &token.kind {
                    pending_doc = Some(mml_ir::DocComment {
                        origin: SourceOrigin::FromSource(token.span),
                        text: text.clone(),
                    });
                    self.advance();
                } else {
                    break;
                }
            }
            let Some(_) = self.peek() else {
                if let Some(doc) = pending_doc.take() {
                    if let Some(span) = doc.origin.span() {
                        self.warnings
                            .push(ParseWarning::UnattachedDocComment { span });
                    }
                }
                break;
            };
            let member = self.parse_member(pending_doc.take());
            module.members.push(member);
        }
        module
    }

    // -- Cursor --

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        match self.peek() {
            Some(token) if &token.kind == kind => Ok(self.advance().unwrap_or_else(|| {
                unreachable!("compiler bug: peeked token vanished")
            })),
            Some(token) => Err(Fail {
                span: token.span,
                message: format!("expected {}, found {}", kind.describe(), token.kind.describe()),
            }),
            None => Err(Fail {
                span: self.eof_span(),
                message: format!("expected {}, found end of input", kind.describe()),
            }),
        }
    }

    /// Expect a binding identifier; a type identifier here is a malformed-id
    /// error rather than a generic parse failure.
    pub(crate) fn expect_ident(&mut self, what: &str) -> PResult<(String, SrcSpan)> {
        match self.peek().cloned() {
            Some(token) => match token.kind {
                TokenKind::Ident(name) => {
                    self.advance();
                    self.check_adjacent_ident(token.span)?;
                    Ok((name, token.span))
                }
                TokenKind::TypeIdent(name) => {
                    self.errors.push(ParseError::MalformedIdentifier {
                        span: token.span,
                        message: format!("{what} must start with a lowercase letter, found `{name}`"),
                    });
                    Err(Fail {
                        span: token.span,
                        message: format!("malformed {what} `{name}`"),
                    })
                }
                other => Err(Fail {
                    span: token.span,
                    message: format!("expected {what}, found {}", other.describe()),
                }),
            },
            None => Err(Fail {
                span: self.eof_span(),
                message: format!("expected {what}, found end of input"),
            }),
        }
    }

    /// Expect a type identifier, reporting underscores as malformed ids.
    pub(crate) fn expect_type_ident(&mut self) -> PResult<(String, SrcSpan)> {
        match self.peek().cloned() {
            Some(token) => match token.kind {
                TokenKind::TypeIdent(name) => {
                    self.advance();
                    self.check_adjacent_ident(token.span)?;
                    Ok((name, token.span))
                }
                other => Err(Fail {
                    span: token.span,
                    message: format!("expected type identifier, found {}", other.describe()),
                }),
            },
            None => Err(Fail {
                span: self.eof_span(),
                message: "expected type identifier, found end of input".to_string(),
            }),
        }
    }

    /// An identifier immediately followed (no whitespace) by more identifier
    /// material is one malformed identifier, not two tokens.
    fn check_adjacent_ident(&mut self, span: SrcSpan) -> PResult<()> {
        let Some(next) = self.peek() else { return Ok(()) };
        let adjacent = next.span.start.offset == span.end.offset;
        let id_material = matches!(
            next.kind,
            TokenKind::Ident(_)
                | TokenKind::TypeIdent(_)
                | TokenKind::Placeholder
                | TokenKind::Int(_)
        );
        if adjacent && id_material {
            let full = span.merge(next.span);
            let text = self.source.slice(full).to_string();
            self.errors.push(ParseError::MalformedIdentifier {
                span: full,
                message: format!("malformed identifier `{text}`"),
            });
            return Err(Fail {
                span: full,
                message: format!("malformed identifier `{text}`"),
            });
        }
        Ok(())
    }

    pub(crate) fn origin(&self, span: SrcSpan) -> SourceOrigin {
        SourceOrigin::FromSource(span)
    }

    pub(crate) fn eof_span(&self) -> SrcSpan {
        let len = self.source.len() as u32;
        let point = self.source.point_at(len);
        SrcSpan::new(point, point)
    }

    fn buffer_origin(&self) -> SourceOrigin {
        SourceOrigin::FromSource(self.source.span(0..self.source.len()))
    }

    pub(crate) fn slice(&self, span: SrcSpan) -> &str {
        self.source.slice(span)
    }
}
