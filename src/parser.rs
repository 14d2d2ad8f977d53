use crate::ast::{self, Spanned};
use crate::error::{Error, ErrorKind};
use crate::lexer::tokenize;
use crate::tokens::{Span, Token};
use crate::value::Value;

/// Names that cannot be used as assignment or loop targets and that context
/// keys must not collide with.
pub const RESERVED_NAMES: [&str; 5] = ["true", "false", "null", "undefined", "print"];

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(Error::new(ErrorKind::SyntaxError, $msg));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(Error::new(ErrorKind::SyntaxError, format!($msg, $($tt)*)));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $expectation:expr) => {{
        match $parser.stream.next()? {
            Some(rv) => Ok(rv),
            None => Err(Error::new(
                ErrorKind::SyntaxError,
                format!("unexpected end of template, expected {}", $expectation),
            )),
        }
    }};
    ($parser:expr, $match:pat, $expectation:expr) => {{
        match $parser.stream.next()? {
            Some((token, span)) if matches!(token, $match) => Ok((token, span)),
            Some((token, _)) => Err(Error::new(
                ErrorKind::SyntaxError,
                format!("unexpected {}, expected {}", token, $expectation),
            )),
            None => Err(Error::new(
                ErrorKind::SyntaxError,
                format!("unexpected end of template, expected {}", $expectation),
            )),
        }
    }};
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match $parser.stream.next()? {
            Some(($match, span)) => Ok(($target, span)),
            Some((token, _)) => Err(Error::new(
                ErrorKind::SyntaxError,
                format!("unexpected {}, expected {}", token, $expectation),
            )),
            None => Err(Error::new(
                ErrorKind::SyntaxError,
                format!("unexpected end of template, expected {}", $expectation),
            )),
        }
    }};
}

struct TokenStream<'a> {
    iter: Box<dyn Iterator<Item = Result<(Token<'a>, Span), Error>> + 'a>,
    current: Option<Result<(Token<'a>, Span), Error>>,
    current_span: Span,
}

impl<'a> TokenStream<'a> {
    /// Tokenize a template
    pub fn new(source: &'a str) -> TokenStream<'a> {
        TokenStream {
            iter: (Box::new(tokenize(source)) as Box<dyn Iterator<Item = _>>),
            current: None,
            current_span: Span::default(),
        }
    }

    /// Advance the stream.
    pub fn next(&mut self) -> Result<Option<(Token<'a>, Span)>, Error> {
        let rv = self.current.take();
        self.current = self.iter.next();
        if let Some(Ok((_, span))) = rv {
            self.current_span = span;
        }
        rv.transpose()
    }

    /// Look at the current token
    pub fn current(&mut self) -> Result<Option<(&Token<'a>, Span)>, Error> {
        if self.current.is_none() {
            self.current = self.iter.next();
        }
        match self.current {
            Some(Ok(ref tok)) => Ok(Some((&tok.0, tok.1))),
            Some(Err(_)) => Err(self.current.take().unwrap().unwrap_err()),
            None => Ok(None),
        }
    }

    /// Expands the span
    pub fn expand_span(&self, mut span: Span) -> Span {
        span.end_line = self.current_span.end_line;
        span.end_col = self.current_span.end_col;
        span
    }

    /// Returns the last seen span.
    pub fn current_span(&self) -> Span {
        self.current_span
    }
}

struct Parser<'a> {
    stream: TokenStream<'a>,
}

macro_rules! binop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<ast::Expr<'a>, Error> {
            let span = self.stream.current_span();
            let mut left = self.$next()?;
            loop {
                let op = match self.stream.current()? {
                    $($tok)*
                    _ => break,
                };
                self.stream.next()?;
                let right = self.$next()?;
                left = ast::Expr::BinOp(Spanned::new(
                    ast::BinOp {
                        op,
                        left,
                        right,
                    },
                    self.stream.expand_span(span),
                ));
            }
            Ok(left)
        }
    };
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Parser<'a> {
        Parser {
            stream: TokenStream::new(source),
        }
    }

    fn check_target(&self, name: &str) -> Result<(), Error> {
        if RESERVED_NAMES.contains(&name) {
            Err(Error::new(
                ErrorKind::SyntaxError,
                format!("cannot assign to reserved name {}", name),
            ))
        } else {
            Ok(())
        }
    }

    fn parse_expr(&mut self) -> Result<ast::Expr<'a>, Error> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<ast::Expr<'a>, Error> {
        let span = self.stream.current_span();
        let expr = self.parse_or()?;
        if matches!(self.stream.current()?, Some((Token::Question, _))) {
            self.stream.next()?;
            let true_expr = self.parse_expr()?;
            expect_token!(self, Token::Colon, "`:`")?;
            let false_expr = self.parse_ternary()?;
            Ok(ast::Expr::IfExpr(Spanned::new(
                ast::IfExpr {
                    test_expr: expr,
                    true_expr,
                    false_expr,
                },
                self.stream.expand_span(span),
            )))
        } else {
            Ok(expr)
        }
    }

    binop!(parse_or, parse_and, {
        Some((Token::Or, _)) => ast::BinOpKind::ScOr,
    });
    binop!(parse_and, parse_equality, {
        Some((Token::And, _)) => ast::BinOpKind::ScAnd,
    });
    binop!(parse_equality, parse_compare, {
        Some((Token::Eq, _)) => ast::BinOpKind::Eq,
        Some((Token::Ne, _)) => ast::BinOpKind::Ne,
    });
    binop!(parse_compare, parse_math1, {
        Some((Token::Lt, _)) => ast::BinOpKind::Lt,
        Some((Token::Lte, _)) => ast::BinOpKind::Lte,
        Some((Token::Gt, _)) => ast::BinOpKind::Gt,
        Some((Token::Gte, _)) => ast::BinOpKind::Gte,
    });
    binop!(parse_math1, parse_math2, {
        Some((Token::Plus, _)) => ast::BinOpKind::Add,
        Some((Token::Minus, _)) => ast::BinOpKind::Sub,
    });
    binop!(parse_math2, parse_unary, {
        Some((Token::Mul, _)) => ast::BinOpKind::Mul,
        Some((Token::Div, _)) => ast::BinOpKind::Div,
        Some((Token::Mod, _)) => ast::BinOpKind::Rem,
    });

    fn parse_unary(&mut self) -> Result<ast::Expr<'a>, Error> {
        let span = self.stream.current_span();
        let op = match self.stream.current()? {
            Some((Token::Bang, _)) => ast::UnaryOpKind::Not,
            Some((Token::Minus, _)) => ast::UnaryOpKind::Neg,
            _ => {
                let expr = self.parse_primary()?;
                return self.parse_postfix(expr);
            }
        };
        self.stream.next()?;
        Ok(ast::Expr::UnaryOp(Spanned::new(
            ast::UnaryOp {
                op,
                expr: self.parse_unary()?,
            },
            self.stream.expand_span(span),
        )))
    }

    fn parse_postfix(&mut self, expr: ast::Expr<'a>) -> Result<ast::Expr<'a>, Error> {
        let mut expr = expr;
        loop {
            match self.stream.current()? {
                Some((Token::Dot, span)) => {
                    self.stream.next()?;
                    let (name, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
                    expr = ast::Expr::GetAttr(Spanned::new(
                        ast::GetAttr { name, expr },
                        self.stream.expand_span(span),
                    ));
                }
                Some((Token::BracketOpen, span)) => {
                    self.stream.next()?;
                    let subscript_expr = self.parse_expr()?;
                    expect_token!(self, Token::BracketClose, "`]`")?;
                    expr = ast::Expr::GetItem(Spanned::new(
                        ast::GetItem {
                            expr,
                            subscript_expr,
                        },
                        self.stream.expand_span(span),
                    ));
                }
                Some((Token::ParenOpen, span)) => {
                    let args = self.parse_args()?;
                    expr = ast::Expr::Call(Spanned::new(
                        ast::Call { expr, args },
                        self.stream.expand_span(span),
                    ));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<ast::Expr<'a>>, Error> {
        let mut args = Vec::new();
        expect_token!(self, Token::ParenOpen, "`(`")?;
        loop {
            if matches!(self.stream.current()?, Some((Token::ParenClose, _))) {
                break;
            }
            if !args.is_empty() {
                expect_token!(self, Token::Comma, "`,`")?;
            }
            args.push(self.parse_expr()?);
        }
        expect_token!(self, Token::ParenClose, "`)`")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<ast::Expr<'a>, Error> {
        let (token, span) = expect_token!(self, "expression")?;
        macro_rules! const_val {
            ($expr:expr) => {
                ast::Expr::Const(Spanned::new(ast::Const { value: $expr }, span))
            };
        }

        match token {
            Token::Ident("true") => Ok(const_val!(Value::from(true))),
            Token::Ident("false") => Ok(const_val!(Value::from(false))),
            Token::Ident("null") => Ok(const_val!(Value::from(()))),
            Token::Ident("undefined") => Ok(const_val!(Value::UNDEFINED)),
            Token::Ident(name) => Ok(ast::Expr::Var(Spanned::new(ast::Var { id: name }, span))),
            Token::Str(val) => Ok(const_val!(Value::from(val.into_owned()))),
            Token::Int(val) => Ok(const_val!(Value::from(val))),
            Token::Float(val) => Ok(const_val!(Value::from(val))),
            Token::BracketOpen => {
                let mut items = Vec::new();
                loop {
                    if matches!(self.stream.current()?, Some((Token::BracketClose, _))) {
                        break;
                    }
                    if !items.is_empty() {
                        expect_token!(self, Token::Comma, "`,`")?;
                    }
                    items.push(self.parse_expr()?);
                }
                expect_token!(self, Token::BracketClose, "`]`")?;
                Ok(ast::Expr::List(Spanned::new(
                    ast::List { items },
                    self.stream.expand_span(span),
                )))
            }
            Token::BraceOpen => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                loop {
                    if matches!(self.stream.current()?, Some((Token::BraceClose, _))) {
                        break;
                    }
                    if !keys.is_empty() {
                        expect_token!(self, Token::Comma, "`,`")?;
                    }
                    let (key, key_span) = match self.stream.next()? {
                        Some((Token::Ident(name), key_span)) => (name.to_string(), key_span),
                        Some((Token::Str(s), key_span)) => (s.into_owned(), key_span),
                        Some((token, _)) => {
                            syntax_error!("unexpected {}, expected object key", token)
                        }
                        None => syntax_error!("unexpected end of template, expected object key"),
                    };
                    keys.push(ast::Expr::Const(Spanned::new(
                        ast::Const {
                            value: Value::from(key),
                        },
                        key_span,
                    )));
                    expect_token!(self, Token::Colon, "`:`")?;
                    values.push(self.parse_expr()?);
                }
                expect_token!(self, Token::BraceClose, "`}`")?;
                Ok(ast::Expr::Map(Spanned::new(
                    ast::Map { keys, values },
                    self.stream.expand_span(span),
                )))
            }
            Token::ParenOpen => {
                let expr = self.parse_expr()?;
                expect_token!(self, Token::ParenClose, "`)`")?;
                Ok(expr)
            }
            token => syntax_error!("unexpected {}, expected expression", token),
        }
    }

    fn parse_if_stmt(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let span = self.stream.current_span();
        expect_token!(self, Token::Ident("if"), "`if`")?;
        expect_token!(self, Token::ParenOpen, "`(`")?;
        let expr = self.parse_expr()?;
        expect_token!(self, Token::ParenClose, "`)`")?;
        expect_token!(self, Token::BraceOpen, "`{`")?;
        let true_body = self.subparse(true)?;
        expect_token!(self, Token::BraceClose, "`}`")?;
        let false_body = if matches!(self.stream.current()?, Some((Token::Ident("else"), _))) {
            self.stream.next()?;
            if matches!(self.stream.current()?, Some((Token::Ident("if"), _))) {
                vec![self.parse_if_stmt()?]
            } else {
                expect_token!(self, Token::BraceOpen, "`{`")?;
                let rv = self.subparse(true)?;
                expect_token!(self, Token::BraceClose, "`}`")?;
                rv
            }
        } else {
            Vec::new()
        };
        Ok(ast::Stmt::IfCond(Spanned::new(
            ast::IfCond {
                expr,
                true_body,
                false_body,
            },
            self.stream.expand_span(span),
        )))
    }

    fn parse_for_stmt(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let span = self.stream.current_span();
        expect_token!(self, Token::Ident("for"), "`for`")?;
        expect_token!(self, Token::ParenOpen, "`(`")?;
        if matches!(
            self.stream.current()?,
            Some((Token::Ident("var" | "let" | "const"), _))
        ) {
            self.stream.next()?;
        }
        let (target, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
        self.check_target(target)?;
        let over_keys = match self.stream.next()? {
            Some((Token::Ident("of"), _)) => false,
            Some((Token::Ident("in"), _)) => true,
            Some((token, _)) => syntax_error!("unexpected {}, expected `of` or `in`", token),
            None => syntax_error!("unexpected end of template, expected `of` or `in`"),
        };
        let iter = self.parse_expr()?;
        expect_token!(self, Token::ParenClose, "`)`")?;
        expect_token!(self, Token::BraceOpen, "`{`")?;
        let body = self.subparse(true)?;
        expect_token!(self, Token::BraceClose, "`}`")?;
        Ok(ast::Stmt::ForEach(Spanned::new(
            ast::ForEach {
                target,
                index: None,
                iter,
                over_keys,
                body,
            },
            self.stream.expand_span(span),
        )))
    }

    fn parse_declare(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let span = self.stream.current_span();
        self.stream.next()?;
        let (target, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
        self.check_target(target)?;
        let value = if matches!(self.stream.current()?, Some((Token::Assign, _))) {
            self.stream.next()?;
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(ast::Stmt::Declare(Spanned::new(
            ast::Declare { target, value },
            self.stream.expand_span(span),
        )))
    }

    /// Parses the callback and body of a `forEach` iteration once the
    /// receiver expression and the `forEach` attribute have been consumed.
    fn parse_foreach_tail(
        &mut self,
        iter: ast::Expr<'a>,
        span: Span,
    ) -> Result<ast::Stmt<'a>, Error> {
        expect_token!(self, Token::ParenOpen, "`(`")?;
        let (target, index) = match self.stream.next()? {
            // function (item, index) {
            Some((Token::Ident("function"), _)) => {
                expect_token!(self, Token::ParenOpen, "`(`")?;
                let params = self.parse_callback_params()?;
                expect_token!(self, Token::ParenClose, "`)`")?;
                params
            }
            // item => {
            Some((Token::Ident(name), _)) => {
                expect_token!(self, Token::Arrow, "`=>`")?;
                (name, None)
            }
            // (item, index) => {
            Some((Token::ParenOpen, _)) => {
                let params = self.parse_callback_params()?;
                expect_token!(self, Token::ParenClose, "`)`")?;
                expect_token!(self, Token::Arrow, "`=>`")?;
                params
            }
            Some((token, _)) => syntax_error!("unexpected {}, expected iteration callback", token),
            None => syntax_error!("unexpected end of template, expected iteration callback"),
        };
        self.check_target(target)?;
        if let Some(index) = index {
            self.check_target(index)?;
        }
        expect_token!(self, Token::BraceOpen, "`{`")?;
        let body = self.subparse(true)?;
        expect_token!(self, Token::BraceClose, "`}`")?;
        expect_token!(self, Token::ParenClose, "`)`")?;
        Ok(ast::Stmt::ForEach(Spanned::new(
            ast::ForEach {
                target,
                index,
                iter,
                over_keys: false,
                body,
            },
            self.stream.expand_span(span),
        )))
    }

    fn parse_callback_params(&mut self) -> Result<(&'a str, Option<&'a str>), Error> {
        let (target, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
        let index = if matches!(self.stream.current()?, Some((Token::Comma, _))) {
            self.stream.next()?;
            let (index, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
            Some(index)
        } else {
            None
        };
        Ok((target, index))
    }

    /// Parses a statement that starts with an expression: an assignment, a
    /// `forEach` iteration or a plain call evaluated for its side effect.
    fn parse_simple_stmt(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let span = self.stream.current_span();
        let mut expr = self.parse_primary()?;
        loop {
            match self.stream.current()? {
                Some((Token::Dot, attr_span)) => {
                    self.stream.next()?;
                    let (name, _) = expect_token!(self, Token::Ident(name) => name, "identifier")?;
                    if name == "forEach"
                        && matches!(self.stream.current()?, Some((Token::ParenOpen, _)))
                    {
                        return self.parse_foreach_tail(expr, span);
                    }
                    expr = ast::Expr::GetAttr(Spanned::new(
                        ast::GetAttr { name, expr },
                        self.stream.expand_span(attr_span),
                    ));
                }
                Some((Token::BracketOpen, item_span)) => {
                    self.stream.next()?;
                    let subscript_expr = self.parse_expr()?;
                    expect_token!(self, Token::BracketClose, "`]`")?;
                    expr = ast::Expr::GetItem(Spanned::new(
                        ast::GetItem {
                            expr,
                            subscript_expr,
                        },
                        self.stream.expand_span(item_span),
                    ));
                }
                Some((Token::ParenOpen, call_span)) => {
                    let args = self.parse_args()?;
                    expr = ast::Expr::Call(Spanned::new(
                        ast::Call { expr, args },
                        self.stream.expand_span(call_span),
                    ));
                }
                _ => break,
            }
        }

        let target = match expr {
            ast::Expr::Var(ref var) => Some(var.id),
            _ => None,
        };
        let augmented = match self.stream.current()? {
            Some((Token::Assign, _)) => Some(false),
            Some((Token::PlusAssign, _)) => Some(true),
            _ => None,
        };
        if let Some(augmented) = augmented {
            let target = match target {
                Some(target) => target,
                None => syntax_error!("left-hand side of assignment must be a name"),
            };
            self.check_target(target)?;
            self.stream.next()?;
            let value = self.parse_expr()?;
            return Ok(ast::Stmt::Assign(Spanned::new(
                ast::Assign {
                    target,
                    augmented,
                    value,
                },
                self.stream.expand_span(span),
            )));
        }

        Ok(ast::Stmt::ExprStmt(Spanned::new(
            ast::ExprStmt { expr },
            self.stream.expand_span(span),
        )))
    }

    /// Parses a sequence of statements.  With `until_brace` the parse stops
    /// in front of a closing brace, which may well live in a later directive
    /// than the one that opened the construct.
    fn subparse(&mut self, until_brace: bool) -> Result<Vec<ast::Stmt<'a>>, Error> {
        let mut rv = Vec::new();
        while let Some((token, span)) = self.stream.current()? {
            match token {
                Token::BraceClose if until_brace => return Ok(rv),
                Token::TemplateData(_) => {
                    let (raw, span) = match self.stream.next()? {
                        Some((Token::TemplateData(raw), span)) => (raw, span),
                        _ => unreachable!(),
                    };
                    rv.push(ast::Stmt::EmitRaw(Spanned::new(ast::EmitRaw { raw }, span)));
                }
                Token::OutputStart(_) => {
                    let escape = match self.stream.next()? {
                        Some((Token::OutputStart(escape), _)) => escape,
                        _ => unreachable!(),
                    };
                    let expr = self.parse_expr()?;
                    expect_token!(self, Token::OutputEnd, "end of output directive")?;
                    rv.push(ast::Stmt::EmitExpr(Spanned::new(
                        ast::EmitExpr { expr, escape },
                        self.stream.expand_span(span),
                    )));
                }
                Token::Semicolon => {
                    self.stream.next()?;
                }
                Token::Ident("if") => rv.push(self.parse_if_stmt()?),
                Token::Ident("for") => rv.push(self.parse_for_stmt()?),
                Token::Ident("var" | "let" | "const") => rv.push(self.parse_declare()?),
                _ => rv.push(self.parse_simple_stmt()?),
            }
        }
        if until_brace {
            syntax_error!("unexpected end of template, expected `}`");
        }
        Ok(rv)
    }

    fn parse(&mut self) -> Result<ast::Stmt<'a>, Error> {
        let span = self.stream.current_span();
        let children = self.subparse(false)?;
        Ok(ast::Stmt::Template(Spanned::new(
            ast::Template { children },
            self.stream.expand_span(span),
        )))
    }
}

/// Parses a template.
pub fn parse(source: &str) -> Result<ast::Stmt<'_>, Error> {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_output() {
        let ast = parse("<h1><%= user.name %></h1>").unwrap();
        let dump = format!("{:#?}", ast);
        assert!(dump.contains("EmitExpr"));
        assert!(dump.contains("GetAttr"));
    }

    #[test]
    fn test_control_construct_across_directives() {
        let ast = parse("<% if (a) { %>yes<% } else { %>no<% } %>").unwrap();
        let dump = format!("{:#?}", ast);
        assert!(dump.contains("IfCond"));
        assert!(dump.contains("yes"));
        assert!(dump.contains("no"));
    }

    #[test]
    fn test_foreach_callback() {
        let ast =
            parse("<% items.forEach(function(item, i) { %><%= i %>: <%= item %><% }) %>").unwrap();
        let dump = format!("{:#?}", ast);
        assert!(dump.contains("ForEach"));
        assert!(dump.contains("index: Some"));
    }

    #[test]
    fn test_missing_closing_brace() {
        let err = parse("<% if (a) { %>body").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_reserved_target() {
        let err = parse("<% var print = 1 %>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_empty_output_directive() {
        let err = parse("<%= %>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }
}
