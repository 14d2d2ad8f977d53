use std::borrow::Cow;

use crate::error::{Error, ErrorKind};
use crate::tokens::{Span, Token};
use crate::utils::memstr;

/// Internal scanner state.
///
/// The scanner walks the template left to right.  Literal text between
/// directives becomes [`Token::TemplateData`]; the content of a directive is
/// tokenized in place.  Output directives are bracketed by
/// `OutputStart`/`OutputEnd` tokens while statement directives contribute
/// their tokens transparently, so the parser sees one uninterrupted program
/// in source order.
struct Tokenizer<'a> {
    rest: &'a str,
    code: &'a str,
    in_code: bool,
    pending_output_end: bool,
    failed: bool,
    current_line: usize,
    current_col: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Tokenizer<'a> {
        Tokenizer {
            rest: input,
            code: "",
            in_code: false,
            pending_output_end: false,
            failed: false,
            current_line: 1,
            current_col: 0,
        }
    }

    fn loc(&self) -> (usize, usize) {
        (self.current_line, self.current_col)
    }

    fn span(&self, start: (usize, usize)) -> Span {
        let (start_line, start_col) = start;
        Span {
            start_line,
            start_col,
            end_line: self.current_line,
            end_col: self.current_col,
        }
    }

    /// Consumes `bytes` from the input, keeping line/column info current.
    fn advance(&mut self, bytes: usize) -> &'a str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        self.rest = new_rest;
        if self.in_code {
            self.code = &self.code[bytes.min(self.code.len())..];
        }
        skipped
    }

    fn syntax_error(&mut self, kind: ErrorKind, msg: &'static str) -> Option<Result<(Token<'a>, Span), Error>> {
        self.failed = true;
        Some(Err(Error::new(kind, msg)))
    }

    fn next_token(&mut self) -> Option<Result<(Token<'a>, Span), Error>> {
        loop {
            if self.failed {
                return None;
            }

            if self.in_code {
                // in directives whitespace is insignificant, skip it.
                let ws = self
                    .code
                    .as_bytes()
                    .iter()
                    .position(|&x| !x.is_ascii_whitespace())
                    .unwrap_or(self.code.len());
                if ws > 0 {
                    self.advance(ws);
                }
                if self.code.is_empty() {
                    // directive content exhausted, consume the close marker
                    let old_loc = self.loc();
                    self.in_code = false;
                    self.advance(2);
                    if self.pending_output_end {
                        self.pending_output_end = false;
                        return Some(Ok((Token::OutputEnd, self.span(old_loc))));
                    }
                    continue;
                }
                return Some(self.code_token());
            }

            if self.rest.is_empty() {
                return None;
            }

            let old_loc = self.loc();
            if let Some("<%") = self.rest.get(..2) {
                self.advance(2);
                let escaped = match self.rest.as_bytes().first() {
                    Some(b'=') => {
                        self.advance(1);
                        Some(true)
                    }
                    Some(b'-') => {
                        self.advance(1);
                        Some(false)
                    }
                    _ => None,
                };
                // directives end at the first following close marker, so
                // adjacent directives never merge
                match memstr(self.rest.as_bytes(), b"%>") {
                    Some(close) => {
                        self.code = &self.rest[..close];
                        self.in_code = true;
                        match escaped {
                            Some(esc) => {
                                self.pending_output_end = true;
                                return Some(Ok((Token::OutputStart(esc), self.span(old_loc))));
                            }
                            None => continue,
                        }
                    }
                    None => {
                        return self.syntax_error(
                            ErrorKind::UnterminatedDirective,
                            "directive was opened with `<%` but never closed with `%>`",
                        );
                    }
                }
            }

            let lead = match memstr(self.rest.as_bytes(), b"<%") {
                Some(start) => self.advance(start),
                None => self.advance(self.rest.len()),
            };
            return Some(Ok((Token::TemplateData(lead), self.span(old_loc))));
        }
    }

    /// Lexes a single token of directive code.  The cursor is known to sit
    /// on a non-whitespace byte inside the current directive.
    fn code_token(&mut self) -> Result<(Token<'a>, Span), Error> {
        let old_loc = self.loc();

        macro_rules! syntax_error {
            ($msg:expr) => {{
                self.failed = true;
                return Err(Error::new(ErrorKind::SyntaxError, $msg));
            }};
        }

        // three and two character operators first
        let op = match self.code.as_bytes().get(..3) {
            Some(b"===") => Some((Token::Eq, 3)),
            Some(b"!==") => Some((Token::Ne, 3)),
            _ => None,
        };
        let op = op.or_else(|| match self.code.as_bytes().get(..2) {
            Some(b"==") => Some((Token::Eq, 2)),
            Some(b"!=") => Some((Token::Ne, 2)),
            Some(b">=") => Some((Token::Gte, 2)),
            Some(b"<=") => Some((Token::Lte, 2)),
            Some(b"&&") => Some((Token::And, 2)),
            Some(b"||") => Some((Token::Or, 2)),
            Some(b"+=") => Some((Token::PlusAssign, 2)),
            Some(b"=>") => Some((Token::Arrow, 2)),
            _ => None,
        });
        if let Some((tok, len)) = op {
            self.advance(len);
            return Ok((tok, self.span(old_loc)));
        }

        // single character operators (and strings)
        let op = match self.code.as_bytes().first() {
            Some(b'+') => Some(Token::Plus),
            Some(b'-') => Some(Token::Minus),
            Some(b'*') => Some(Token::Mul),
            Some(b'/') => Some(Token::Div),
            Some(b'%') => Some(Token::Mod),
            Some(b'!') => Some(Token::Bang),
            Some(b'.') => Some(Token::Dot),
            Some(b',') => Some(Token::Comma),
            Some(b';') => Some(Token::Semicolon),
            Some(b':') => Some(Token::Colon),
            Some(b'?') => Some(Token::Question),
            Some(b'=') => Some(Token::Assign),
            Some(b'>') => Some(Token::Gt),
            Some(b'<') => Some(Token::Lt),
            Some(b'(') => Some(Token::ParenOpen),
            Some(b')') => Some(Token::ParenClose),
            Some(b'[') => Some(Token::BracketOpen),
            Some(b']') => Some(Token::BracketClose),
            Some(b'{') => Some(Token::BraceOpen),
            Some(b'}') => Some(Token::BraceClose),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            return Ok((op, self.span(old_loc)));
        }

        // string literals
        if let Some(&delim) = self
            .code
            .as_bytes()
            .first()
            .filter(|&&c| c == b'\'' || c == b'"')
        {
            let mut escaped = false;
            let mut has_escapes = false;
            let str_len = self
                .code
                .as_bytes()
                .iter()
                .skip(1)
                .take_while(|&&c| match (escaped, c) {
                    (true, _) => {
                        escaped = false;
                        true
                    }
                    (_, b'\\') => {
                        escaped = true;
                        has_escapes = true;
                        true
                    }
                    (_, b'\r') | (_, b'\n') => false,
                    (_, c) => c != delim,
                })
                .count();
            if escaped || self.code.as_bytes().get(str_len + 1) != Some(&delim) {
                syntax_error!("unexpected end of string");
            }
            let s = self.advance(str_len + 2);
            let inner = &s[1..s.len() - 1];
            let tok = if has_escapes {
                Token::Str(Cow::Owned(unescape(inner)))
            } else {
                Token::Str(Cow::Borrowed(inner))
            };
            return Ok((tok, self.span(old_loc)));
        }

        // numbers
        if self
            .code
            .as_bytes()
            .first()
            .map_or(false, |c| c.is_ascii_digit())
        {
            let mut is_float = false;
            let num_len = self
                .code
                .as_bytes()
                .iter()
                .take_while(|&&c| {
                    if !is_float && c == b'.' {
                        is_float = true;
                        true
                    } else {
                        c.is_ascii_digit()
                    }
                })
                .count();
            let num = self.advance(num_len);
            let tok = if is_float {
                Token::Float(match num.parse::<f64>() {
                    Ok(val) => val,
                    Err(_) => syntax_error!("invalid float"),
                })
            } else {
                Token::Int(match num.parse::<i64>() {
                    Ok(val) => val,
                    Err(_) => syntax_error!("invalid integer"),
                })
            };
            return Ok((tok, self.span(old_loc)));
        }

        // identifiers
        let ident_len = self
            .code
            .as_bytes()
            .iter()
            .enumerate()
            .take_while(|&(idx, &c)| {
                if c == b'_' {
                    true
                } else if idx == 0 {
                    c.is_ascii_alphabetic()
                } else {
                    c.is_ascii_alphanumeric()
                }
            })
            .count();
        if ident_len > 0 {
            let ident = self.advance(ident_len);
            return Ok((Token::Ident(ident), self.span(old_loc)));
        }

        syntax_error!("unexpected character in directive");
    }
}

/// Resolves backslash escapes inside a string literal.  Unknown escapes keep
/// the escaped character, which is what the templates this engine inherits
/// were written against.
fn unescape(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => rv.push('\n'),
                Some('t') => rv.push('\t'),
                Some('r') => rv.push('\r'),
                Some('0') => rv.push('\0'),
                Some(other) => rv.push(other),
                None => {}
            }
        } else {
            rv.push(c);
        }
    }
    rv
}

/// Tokenizes the template source.
pub fn tokenize(input: &str) -> impl Iterator<Item = Result<(Token<'_>, Span), Error>> {
    let mut tokenizer = Tokenizer::new(input);
    std::iter::from_fn(move || tokenizer.next_token())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Result<Vec<Token<'_>>, Error> {
        tokenize(input)
            .map(|x| x.map(|(tok, _)| tok))
            .collect::<Result<Vec<_>, _>>()
    }

    #[test]
    fn test_basic_stream() {
        let tokens = lex("<h1><%= user.name %></h1>").unwrap();
        insta::assert_debug_snapshot!(&tokens, @r###"
        [
            TEMPLATE_DATA("<h1>"),
            OUTPUT_START(true),
            IDENT(user),
            DOT,
            IDENT(name),
            OUTPUT_END,
            TEMPLATE_DATA("</h1>"),
        ]
        "###);
    }

    #[test]
    fn test_statement_is_transparent() {
        let tokens = lex("<% if (x) { %>A<% } %>").unwrap();
        insta::assert_debug_snapshot!(&tokens, @r###"
        [
            IDENT(if),
            PAREN_OPEN,
            IDENT(x),
            PAREN_CLOSE,
            BRACE_OPEN,
            TEMPLATE_DATA("A"),
            BRACE_CLOSE,
        ]
        "###);
    }

    #[test]
    fn test_raw_output_marker() {
        let tokens = lex("<%- body %>").unwrap();
        assert!(matches!(tokens[0], Token::OutputStart(false)));
        assert!(matches!(tokens[2], Token::OutputEnd));
    }

    #[test]
    fn test_adjacent_directives_do_not_merge() {
        let tokens = lex("<%= a %><%= b %>").unwrap();
        assert_eq!(tokens.len(), 6);
        assert!(matches!(tokens[2], Token::OutputEnd));
        assert!(matches!(tokens[3], Token::OutputStart(true)));
    }

    #[test]
    fn test_unterminated_directive() {
        let err = lex("text <% if (true) {").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnterminatedDirective);
    }

    #[test]
    fn test_empty_statement_emits_nothing() {
        let tokens = lex("a<%   %>b").unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex("<%= 'a\\nb' %>").unwrap();
        match &tokens[1] {
            Token::Str(s) => assert_eq!(&**s, "a\nb"),
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_line_tracking() {
        let results: Vec<_> = tokenize("line\n<%= x\n+ y %>")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let (_, span) = &results[4];
        assert_eq!(span.start_line, 3);
    }
}
