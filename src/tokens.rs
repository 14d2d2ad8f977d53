use std::borrow::Cow;
use std::fmt;

/// Represents a token in the stream.
///
/// Literal template text and output directive delimiters appear in the same
/// stream as the tokens of directive code.  Statement directives contribute
/// their code tokens without any delimiter, which is what allows a control
/// construct to open in one directive and close in a later one.
pub enum Token<'a> {
    /// Raw template data outside of directives.
    TemplateData(&'a str),
    /// Start of an output directive (true if the output is HTML escaped).
    OutputStart(bool),
    /// End of an output directive.
    OutputEnd,
    /// An identifier.
    Ident(&'a str),
    /// A string literal.
    Str(Cow<'a, str>),
    /// An integer (limited to i64)
    Int(i64),
    /// A float
    Float(f64),
    /// A plus (`+`) operator.
    Plus,
    /// A minus (`-`) operator.
    Minus,
    /// A mul (`*`) operator.
    Mul,
    /// A div (`/`) operator.
    Div,
    /// A mod (`%`) operator.
    Mod,
    /// The bang (`!`) operator.
    Bang,
    /// A dot operator (`.`)
    Dot,
    /// The comma operator (`,`)
    Comma,
    /// The semicolon separator (`;`)
    Semicolon,
    /// The colon operator (`:`)
    Colon,
    /// The question mark (`?`) of a ternary.
    Question,
    /// The assignment operator (`=`)
    Assign,
    /// The compound assignment operator (`+=`)
    PlusAssign,
    /// `==` or `===` operator
    Eq,
    /// `!=` or `!==` operator
    Ne,
    /// `>` operator
    Gt,
    /// `>=` operator
    Gte,
    /// `<` operator
    Lt,
    /// `<=` operator
    Lte,
    /// `&&` operator
    And,
    /// `||` operator
    Or,
    /// `=>` of an arrow callback
    Arrow,
    /// Open Bracket
    BracketOpen,
    /// Close Bracket
    BracketClose,
    /// Open Parenthesis
    ParenOpen,
    /// Close Parenthesis
    ParenClose,
    /// Open Brace
    BraceOpen,
    /// Close Brace
    BraceClose,
}

impl<'a> fmt::Debug for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::TemplateData(s) => write!(f, "TEMPLATE_DATA({:?})", s),
            Token::OutputStart(esc) => write!(f, "OUTPUT_START({:?})", esc),
            Token::OutputEnd => write!(f, "OUTPUT_END"),
            Token::Ident(i) => write!(f, "IDENT({})", i),
            Token::Str(s) => write!(f, "STR({:?})", s),
            Token::Int(i) => write!(f, "INT({:?})", i),
            Token::Float(v) => write!(f, "FLOAT({:?})", v),
            Token::Plus => write!(f, "PLUS"),
            Token::Minus => write!(f, "MINUS"),
            Token::Mul => write!(f, "MUL"),
            Token::Div => write!(f, "DIV"),
            Token::Mod => write!(f, "MOD"),
            Token::Bang => write!(f, "BANG"),
            Token::Dot => write!(f, "DOT"),
            Token::Comma => write!(f, "COMMA"),
            Token::Semicolon => write!(f, "SEMICOLON"),
            Token::Colon => write!(f, "COLON"),
            Token::Question => write!(f, "QUESTION"),
            Token::Assign => write!(f, "ASSIGN"),
            Token::PlusAssign => write!(f, "PLUS_ASSIGN"),
            Token::Eq => write!(f, "EQ"),
            Token::Ne => write!(f, "NE"),
            Token::Gt => write!(f, "GT"),
            Token::Gte => write!(f, "GTE"),
            Token::Lt => write!(f, "LT"),
            Token::Lte => write!(f, "LTE"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Arrow => write!(f, "ARROW"),
            Token::BracketOpen => write!(f, "BRACKET_OPEN"),
            Token::BracketClose => write!(f, "BRACKET_CLOSE"),
            Token::ParenOpen => write!(f, "PAREN_OPEN"),
            Token::ParenClose => write!(f, "PAREN_CLOSE"),
            Token::BraceOpen => write!(f, "BRACE_OPEN"),
            Token::BraceClose => write!(f, "BRACE_CLOSE"),
        }
    }
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::TemplateData(_) => write!(f, "template-data"),
            Token::OutputStart(_) => write!(f, "start of output directive"),
            Token::OutputEnd => write!(f, "end of output directive"),
            Token::Ident(_) => write!(f, "identifier"),
            Token::Str(_) => write!(f, "string"),
            Token::Int(_) => write!(f, "integer"),
            Token::Float(_) => write!(f, "float"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Mul => write!(f, "`*`"),
            Token::Div => write!(f, "`/`"),
            Token::Mod => write!(f, "`%`"),
            Token::Bang => write!(f, "`!`"),
            Token::Dot => write!(f, "`.`"),
            Token::Comma => write!(f, "`,`"),
            Token::Semicolon => write!(f, "`;`"),
            Token::Colon => write!(f, "`:`"),
            Token::Question => write!(f, "`?`"),
            Token::Assign => write!(f, "`=`"),
            Token::PlusAssign => write!(f, "`+=`"),
            Token::Eq => write!(f, "`==`"),
            Token::Ne => write!(f, "`!=`"),
            Token::Gt => write!(f, "`>`"),
            Token::Gte => write!(f, "`>=`"),
            Token::Lt => write!(f, "`<`"),
            Token::Lte => write!(f, "`<=`"),
            Token::And => write!(f, "`&&`"),
            Token::Or => write!(f, "`||`"),
            Token::Arrow => write!(f, "`=>`"),
            Token::BracketOpen => write!(f, "`[`"),
            Token::BracketClose => write!(f, "`]`"),
            Token::ParenOpen => write!(f, "`(`"),
            Token::ParenClose => write!(f, "`)`"),
            Token::BraceOpen => write!(f, "`{{`"),
            Token::BraceClose => write!(f, "`}}`"),
        }
    }
}

/// Token span information
#[derive(Clone, Copy, Default)]
pub struct Span {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " @ {}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}
