/// Token types for the SQL lexer
use phf::phf_map;

// Reserved words only. Everything else (type names, FUNCTION, LANGUAGE, ...)
// stays an identifier and is matched contextually by the parser.
static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "select" => TokenType::Select,
    "from" => TokenType::From,
    "where" => TokenType::Where,
    "insert" => TokenType::Insert,
    "into" => TokenType::Into,
    "values" => TokenType::Values,
    "update" => TokenType::Update,
    "set" => TokenType::Set,
    "delete" => TokenType::Delete,
    "create" => TokenType::Create,
    "table" => TokenType::Table,
    "drop" => TokenType::Drop,
    "and" => TokenType::And,
    "or" => TokenType::Or,
    "not" => TokenType::Not,
    "is" => TokenType::Is,
    "null" => TokenType::Null,
    "as" => TokenType::As,
    "order" => TokenType::Order,
    "by" => TokenType::By,
    "asc" => TokenType::Asc,
    "desc" => TokenType::Desc,
    "limit" => TokenType::Limit,
    "offset" => TokenType::Offset,
    "primary" => TokenType::Primary,
    "key" => TokenType::Key,
    "show" => TokenType::Show,
    "true" => TokenType::True,
    "false" => TokenType::False,
    "if" => TokenType::If,
    "exists" => TokenType::Exists,
    "returning" => TokenType::Returning,
    "on" => TokenType::On,
    "all" => TokenType::All,
    "to" => TokenType::To,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Create,
    Table,
    Drop,
    And,
    Or,
    Not,
    Is,
    Null,
    As,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Primary,
    Key,
    Show,
    True,
    False,
    If,
    Exists,
    Returning,
    On,
    All,
    To,

    // Operators
    Eq,          // =
    Ne,          // != or <>
    Lt,          // <
    Gt,          // >
    Le,          // <=
    Ge,          // >=
    Plus,        // +
    Minus,       // -
    Star,        // *
    Slash,       // /
    Percent,     // %
    Concat,      // ||
    DoubleColon, // ::

    // Delimiters
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    // Literals
    Number(String),
    String(String),
    Identifier(String),

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, line: usize, column: usize) -> Self {
        Self { token_type, line, column }
    }
}

impl TokenType {
    /// Keyword for `s`, case-insensitively.
    pub fn from_keyword(s: &str) -> Option<Self> {
        let lowercase = s.to_lowercase();
        KEYWORDS.get(lowercase.as_str()).cloned()
    }
}
