/// SQL Lexer - converts SQL text into tokens
///
/// Unquoted identifiers fold to lower case; double-quoted identifiers keep
/// their spelling. String literals use single quotes with `''` as the escape.
use super::token::{Token, TokenType};
use crate::backend::error::{BackendError, Result};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        let line = self.line;
        let column = self.column;

        if self.is_eof() {
            return Ok(Token::new(TokenType::Eof, line, column));
        }

        let ch = self.current_char();

        // Skip comments
        if ch == '-' && self.peek_char() == Some('-') {
            self.skip_line_comment();
            return self.next_token();
        }

        if ch == '/' && self.peek_char() == Some('*') {
            self.skip_block_comment()?;
            return self.next_token();
        }

        let token_type = match ch {
            '\'' => self.read_string()?,
            '"' => self.read_quoted_identifier()?,
            '0'..='9' => self.read_number()?,
            '.' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => self.read_number()?,
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),

            '=' => {
                self.advance();
                TokenType::Eq
            }
            '!' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ne
                } else {
                    return Err(self.error_at("syntax error at or near \"!\"", line, column));
                }
            }
            '<' => {
                self.advance();
                match self.current_char() {
                    '=' => {
                        self.advance();
                        TokenType::Le
                    }
                    '>' => {
                        self.advance();
                        TokenType::Ne
                    }
                    _ => TokenType::Lt,
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    TokenType::Ge
                } else {
                    TokenType::Gt
                }
            }
            '|' => {
                self.advance();
                if self.current_char() == '|' {
                    self.advance();
                    TokenType::Concat
                } else {
                    return Err(self.error_at("syntax error at or near \"|\"", line, column));
                }
            }
            ':' => {
                self.advance();
                if self.current_char() == ':' {
                    self.advance();
                    TokenType::DoubleColon
                } else {
                    return Err(self.error_at("syntax error at or near \":\"", line, column));
                }
            }
            '+' => {
                self.advance();
                TokenType::Plus
            }
            '-' => {
                self.advance();
                TokenType::Minus
            }
            '*' => {
                self.advance();
                TokenType::Star
            }
            '/' => {
                self.advance();
                TokenType::Slash
            }
            '%' => {
                self.advance();
                TokenType::Percent
            }
            '(' => {
                self.advance();
                TokenType::LParen
            }
            ')' => {
                self.advance();
                TokenType::RParen
            }
            ',' => {
                self.advance();
                TokenType::Comma
            }
            ';' => {
                self.advance();
                TokenType::Semicolon
            }
            '.' => {
                self.advance();
                TokenType::Dot
            }
            _ => {
                return Err(self.error_at(&format!("syntax error at or near \"{}\"", ch), line, column));
            }
        };

        Ok(Token::new(token_type, line, column))
    }

    fn error_at(&self, msg: &str, line: usize, column: usize) -> BackendError {
        BackendError::syntax(format!("{} at line {} column {}", msg, line, column))
    }

    fn current_char(&self) -> char {
        if self.is_eof() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            if self.input[self.position] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_eof() && self.current_char() != '\n' {
            self.advance();
        }
        if !self.is_eof() {
            self.advance(); // skip newline
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        self.advance(); // skip '/'
        self.advance(); // skip '*'

        while !self.is_eof() {
            if self.current_char() == '*' && self.peek_char() == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        Err(BackendError::syntax("unterminated /* comment"))
    }

    fn read_string(&mut self) -> Result<TokenType> {
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            if self.is_eof() {
                return Err(BackendError::syntax("unterminated quoted string"));
            }
            let ch = self.current_char();
            self.advance();
            if ch == '\'' {
                if self.current_char() == '\'' && !self.is_eof() {
                    value.push('\'');
                    self.advance();
                } else {
                    break;
                }
            } else {
                value.push(ch);
            }
        }

        Ok(TokenType::String(value))
    }

    fn read_quoted_identifier(&mut self) -> Result<TokenType> {
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            if self.is_eof() {
                return Err(BackendError::syntax("unterminated quoted identifier"));
            }
            let ch = self.current_char();
            self.advance();
            if ch == '"' {
                if self.current_char() == '"' && !self.is_eof() {
                    value.push('"');
                    self.advance();
                } else {
                    break;
                }
            } else {
                value.push(ch);
            }
        }

        if value.is_empty() {
            return Err(BackendError::syntax("zero-length delimited identifier"));
        }
        Ok(TokenType::Identifier(value))
    }

    fn read_number(&mut self) -> Result<TokenType> {
        let mut value = String::new();

        while !self.is_eof() && (self.current_char().is_ascii_digit() || self.current_char() == '.') {
            value.push(self.current_char());
            self.advance();
        }

        // Scientific notation (e.g., 1.5e10)
        if !self.is_eof() && (self.current_char() == 'e' || self.current_char() == 'E') {
            value.push(self.current_char());
            self.advance();
            if !self.is_eof() && (self.current_char() == '+' || self.current_char() == '-') {
                value.push(self.current_char());
                self.advance();
            }
            while !self.is_eof() && self.current_char().is_ascii_digit() {
                value.push(self.current_char());
                self.advance();
            }
        }

        if value.matches('.').count() > 1 || value.parse::<f64>().is_err() {
            return Err(BackendError::syntax(format!("invalid number: {}", value)));
        }
        Ok(TokenType::Number(value))
    }

    fn read_identifier(&mut self) -> TokenType {
        let mut value = String::new();

        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenType::from_keyword(&value).unwrap_or_else(|| TokenType::Identifier(value.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_simple_select() {
        let mut lexer = Lexer::new("SELECT * FROM users");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(tokens.len(), 5); // SELECT, *, FROM, users, EOF
        assert!(matches!(tokens[0].token_type, TokenType::Select));
        assert!(matches!(tokens[1].token_type, TokenType::Star));
        assert!(matches!(tokens[2].token_type, TokenType::From));
        assert!(matches!(tokens[3].token_type, TokenType::Identifier(ref s) if s == "users"));
        assert!(matches!(tokens[4].token_type, TokenType::Eof));
    }

    #[test]
    fn test_lexer_identifier_folding() {
        let mut lexer = Lexer::new("SELECT Name, \"MixedCase\" FROM T");
        let tokens = lexer.tokenize().unwrap();
        assert!(matches!(tokens[1].token_type, TokenType::Identifier(ref s) if s == "name"));
        assert!(matches!(tokens[3].token_type, TokenType::Identifier(ref s) if s == "MixedCase"));
        assert!(matches!(tokens[5].token_type, TokenType::Identifier(ref s) if s == "t"));
    }

    #[test]
    fn test_lexer_string_literal_escape() {
        let mut lexer = Lexer::new("SELECT 'it''s'");
        let tokens = lexer.tokenize().unwrap();
        assert!(matches!(tokens[1].token_type, TokenType::String(ref s) if s == "it's"));
    }

    #[test]
    fn test_lexer_operators() {
        let mut lexer = Lexer::new("= != <> < > <= >= + - * / || ::");
        let tokens = lexer.tokenize().unwrap();

        assert!(matches!(tokens[0].token_type, TokenType::Eq));
        assert!(matches!(tokens[1].token_type, TokenType::Ne));
        assert!(matches!(tokens[2].token_type, TokenType::Ne));
        assert!(matches!(tokens[3].token_type, TokenType::Lt));
        assert!(matches!(tokens[5].token_type, TokenType::Le));
        assert!(matches!(tokens[11].token_type, TokenType::Concat));
        assert!(matches!(tokens[12].token_type, TokenType::DoubleColon));
    }

    #[test]
    fn test_lexer_numbers() {
        let mut lexer = Lexer::new("42 1.5 2e3");
        let tokens = lexer.tokenize().unwrap();
        assert!(matches!(tokens[0].token_type, TokenType::Number(ref s) if s == "42"));
        assert!(matches!(tokens[1].token_type, TokenType::Number(ref s) if s == "1.5"));
        assert!(matches!(tokens[2].token_type, TokenType::Number(ref s) if s == "2e3"));
    }

    #[test]
    fn test_lexer_comment() {
        let mut lexer = Lexer::new("SELECT * -- this is a comment\nFROM /* block */ users");
        let tokens = lexer.tokenize().unwrap();

        assert_eq!(tokens.len(), 5);
        assert!(matches!(tokens[2].token_type, TokenType::From));
    }

    #[test]
    fn test_lexer_errors() {
        assert!(Lexer::new("SELECT 'open").tokenize().is_err());
        assert!(Lexer::new("SELECT a | b").tokenize().is_err());
        assert!(Lexer::new("SELECT /* open").tokenize().is_err());
    }
}
