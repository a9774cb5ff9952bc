//! Expression Lexer
//!
//! Tokenizes the expressions used by constraints, predicate scans and
//! computed columns.
//!
//! Example:
//! ```text
//! len(@value@) > 0 AND NOT isNull(@value.owner@)
//! age >= 18 && country = 'NL'
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,

    // Literals
    Identifier(String),
    String(String),
    Integer(i64),
    Float(f64),
    True,
    False,
    Null,
    /// `@value@` or `@value.path@`; holds the dotted path after `value`
    Placeholder(Vec<String>),

    // Operators
    Equal,         // = or ==
    NotEqual,      // != or <>
    LessThan,      // <
    LessThanEq,    // <=
    GreaterThan,   // >
    GreaterThanEq, // >=
    Plus,          // +
    Minus,         // -
    Star,          // *
    Slash,         // /
    Percent,       // %
    Bang,          // !
    AndAnd,        // &&
    OrOr,          // ||
    Dot,           // .
    Comma,         // ,

    // Brackets
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [
    RightBracket, // ]

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "Identifier({})", s),
            Token::String(s) => write!(f, "String(\"{}\")", s),
            Token::Integer(n) => write!(f, "Integer({})", n),
            Token::Float(n) => write!(f, "Float({})", n),
            Token::Placeholder(path) if path.is_empty() => write!(f, "@value@"),
            Token::Placeholder(path) => write!(f, "@value.{}@", path.join(".")),
            _ => write!(f, "{:?}", self),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current = chars.first().copied();
        Lexer {
            input: chars,
            position: 0,
            current_char: current,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, String> {
        self.skip_whitespace();

        match self.current_char {
            None => Ok(Token::Eof),
            Some(ch) => {
                if ch.is_alphabetic() || ch == '_' {
                    Ok(self.read_identifier())
                } else if ch.is_ascii_digit() {
                    self.read_number()
                } else if ch == '\'' || ch == '"' {
                    self.read_string(ch)
                } else if ch == '@' {
                    self.read_placeholder()
                } else {
                    self.read_operator(ch)
                }
            }
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_identifier(&mut self) -> Token {
        let result = self.read_word();

        // Keywords are case-insensitive
        match result.to_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "NULL" => Token::Null,
            _ => Token::Identifier(result),
        }
    }

    fn read_number(&mut self) -> Result<Token, String> {
        let mut result = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                result.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek().map_or(false, |c| c.is_ascii_digit()) {
                is_float = true;
                result.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && !result.contains(['e', 'E']) {
                let next = self.peek();
                if next.map_or(false, |c| c.is_ascii_digit() || c == '-' || c == '+') {
                    is_float = true;
                    result.push(ch);
                    self.advance();
                    if let Some(sign @ ('-' | '+')) = self.current_char {
                        result.push(sign);
                        self.advance();
                    }
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        if is_float {
            result
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|e| format!("Invalid float: {}", e))
        } else {
            result
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|e| format!("Invalid integer: {}", e))
        }
    }

    fn read_string(&mut self, quote_char: char) -> Result<Token, String> {
        self.advance(); // skip opening quote

        let mut result = String::new();
        let mut escaped = false;

        while let Some(ch) = self.current_char {
            if escaped {
                match ch {
                    'n' => result.push('\n'),
                    't' => result.push('\t'),
                    'r' => result.push('\r'),
                    '\\' => result.push('\\'),
                    '\'' => result.push('\''),
                    '"' => result.push('"'),
                    _ => {
                        result.push('\\');
                        result.push(ch);
                    }
                }
                escaped = false;
                self.advance();
            } else if ch == '\\' {
                escaped = true;
                self.advance();
            } else if ch == quote_char {
                self.advance(); // skip closing quote
                return Ok(Token::String(result));
            } else {
                result.push(ch);
                self.advance();
            }
        }

        Err("Unterminated string literal".to_string())
    }

    /// `@value@`, `@value.a.b@`
    fn read_placeholder(&mut self) -> Result<Token, String> {
        self.advance(); // skip '@'
        let mut segments = Vec::new();
        loop {
            let segment = self.read_word();
            if segment.is_empty() {
                return Err(format!("Malformed placeholder at position {}", self.position));
            }
            segments.push(segment);
            match self.current_char {
                Some('.') => self.advance(),
                Some('@') => {
                    self.advance();
                    break;
                }
                _ => return Err("Unterminated placeholder (expected closing '@')".to_string()),
            }
        }

        if segments[0] != "value" {
            return Err(format!("Unknown placeholder '@{}@'", segments.join(".")));
        }
        segments.remove(0);
        Ok(Token::Placeholder(segments))
    }

    fn read_operator(&mut self, ch: char) -> Result<Token, String> {
        let next = self.peek();

        let (token, width) = match (ch, next) {
            ('=', Some('=')) => (Token::Equal, 2),
            ('=', _) => (Token::Equal, 1),
            ('!', Some('=')) => (Token::NotEqual, 2),
            ('!', _) => (Token::Bang, 1),
            ('<', Some('>')) => (Token::NotEqual, 2),
            ('<', Some('=')) => (Token::LessThanEq, 2),
            ('<', _) => (Token::LessThan, 1),
            ('>', Some('=')) => (Token::GreaterThanEq, 2),
            ('>', _) => (Token::GreaterThan, 1),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LeftParen, 1),
            (')', _) => (Token::RightParen, 1),
            ('[', _) => (Token::LeftBracket, 1),
            (']', _) => (Token::RightBracket, 1),
            _ => return Err(format!("Unexpected character: {}", ch)),
        };

        for _ in 0..width {
            self.advance();
        }
        Ok(token)
    }
}
