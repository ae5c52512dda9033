//! Lexer part of the sandboxed expression engine.
//! Generates tokens from expression text. There is deliberately no token
//! for imports, statements or attribute-style dunder access; the grammar
//! simply cannot express them.

use std::fmt;
use std::fmt::{Debug, Display, Formatter};

#[derive(PartialEq, Debug, Clone)]
#[repr(u8)]
pub enum Operator {
    Multiply,
    Divide,
    Plus,
    Minus,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Assign,
    AssignUndefined,
    Equal,
    NotEqual,
    And,
    Or,

    /// C-like modulus (mathematically the remainder) function.
    Modulus,
    Not,
}

/// Numeric types.
#[derive(PartialEq, Debug, Clone)]
pub enum NumericToken {
    Integer(i64),
    Double(f64),
}

/// Token variants, generated by the lexer.
#[derive(PartialEq, Debug, Clone)]
pub enum Token {
    /// Some constant number. Integer or float.
    Number(NumericToken),
    /// An identifier.
    Identifier(String),
    /// Some constant string expression.
    TString(String),
    /// A constant boolean expression.
    Boolean(bool),
    /// Some operator.
    Operator(Operator),
    /// Some bracket.
    Bracket(char),
    /// A non-whitespace, non-bracket separator (`.`, `,`, `:`).
    Separator(char),
    /// The expression separator (`;`) joining multiple expressions.
    ExpressionSeparator(),
    /// A null value.
    Null(),
    /// Indicates the end of the expression.
    EOE,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Lexer for expressions.
pub struct ExpressionLexer {
    text: Vec<char>,
    pos: usize,
}

impl ExpressionLexer {
    pub fn new(text: &str) -> Self {
        ExpressionLexer {
            text: text.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the whole input. Returns an error message for malformed
    /// input (unterminated strings, unknown characters).
    pub fn tokenize(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            if t == Token::EOE {
                tokens.push(Token::EOE);
                return Ok(tokens);
            }
            tokens.push(t);
        }
    }

    fn peek_char(&self) -> char {
        if self.pos < self.text.len() {
            self.text[self.pos]
        } else {
            '\0'
        }
    }

    fn next_char(&mut self) -> char {
        let c = self.peek_char();
        if c != '\0' {
            self.pos += 1;
        }
        c
    }

    fn next_token(&mut self) -> Result<Token, String> {
        while self.peek_char().is_whitespace() {
            self.pos += 1;
        }
        let c = self.next_char();
        match c {
            '\0' => Ok(Token::EOE),
            '\'' | '"' => self.read_string(c),
            '0'..='9' => self.read_number(c),
            '(' | ')' | '[' | ']' | '{' | '}' => Ok(Token::Bracket(c)),
            '.' => {
                if self.peek_char().is_ascii_digit() {
                    self.read_number(c)
                } else {
                    Ok(Token::Separator('.'))
                }
            }
            ',' | ':' => Ok(Token::Separator(c)),
            ';' => Ok(Token::ExpressionSeparator()),
            '+' => Ok(Token::Operator(Operator::Plus)),
            '-' => Ok(Token::Operator(Operator::Minus)),
            '*' => Ok(Token::Operator(Operator::Multiply)),
            '/' => Ok(Token::Operator(Operator::Divide)),
            '%' => Ok(Token::Operator(Operator::Modulus)),
            '<' => {
                if self.peek_char() == '=' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::LessEqual))
                } else {
                    Ok(Token::Operator(Operator::Less))
                }
            }
            '>' => {
                if self.peek_char() == '=' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::GreaterEqual))
                } else {
                    Ok(Token::Operator(Operator::Greater))
                }
            }
            '=' => {
                if self.peek_char() == '=' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::Equal))
                } else {
                    Ok(Token::Operator(Operator::Assign))
                }
            }
            '!' => {
                if self.peek_char() == '=' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::NotEqual))
                } else {
                    Ok(Token::Operator(Operator::Not))
                }
            }
            '?' => {
                if self.peek_char() == '=' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::AssignUndefined))
                } else {
                    Err("Unexpected '?'".to_string())
                }
            }
            '&' => {
                if self.peek_char() == '&' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::And))
                } else {
                    Err("Unexpected '&'".to_string())
                }
            }
            '|' => {
                if self.peek_char() == '|' {
                    self.pos += 1;
                    Ok(Token::Operator(Operator::Or))
                } else {
                    Err("Unexpected '|'".to_string())
                }
            }
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier(c)),
            other => Err(format!("Unexpected character '{}'", other)),
        }
    }

    /// Read a string. Escape sequences as on JSON.org.
    fn read_string(&mut self, delimiter: char) -> Result<Token, String> {
        let mut buffer = String::new();
        let mut escape = false;
        loop {
            let mut c = self.next_char();
            if c == '\0' {
                return Err("Missing string delimiter".to_string());
            }
            if escape {
                match c {
                    '"' | '\'' | '\\' | '/' => {}
                    'b' => c = '\x08',
                    'f' => c = '\x0c',
                    'n' => c = '\n',
                    'r' => c = '\r',
                    't' => c = '\t',
                    other => return Err(format!("Illegal escape sequence '\\{}'", other)),
                }
                buffer.push(c);
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == delimiter {
                return Ok(Token::TString(buffer));
            } else {
                buffer.push(c);
            }
        }
    }

    fn read_number(&mut self, first: char) -> Result<Token, String> {
        let mut buffer = String::new();
        buffer.push(first);
        let mut is_double = first == '.';
        loop {
            let c = self.peek_char();
            if c.is_ascii_digit() {
                buffer.push(c);
                self.pos += 1;
            } else if c == '.' && !is_double {
                is_double = true;
                buffer.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if is_double {
            buffer
                .parse::<f64>()
                .map(|v| Token::Number(NumericToken::Double(v)))
                .map_err(|e| format!("Illegal number '{}': {}", buffer, e))
        } else {
            buffer
                .parse::<i64>()
                .map(|v| Token::Number(NumericToken::Integer(v)))
                .map_err(|e| format!("Illegal number '{}': {}", buffer, e))
        }
    }

    fn read_identifier(&mut self, first: char) -> Token {
        let mut buffer = String::new();
        buffer.push(first);
        loop {
            let c = self.peek_char();
            if c.is_alphanumeric() || c == '_' {
                buffer.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        match buffer.as_str() {
            "true" | "True" => Token::Boolean(true),
            "false" | "False" => Token::Boolean(false),
            "null" | "Null" | "None" => Token::Null(),
            "and" => Token::Operator(Operator::And),
            "or" => Token::Operator(Operator::Or),
            "not" => Token::Operator(Operator::Not),
            _ => Token::Identifier(buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexer_produces_numbers_and_operators() {
        let tokens = ExpressionLexer::new("12 + 3.5 * x").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number(NumericToken::Integer(12)),
                Token::Operator(Operator::Plus),
                Token::Number(NumericToken::Double(3.5)),
                Token::Operator(Operator::Multiply),
                Token::Identifier("x".to_string()),
                Token::EOE,
            ]
        );
    }

    #[test]
    fn lexer_reads_strings_with_escapes() {
        let tokens = ExpressionLexer::new(r#"'a\'b' + "c\n""#).tokenize().unwrap();
        assert_eq!(tokens[0], Token::TString("a'b".to_string()));
        assert_eq!(tokens[2], Token::TString("c\n".to_string()));
    }

    #[test]
    fn lexer_distinguishes_assign_and_equal() {
        let tokens = ExpressionLexer::new("a = b == c != d ?= e").tokenize().unwrap();
        assert_eq!(tokens[1], Token::Operator(Operator::Assign));
        assert_eq!(tokens[3], Token::Operator(Operator::Equal));
        assert_eq!(tokens[5], Token::Operator(Operator::NotEqual));
        assert_eq!(tokens[7], Token::Operator(Operator::AssignUndefined));
    }

    #[test]
    fn lexer_keywords() {
        let tokens = ExpressionLexer::new("x and not True or None").tokenize().unwrap();
        assert_eq!(tokens[1], Token::Operator(Operator::And));
        assert_eq!(tokens[2], Token::Operator(Operator::Not));
        assert_eq!(tokens[3], Token::Boolean(true));
        assert_eq!(tokens[4], Token::Operator(Operator::Or));
        assert_eq!(tokens[5], Token::Null());
    }

    #[test]
    fn lexer_rejects_unterminated_string() {
        assert!(ExpressionLexer::new("'abc").tokenize().is_err());
    }
}
