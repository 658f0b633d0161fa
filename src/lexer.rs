//! Lexer for the field-query language

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into the input
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// Returns the character at the current position without advancing
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Advances one character and returns it
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    /// Reads a quoted phrase. The opening quote has already been consumed.
    /// A backslash escapes the following character.
    fn read_quoted(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        loop {
            match self.peek() {
                Some('"') => break,
                Some('\\') => {
                    self.bump();
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
                None => return self.token(TokenKind::Illegal, start),
            }
        }
        let content = &self.input[content_start..self.position];
        self.bump(); // closing quote
        self.token(TokenKind::Quoted(content), start)
    }

    /// Reads a bare word: a field name, a term value or a keyword.
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if is_word_char(c) {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        let kind = match literal {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            _ => TokenKind::Word(literal),
        };
        self.token(kind, start)
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ':')
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let token = match c {
            ':' => self.token(TokenKind::Colon, start),
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            '[' => self.token(TokenKind::LBracket, start),
            ']' => self.token(TokenKind::RBracket, start),
            '{' => self.token(TokenKind::LBrace, start),
            '}' => self.token(TokenKind::RBrace, start),
            '"' => self.read_quoted(start),
            '>' | '<' => {
                let inclusive = self.peek() == Some('=');
                if inclusive {
                    self.bump();
                }
                let kind = match (c, inclusive) {
                    ('>', false) => TokenKind::Gt,
                    ('>', true) => TokenKind::Gte,
                    ('<', false) => TokenKind::Lt,
                    _ => TokenKind::Lte,
                };
                self.token(kind, start)
            }
            '&' if self.peek() == Some('&') => {
                self.bump();
                self.token(TokenKind::And, start)
            }
            '|' if self.peek() == Some('|') => {
                self.bump();
                self.token(TokenKind::Or, start)
            }
            // "-5" is a negative number, "-field:x" is a negation
            '-' if self.peek().is_some_and(|n| n.is_ascii_digit()) => self.read_word(start),
            '-' | '!' => self.token(TokenKind::Not, start),
            c if is_word_char(c) => self.read_word(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}
