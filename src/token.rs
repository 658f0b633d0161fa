//! The token definition for the field-query language.

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Keywords
    And, // "AND" or "&&"
    Or,  // "OR" or "||"
    Not, // "NOT", or a leading "-" / "!"

    // Literals
    Word(&'a str),
    Quoted(&'a str), // The phrase between the quotes, escapes left as written

    // Punctuation
    Colon,    // :
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // Range shorthand
    Gt,  // >
    Lt,  // <
    Gte, // >=
    Lte, // <=

    // Special
    Illegal, // An illegal/unknown character, or an unterminated phrase
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
