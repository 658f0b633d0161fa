//! Parser for the field-query language
//!
//! ## Grammar
//!
//! ```text
//! query    := chain?
//! chain    := unary (operator? unary)*
//! operator := AND | && | OR | ||
//! unary    := (NOT | - | !)* primary
//! primary  := "(" chain ")"
//!           | _exists_:field | _missing_:field
//!           | field ":" value
//!           | word | "phrase"
//! value    := word | "phrase"
//!           | ("[" | "{") bound TO bound ("]" | "}")
//!           | (">" | ">=" | "<" | "<=") word
//! bound    := word | "phrase" | *
//! ```
//!
//! There is no operator precedence. A chain nests to the right, so
//! `a AND b OR c` becomes `Group(a, AND, Group(b, OR, c))`. Juxtaposed
//! expressions are joined by the default operator.
//!
//! Chains and negation prefixes are parsed in loops. Only parentheses
//! recurse, up to [`MAX_NESTING_DEPTH`] levels.
//!
//! The root of every parsed tree is a group without parentheses. A single
//! top-level expression becomes that group's left child.

use thiserror::Error;

use crate::ast::{
    GroupOperator, NodeId, NodeKind, PresenceNode, QueryTree, RangeOperator, Slot, TermNode,
    TermRangeNode,
};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

const EXISTS_FIELD: &str = "_exists_";
const MISSING_FIELD: &str = "_missing_";

/// Parenthesized groups are parsed recursively; deeper input is rejected.
pub const MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self {
            message,
            span: Some(span),
        }
    }
}

/// Tokenizes and parses `input` in one step.
pub fn parse(input: &str) -> Result<QueryTree, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(&tokens).parse()
}

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    depth: usize,
    tree: QueryTree,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            tree: QueryTree::new(),
        }
    }

    /// Returns the current token without advancing
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// Returns the current token and advances
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn expect(&mut self, expected: TokenKind) -> Result<&'a Token<'a>, ParseError> {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    /// Whether the current token can begin an expression
    fn starts_expression(&self) -> bool {
        self.peek().is_some_and(|t| {
            matches!(
                t.kind,
                TokenKind::Word(_) | TokenKind::Quoted(_) | TokenKind::Not | TokenKind::LParen
            )
        })
    }

    pub fn parse(&mut self) -> Result<QueryTree, ParseError> {
        if self.peek().is_some() {
            let expr = self.parse_chain()?;
            if let Some(token) = self.peek() {
                return Err(ParseError::at_position(
                    format!("Unexpected token: {:?}", token.kind),
                    token.span,
                ));
            }

            let is_chain_group = self.tree.group(expr).is_some_and(|g| !g.has_parens)
                && !self.tree.node(expr).negation().is_negated();
            if is_chain_group {
                self.tree.set_root(expr);
            } else {
                let root = self.tree.root();
                self.tree.attach(root, Slot::Left, expr);
            }
        }

        Ok(std::mem::take(&mut self.tree))
    }

    /// Collects `operand (operator? operand)*` and folds it into right-nested
    /// groups, so long flat filters never grow the call stack.
    fn parse_chain(&mut self) -> Result<NodeId, ParseError> {
        let mut operands = vec![self.parse_unary()?];
        let mut operators = Vec::new();

        loop {
            let operator = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::And) => Some(GroupOperator::And),
                Some(TokenKind::Or) => Some(GroupOperator::Or),
                _ => None,
            };
            if operator.is_some() {
                self.advance();
            }

            if !self.starts_expression() {
                if operator.is_some() {
                    return Err(match self.peek() {
                        Some(token) => ParseError::at_position(
                            format!("Expected expression after operator, found {:?}", token.kind),
                            token.span,
                        ),
                        None => {
                            ParseError::new("Expected expression after operator".to_string(), None)
                        }
                    });
                }
                break;
            }

            operators.push(operator.unwrap_or(GroupOperator::Default));
            operands.push(self.parse_unary()?);
        }

        let mut chain = operands.pop().ok_or_else(|| {
            ParseError::new("Expected expression".to_string(), None)
        })?;
        while let (Some(left), Some(operator)) = (operands.pop(), operators.pop()) {
            chain = self.tree.new_group(operator, false, Some(left), Some(chain));
        }
        Ok(chain)
    }

    fn parse_unary(&mut self) -> Result<NodeId, ParseError> {
        let mut negations = 0;
        while self.match_token(&TokenKind::Not) {
            self.advance();
            negations += 1;
        }
        let node = self.parse_primary()?;
        for _ in 0..negations {
            self.tree.negate(node);
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Unexpected end of input".to_string(), None));
        };

        match &token.kind {
            TokenKind::LParen => {
                if self.match_token(&TokenKind::RParen) {
                    return Err(ParseError::at_position("Empty group".to_string(), token.span));
                }
                if self.depth >= MAX_NESTING_DEPTH {
                    return Err(ParseError::at_position(
                        format!("Parentheses nested deeper than {}", MAX_NESTING_DEPTH),
                        token.span,
                    ));
                }
                self.depth += 1;
                let inner = self.parse_chain()?;
                self.depth -= 1;
                self.expect(TokenKind::RParen)?;

                // A bare chain becomes the parenthesized group itself
                let negated = self.tree.node(inner).negation().is_negated();
                let is_chain = self.tree.group(inner).is_some_and(|g| !g.has_parens);
                if is_chain && !negated {
                    if let Some(group) = self.tree.group_mut(inner) {
                        group.has_parens = true;
                    }
                    Ok(inner)
                } else {
                    Ok(self
                        .tree
                        .new_group(GroupOperator::Default, true, Some(inner), None))
                }
            }
            TokenKind::Word(word) if self.match_token(&TokenKind::Colon) => {
                self.advance(); // consume ':'
                if word.eq_ignore_ascii_case(EXISTS_FIELD) || word.eq_ignore_ascii_case(MISSING_FIELD) {
                    self.parse_presence(word)
                } else {
                    self.parse_field_value(word)
                }
            }
            TokenKind::Word(word) => Ok(self.term(None, word, false)),
            TokenKind::Quoted(phrase) => Ok(self.term(None, phrase, true)),
            _ => Err(ParseError::at_position(
                format!("Expected expression, found {:?}", token.kind),
                token.span,
            )),
        }
    }

    fn term(&mut self, field: Option<&str>, term: &str, quoted: bool) -> NodeId {
        self.tree.alloc(NodeKind::Term(TermNode {
            field: field.map(str::to_string),
            term: term.to_string(),
            quoted,
            negation: Default::default(),
        }))
    }

    fn parse_presence(&mut self, keyword: &str) -> Result<NodeId, ParseError> {
        let token = self.expect(TokenKind::Word(""))?;
        let TokenKind::Word(field) = token.kind else {
            return Err(ParseError::at_position(
                "Expected field name".to_string(),
                token.span,
            ));
        };
        let node = PresenceNode {
            field: Some(field.to_string()),
            negation: Default::default(),
        };
        let kind = if keyword.eq_ignore_ascii_case(EXISTS_FIELD) {
            NodeKind::Exists(node)
        } else {
            NodeKind::Missing(node)
        };
        Ok(self.tree.alloc(kind))
    }

    fn parse_field_value(&mut self, field: &str) -> Result<NodeId, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new(
                format!("Expected value for field '{}'", field),
                None,
            ));
        };

        match &token.kind {
            TokenKind::Word(value) => Ok(self.term(Some(field), value, false)),
            TokenKind::Quoted(value) => Ok(self.term(Some(field), value, true)),
            TokenKind::LBracket | TokenKind::LBrace => {
                let min_inclusive = matches!(token.kind, TokenKind::LBracket);
                let min = self.parse_bound()?;
                match self.advance() {
                    Some(Token { kind: TokenKind::Word("TO"), .. }) => {}
                    Some(other) => {
                        return Err(ParseError::at_position(
                            format!("Expected TO in range, found {:?}", other.kind),
                            other.span,
                        ))
                    }
                    None => {
                        return Err(ParseError::new(
                            "Expected TO in range, but reached end of input".to_string(),
                            None,
                        ))
                    }
                }
                let max = self.parse_bound()?;
                let max_inclusive = match self.advance() {
                    Some(Token { kind: TokenKind::RBracket, .. }) => true,
                    Some(Token { kind: TokenKind::RBrace, .. }) => false,
                    Some(other) => {
                        return Err(ParseError::at_position(
                            format!("Expected ']' or '}}' to close range, found {:?}", other.kind),
                            other.span,
                        ))
                    }
                    None => {
                        return Err(ParseError::new(
                            "Unterminated range".to_string(),
                            Some(token.span),
                        ))
                    }
                };
                Ok(self.tree.alloc(NodeKind::TermRange(TermRangeNode {
                    field: Some(field.to_string()),
                    min,
                    max,
                    min_inclusive,
                    max_inclusive,
                    operator: None,
                    negation: Default::default(),
                })))
            }
            TokenKind::Gt | TokenKind::Gte | TokenKind::Lt | TokenKind::Lte => {
                let operator = match token.kind {
                    TokenKind::Gt => RangeOperator::Gt,
                    TokenKind::Gte => RangeOperator::Gte,
                    TokenKind::Lt => RangeOperator::Lt,
                    _ => RangeOperator::Lte,
                };
                let value = self.parse_bound()?.ok_or_else(|| {
                    ParseError::at_position(
                        "Open bound is not allowed after a comparison".to_string(),
                        token.span,
                    )
                })?;
                let (min, max) = match operator {
                    RangeOperator::Gt | RangeOperator::Gte => (Some(value), None),
                    RangeOperator::Lt | RangeOperator::Lte => (None, Some(value)),
                };
                Ok(self.tree.alloc(NodeKind::TermRange(TermRangeNode {
                    field: Some(field.to_string()),
                    min,
                    max,
                    min_inclusive: operator == RangeOperator::Gte,
                    max_inclusive: operator == RangeOperator::Lte,
                    operator: Some(operator),
                    negation: Default::default(),
                })))
            }
            _ => Err(ParseError::at_position(
                format!("Expected value for field '{}', found {:?}", field, token.kind),
                token.span,
            )),
        }
    }

    /// A range bound; `*` is an open bound.
    fn parse_bound(&mut self) -> Result<Option<String>, ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::Word("*"), .. }) => Ok(None),
            Some(Token {
                kind: TokenKind::Word(v) | TokenKind::Quoted(v),
                ..
            }) => Ok(Some(v.to_string())),
            Some(token) => Err(ParseError::at_position(
                format!("Expected range bound, found {:?}", token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                "Expected range bound, but reached end of input".to_string(),
                None,
            )),
        }
    }
}
