//! The lexer shared by the requirement and marker grammars.
//!
//! A [`Tokenizer`] walks an immutable input string with a cursor and matches
//! tokens from a rule table of compiled patterns, all anchored at the current
//! position. The parsers drive it through [`Tokenizer::check`],
//! [`Tokenizer::consume`] and [`Tokenizer::read`]; every error carries the
//! cursor position and the input so it renders with a caret underline.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Pep508Error, Pep508ErrorSource};

/// The token kinds of the PEP 508 grammars. Version operands reuse the
/// PEP 440 lexical fragment via [`VERSION_PATTERN`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TokenKind {
    LeftParenthesis,
    RightParenthesis,
    LeftBracket,
    RightBracket,
    Semicolon,
    Comma,
    /// A single- or double-quoted string literal
    QuotedString,
    /// A comparison operator, including `in`-free `===`
    Op,
    /// `and` or `or`
    BoolOp,
    In,
    Not,
    /// One of the closed set of environment marker names
    Variable,
    /// An operator plus version operand, e.g. `>=1.19` or `==2.8.*`
    Specifier,
    At,
    /// Anything up to the next whitespace, validated as a URL by the caller
    Url,
    /// A package or extra name
    Identifier,
    Whitespace,
}

/// A table entry: one kind, one compiled pattern anchored at the match start.
struct Rule {
    kind: TokenKind,
    pattern: Regex,
}

impl Rule {
    fn new(kind: TokenKind, pattern: &str) -> Self {
        Self {
            kind,
            pattern: Regex::new(pattern).expect("rule table patterns are valid"),
        }
    }
}

/// The rule table, compiled once. Rules are looked up by kind, so order is
/// irrelevant; every pattern is anchored with `^` and applied to the
/// unconsumed tail of the input.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(TokenKind::LeftParenthesis, r"^\("),
        Rule::new(TokenKind::RightParenthesis, r"^\)"),
        Rule::new(TokenKind::LeftBracket, r"^\["),
        Rule::new(TokenKind::RightBracket, r"^\]"),
        Rule::new(TokenKind::Semicolon, r"^;"),
        Rule::new(TokenKind::Comma, r"^,"),
        Rule::new(TokenKind::QuotedString, r#"^(?:'[^']*'|"[^"]*")"#),
        Rule::new(TokenKind::Op, r"^(?:===|==|~=|!=|<=|>=|<|>)"),
        Rule::new(TokenKind::BoolOp, r"^(?:and|or)\b"),
        Rule::new(TokenKind::In, r"^in\b"),
        Rule::new(TokenKind::Not, r"^not\b"),
        Rule::new(
            TokenKind::Variable,
            r"(?x)
            ^(?:
                python_version
                |python_full_version
                |os[._]name
                |sys[._]platform
                |platform_(?:release|system)
                |platform[._](?:version|machine|python_implementation)
                |python_implementation
                |implementation_(?:name|version)
                |extras?
                |dependency_groups
            )\b",
        ),
        // An operator and its operand; the operand shape is validated by the
        // PEP 440 parser afterwards, which owns the error message.
        Rule::new(
            TokenKind::Specifier,
            r"^(?:===|==|~=|!=|<=|>=|<|>)[ \t]*[^\s,;()]*",
        ),
        Rule::new(TokenKind::At, r"^@"),
        Rule::new(TokenKind::Url, r"^[^ \t]+"),
        Rule::new(TokenKind::Identifier, r"^[A-Za-z0-9][A-Za-z0-9._-]*"),
        Rule::new(TokenKind::Whitespace, r"^[ \t]+"),
    ]
});

/// A matched token: its kind plus the byte span of the input it covers.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Token<'a> {
    pub(crate) text: &'a str,
    pub(crate) start: usize,
}

impl Token<'_> {
    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }
}

/// A cursor over an input string that produces tokens from the rule table.
#[derive(Debug)]
pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// The input this tokenizer was created with.
    pub(crate) fn input(&self) -> &'a str {
        self.input
    }

    /// The current byte position of the cursor.
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    /// Whether the cursor has consumed the whole input.
    pub(crate) fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Match the given kind at the cursor without consuming it.
    pub(crate) fn check(&self, kind: TokenKind) -> Option<Token<'a>> {
        let rule = RULES
            .iter()
            .find(|rule| rule.kind == kind)
            .expect("every token kind has a rule");
        let found = rule.pattern.find(&self.input[self.position..])?;
        Some(Token {
            text: found.as_str(),
            start: self.position,
        })
    }

    /// Consume a token of the given kind if it matches at the cursor.
    pub(crate) fn consume(&mut self, kind: TokenKind) -> Option<Token<'a>> {
        let token = self.check(kind)?;
        self.position += token.len();
        Some(token)
    }

    /// Consume a token of the given kind, or fail with `expected` underlined
    /// at the cursor.
    pub(crate) fn read(
        &mut self,
        kind: TokenKind,
        expected: &str,
    ) -> Result<Token<'a>, Pep508Error> {
        self.consume(kind)
            .ok_or_else(|| self.raise_syntax_error(expected.to_string()))
    }

    /// Skip over horizontal whitespace.
    pub(crate) fn consume_whitespace(&mut self) {
        self.consume(TokenKind::Whitespace);
    }

    /// An error anchored at the current cursor position.
    pub(crate) fn raise_syntax_error(&self, message: String) -> Pep508Error {
        Pep508Error {
            message: Pep508ErrorSource::String(message),
            start: self.position,
            len: self.input[self.position..]
                .chars()
                .next()
                .map_or(1, char::len_utf8),
            input: self.input.to_string(),
        }
    }

    /// An error covering the given token.
    pub(crate) fn raise_at(&self, token: &Token, message: String) -> Pep508Error {
        Pep508Error {
            message: Pep508ErrorSource::String(message),
            start: token.start,
            len: token.len().max(1),
            input: self.input.to_string(),
        }
    }
}
