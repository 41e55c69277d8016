// Copyright 2023 ToyCC contributors

//! DFA-driven lexer.
//!
//! The lexer owns a [`Dfa`] built from a `.tcdf` description and cuts the
//! source into tokens by repeatedly asking the automaton for the longest
//! match. Rows and columns are 1-based; `\r` is invisible to both the
//! positions and the token contents.

use crate::dfa::{Dfa, DfaError, StateId};
use crate::token::{Token, TokenKind};
use lazy_static::lazy_static;

lazy_static! {
    // The formats stoll(.., 0) accepted in the original: decimal, 0x hex and
    // leading-zero octal. Probing is an explicit match, not a parse-and-catch.
    static ref INTEGER_CRE: regex::Regex =
        regex::Regex::new(r"\A(0[xX][0-9a-fA-F]+|[0-9]+)\z").unwrap();
}

/// Per-token lexical error. Lexing continues past these.
#[derive(Debug, Clone)]
pub struct LexError {
    pub row: usize,
    pub col: usize,
    pub token: Token,
    pub state_id: StateId,
    pub message: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}, {}) {}", self.row, self.col, self.message)
    }
}

#[derive(Debug)]
pub struct Lexer {
    dfa: Dfa,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    row: usize,
    col: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            row: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume exactly one byte, maintaining (row, col). `\r` moves neither
    /// counter.
    fn read(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.row += 1;
            self.col = 1;
        } else if byte != b'\r' {
            self.col += 1;
        }
        Some(byte)
    }
}

impl Lexer {
    /// Build the lexer from a serialized DFA description.
    pub fn from_description(description: &str) -> Result<Self, DfaError> {
        let mut dfa = Dfa::new();
        dfa.build(description)?;
        Ok(Self { dfa })
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    /// Split `source` into tokens. Errors are accumulated; lexing always runs
    /// to the end of the input.
    pub fn analyze(
        &self,
        source: &str,
        see_char_constants_as_numerics: bool,
    ) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = vec![];
        let mut errors = vec![];
        let mut cursor = Cursor::new(source.as_bytes());

        loop {
            while let Some(byte) = cursor.peek() {
                if byte == b' ' || byte == b'\t' || byte == b'\n' || byte == b'\r' {
                    cursor.read();
                } else {
                    break;
                }
            }
            if cursor.peek().is_none() {
                break;
            }

            let token_row = cursor.row;
            let token_col = cursor.col;
            let start_pos = cursor.pos;
            let (halt_state_id, halt_is_final, end) = {
                let (state, end) = self
                    .dfa
                    .recognize(cursor.bytes, cursor.pos)
                    .expect("lexer is only constructed with a built DFA");
                (state.id, state.is_final(), end)
            };
            let recognized = end > start_pos;

            let mut content = Vec::new();
            if !recognized {
                // No viable transition on this byte at all; consume it so the
                // scan makes progress.
                if let Some(byte) = cursor.read() {
                    content.push(byte);
                }
            } else {
                // re-read the recognized span, stripping `\r`
                while cursor.pos < end {
                    match cursor.read() {
                        Some(b'\r') => (),
                        Some(byte) => content.push(byte),
                        None => break,
                    }
                }
            }

            let mut token = Token::new(
                String::from_utf8_lossy(&content).into_owned(),
                token_row,
                token_col,
                TokenKind::Unknown,
            );

            if recognized && halt_is_final {
                fill_token_kind(&mut token);
                if see_char_constants_as_numerics && token.kind == TokenKind::CharConstant {
                    if let Some(&byte) = token.content.as_bytes().get(1) {
                        token.kind = TokenKind::NumericConstant;
                        token.content = (byte as i64).to_string();
                    }
                }
            } else {
                errors.push(LexError {
                    row: token.row,
                    col: token.col,
                    token: token.clone(),
                    state_id: halt_state_id,
                    message: format!(
                        "unrecognized token (DFA halted in state {})",
                        halt_state_id
                    ),
                });
            }

            tokens.push(token);
        }

        (tokens, errors)
    }
}

/// Assign the kind of a recognized lexeme. First match wins: exact
/// keyword/punctuator spelling, integer literal, `//` comment, `/*` comment,
/// string literal, char constant, identifier.
fn fill_token_kind(token: &mut Token) {
    if let Some(kind) = TokenKind::lookup(&token.content) {
        token.kind = kind;
        return;
    }
    if INTEGER_CRE.is_match(&token.content) {
        token.kind = TokenKind::NumericConstant;
        return;
    }
    if token.content.starts_with("//") {
        token.kind = TokenKind::SingleLineComment;
        return;
    }
    if token.content.starts_with("/*") {
        token.kind = TokenKind::MultiLineComment;
        return;
    }
    if token.content.starts_with('"') {
        token.kind = TokenKind::StringLiteral;
        return;
    }
    if token.content.starts_with('\'') {
        token.kind = TokenKind::CharConstant;
        return;
    }
    token.kind = TokenKind::Identifier;
}

#[cfg(test)]
mod tests {
    use super::*;

    // A miniature C-ish DFA: identifiers, integers, '+', '=', "==",
    // char constants 'x'.
    fn mini_description() -> String {
        let mut text = String::new();
        text.push_str("def 0 start\n");
        text.push_str("def 1 final\n"); // identifier
        text.push_str("def 2 final\n"); // integer
        text.push_str("def 3 final\n"); // +
        text.push_str("def 4 final\n"); // =
        text.push_str("def 5 final\n"); // ==
        text.push_str("def 6 normal\n"); // ' seen
        text.push_str("def 7 normal\n"); // 'x seen
        text.push_str("def 8 final\n"); // 'x'
        for ch in (b'a'..=b'z').chain(b'A'..=b'Z').chain(std::iter::once(b'_')) {
            text.push_str(&format!("trans 0 1 {}\n", ch));
            text.push_str(&format!("trans 1 1 {}\n", ch));
            text.push_str(&format!("trans 6 7 {}\n", ch));
        }
        for digit in b'0'..=b'9' {
            text.push_str(&format!("trans 0 2 {}\n", digit));
            text.push_str(&format!("trans 1 1 {}\n", digit));
            text.push_str(&format!("trans 2 2 {}\n", digit));
        }
        text.push_str(&format!("trans 0 3 {}\n", b'+'));
        text.push_str(&format!("trans 0 4 {}\n", b'='));
        text.push_str(&format!("trans 4 5 {}\n", b'='));
        text.push_str(&format!("trans 0 6 {}\n", b'\''));
        text.push_str(&format!("trans 7 8 {}\n", b'\''));
        text.push_str("eof\n");
        text
    }

    fn mini_lexer() -> Lexer {
        Lexer::from_description(&mini_description()).unwrap()
    }

    #[test]
    fn empty_source_yields_nothing() {
        let (tokens, errors) = mini_lexer().analyze("", false);
        assert!(tokens.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn kinds_and_positions() {
        let (tokens, errors) = mini_lexer().analyze("while x == 42\n  y = 7", false);
        assert!(errors.is_empty());
        let summary: Vec<(&str, TokenKind, usize, usize)> = tokens
            .iter()
            .map(|t| (t.content.as_str(), t.kind, t.row, t.col))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("while", TokenKind::KwWhile, 1, 1),
                ("x", TokenKind::Identifier, 1, 7),
                ("==", TokenKind::EqualEqual, 1, 9),
                ("42", TokenKind::NumericConstant, 1, 12),
                ("y", TokenKind::Identifier, 2, 3),
                ("=", TokenKind::Equal, 2, 5),
                ("7", TokenKind::NumericConstant, 2, 7),
            ]
        );
    }

    #[test]
    fn longest_match_prefers_double_equal() {
        let (tokens, _) = mini_lexer().analyze("===", false);
        assert_eq!(tokens[0].content, "==");
        assert_eq!(tokens[1].content, "=");
    }

    #[test]
    fn carriage_returns_are_invisible() {
        let (tokens, errors) = mini_lexer().analyze("ab\r\ncd", false);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].content, "ab");
        assert_eq!(tokens[1].content, "cd");
        assert_eq!((tokens[1].row, tokens[1].col), (2, 1));
    }

    #[test]
    fn unknown_bytes_are_reported_and_lexing_continues() {
        let (tokens, errors) = mini_lexer().analyze("a $ b", false);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(tokens[1].content, "$");
        assert_eq!(errors.len(), 1);
        assert_eq!((errors[0].row, errors[0].col), (1, 3));
    }

    #[test]
    fn unterminated_char_constant_is_an_error_token() {
        let (tokens, errors) = mini_lexer().analyze("'x", false);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Unknown);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].state_id, 7);
    }

    #[test]
    fn char_constants_can_be_folded_to_numerics() {
        let (tokens, errors) = mini_lexer().analyze("'a'", true);
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::NumericConstant);
        assert_eq!(tokens[0].content, "97");

        let (tokens, _) = mini_lexer().analyze("'a'", false);
        assert_eq!(tokens[0].kind, TokenKind::CharConstant);
        assert_eq!(tokens[0].content, "'a'");
    }

    #[test]
    fn hex_literals_classify_as_numeric() {
        let mut token = Token::new("0x1F".to_string(), 1, 1, TokenKind::Unknown);
        fill_token_kind(&mut token);
        assert_eq!(token.kind, TokenKind::NumericConstant);

        let mut token = Token::new("0x".to_string(), 1, 1, TokenKind::Unknown);
        fill_token_kind(&mut token);
        assert_eq!(token.kind, TokenKind::Identifier);
    }
}
