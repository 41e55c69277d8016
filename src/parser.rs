// Copyright 2023 ToyCC contributors

//! Shift-reduce parser driver.
//!
//! Consumes a token list and an Action/Goto table and builds the AST. The
//! parser owns the resulting tree; `clear` (or dropping the parser) frees it.

use crate::ast::AstNode;
use crate::grammar::SymbolId;
use crate::table::{ParserCommand, ParserTable};
use crate::token::{Token, TokenKind};
use std::collections::HashMap;

/// Per-parse diagnostic. `token` is absent for the end-of-input case.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub token: Option<Token>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Default)]
pub struct Parser {
    table: ParserTable,
    ast_root: Option<AstNode>,
}

impl Parser {
    pub fn new(table: ParserTable) -> Self {
        Self {
            table,
            ast_root: None,
        }
    }

    pub fn load_parser_table(&mut self, table: ParserTable) {
        self.table = table;
    }

    pub fn ast_root(&self) -> Option<&AstNode> {
        self.ast_root.as_ref()
    }

    /// Drop the owned tree.
    pub fn clear(&mut self) {
        self.ast_root = None;
    }

    /// Parse `tokens` (comments are skipped; the end-of-input lookahead is
    /// synthesized, so the list does not need a trailing eof token). Returns
    /// the accumulated errors; parsing stops at the first one.
    pub fn parse(&mut self, tokens: &[Token]) -> Vec<ParseError> {
        self.clear();
        let mut errors = vec![];

        let kind_to_symbol: HashMap<TokenKind, SymbolId> = self
            .table
            .symbols
            .iter()
            .filter(|symbol| symbol.is_terminal())
            .map(|symbol| (symbol.token_kind, symbol.id))
            .collect();
        let eof_symbol_id = kind_to_symbol.get(&TokenKind::Eof).copied();

        let mut state_stack: Vec<usize> = vec![self.table.primary_state_id];
        let mut node_stack: Vec<AstNode> = vec![];
        let mut cursor = 0;

        loop {
            while cursor < tokens.len() && tokens[cursor].kind.is_comment() {
                cursor += 1;
            }
            let lookahead = tokens.get(cursor);
            let symbol_id = match lookahead {
                Some(token) => match kind_to_symbol.get(&token.kind) {
                    Some(&id) => id,
                    None => {
                        errors.push(unexpected_token(token));
                        break;
                    }
                },
                None => match eof_symbol_id {
                    Some(id) => id,
                    None => {
                        errors.push(ParseError {
                            message: "unexpected end of tokens.".to_string(),
                            token: None,
                        });
                        break;
                    }
                },
            };

            let state = *state_stack.last().expect("state stack is never empty");
            match self.table.command(state, symbol_id) {
                ParserCommand::Error => {
                    match lookahead {
                        Some(token) => errors.push(unexpected_token(token)),
                        None => errors.push(ParseError {
                            message: "unexpected end of tokens.".to_string(),
                            token: None,
                        }),
                    }
                    break;
                }
                ParserCommand::Accept => {
                    if let Some(node) = node_stack.first() {
                        self.ast_root = Some(node.root());
                    }
                    break;
                }
                ParserCommand::Goto(_) => {
                    errors.push(internal_error(lookahead, "unexpected command GOTO"));
                    break;
                }
                ParserCommand::Shift(target) => {
                    let token = lookahead.expect("shift never fires on the synthesized eof");
                    let node =
                        AstNode::new_leaf(self.table.symbols[symbol_id].clone(), token.clone());
                    node_stack.push(node);
                    state_stack.push(target);
                    cursor += 1;
                }
                ParserCommand::Reduce(production_id) => {
                    let production = &self.table.productions[production_id];
                    let rhs_len = production.rhs.len();
                    if node_stack.len() < rhs_len || state_stack.len() <= rhs_len {
                        errors.push(internal_error(lookahead, "reduce underflows the stacks"));
                        break;
                    }
                    let reduced = AstNode::new_internal(
                        self.table.symbols[production.target_symbol_id].clone(),
                    );
                    let children = node_stack.split_off(node_stack.len() - rhs_len);
                    for child in children.iter() {
                        reduced.add_child(child);
                    }
                    state_stack.truncate(state_stack.len() - rhs_len);

                    let state = *state_stack.last().expect("seed state always remains");
                    match self.table.command(state, production.target_symbol_id) {
                        ParserCommand::Goto(target) => {
                            state_stack.push(target);
                            node_stack.push(reduced);
                        }
                        ParserCommand::Error => {
                            match lookahead {
                                Some(token) => errors.push(unexpected_token(token)),
                                None => errors.push(ParseError {
                                    message: "unexpected end of tokens.".to_string(),
                                    token: None,
                                }),
                            }
                            break;
                        }
                        _ => {
                            errors.push(internal_error(
                                lookahead,
                                "non-goto command after reduction",
                            ));
                            break;
                        }
                    }
                }
            }
        }

        errors
    }
}

fn unexpected_token(token: &Token) -> ParseError {
    ParseError {
        message: format!(
            "({}, {}) unexpected token: {}",
            token.row, token.col, token.content
        ),
        token: Some(token.clone()),
    }
}

fn internal_error(token: Option<&Token>, what: &str) -> ParseError {
    let position = token
        .map(|t| format!("({}, {}) ", t.row, t.col))
        .unwrap_or_default();
    ParseError {
        message: format!("{}internal error: {}", position, what),
        token: token.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lr1::Lr1Builder;
    use crate::yacc::TceyLoader;

    const PAIRS: &str = "\
/*_tcey_\n\
token-key X --_identifier_\n\
token-key Y --_numeric_constant_\n\
*/\n\
%start s\n\
%%\n\
s : p p ;\n\
p : X p | Y ;\n";

    fn parser() -> Parser {
        let grammar = TceyLoader::load(PAIRS).unwrap();
        Parser::new(Lr1Builder::new(&grammar).build_table())
    }

    fn ident(content: &str, col: usize) -> Token {
        Token::new(content.to_string(), 1, col, TokenKind::Identifier)
    }

    fn number(content: &str, col: usize) -> Token {
        Token::new(content.to_string(), 1, col, TokenKind::NumericConstant)
    }

    #[test]
    fn accepts_a_sentence_and_builds_the_tree() {
        let mut parser = parser();
        // s -> p p with p = X Y and p = Y
        let tokens = vec![ident("x", 1), number("1", 3), number("2", 5)];
        let errors = parser.parse(&tokens);
        assert!(errors.is_empty(), "{:?}", errors);

        let root = parser.ast_root().unwrap();
        assert_eq!(root.symbol().name, "s");
        assert_eq!(root.child_count(), 2);
        let first_p = root.child(0).unwrap();
        assert_eq!(first_p.symbol().name, "p");
        assert_eq!(first_p.child_count(), 2);
        assert_eq!(first_p.child(0).unwrap().token().content, "x");
        // every child points back at its parent
        for child in root.children() {
            assert!(child.parent().unwrap().same_node(root));
        }
    }

    #[test]
    fn empty_input_reports_unexpected_end() {
        let mut parser = parser();
        let errors = parser.parse(&[]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unexpected end of tokens.");
        assert!(parser.ast_root().is_none());
    }

    #[test]
    fn truncated_input_reports_unexpected_end() {
        let mut parser = parser();
        let errors = parser.parse(&[number("1", 1)]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unexpected end of tokens.");
    }

    #[test]
    fn wrong_token_reports_position_and_content() {
        let mut parser = parser();
        // '+' has no terminal in this grammar at all.
        let stray = Token::new("+".to_string(), 1, 3, TokenKind::Plus);
        let errors = parser.parse(&[number("1", 1), stray, number("2", 5)]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "(1, 3) unexpected token: +");
    }

    #[test]
    fn comments_are_skipped() {
        let mut parser = parser();
        let comment = Token::new(
            "// note".to_string(),
            1,
            1,
            TokenKind::SingleLineComment,
        );
        let tokens = vec![comment, number("1", 9), number("2", 11)];
        let errors = parser.parse(&tokens);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn clear_drops_the_tree() {
        let mut parser = parser();
        parser.parse(&[number("1", 1), number("2", 3)]);
        assert!(parser.ast_root().is_some());
        parser.clear();
        assert!(parser.ast_root().is_none());
    }
}
