// Copyright 2023 ToyCC contributors

//! Loader for the extended-Yacc grammar format (`.tcey.yacc`).
//!
//! The file is ordinary Yacc with one extension: a structured comment block
//! opened by the literal token `/*_tcey_` whose body binds terminal names to
//! token-kind registry keys:
//!
//! ```text
//! /*_tcey_
//!     token-key IDENTIFIER --_identifier_
//!     token-key ';'        ;
//! */
//! ```
//!
//! Symbol names beginning with a lowercase letter are non-terminals;
//! everything else is a terminal and must resolve through a `token-key`
//! binding or the built-in token-kind map.

use crate::grammar::{Expression, Grammar, Symbol, SymbolId, SymbolKind, SymbolType};
use crate::scan::Scanner;
use crate::token::TokenKind;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YaccError {
    CantOpenFile(String),
    UnknownSymbol(String),
    BadExpression { target: String, found: String },
    UnexpectedEof,
}

impl fmt::Display for YaccError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            YaccError::CantOpenFile(path) => write!(f, "failed to open grammar file: {}", path),
            YaccError::UnknownSymbol(name) => {
                write!(f, "unrecognized terminal symbol: {}", name)
            }
            YaccError::BadExpression { target, found } => write!(
                f,
                "bad expression for \"{}\": expected ':', found \"{}\"",
                target, found
            ),
            YaccError::UnexpectedEof => write!(f, "unexpected end of grammar file"),
        }
    }
}

impl std::error::Error for YaccError {}

#[derive(Debug, Default)]
pub struct TceyLoader {
    grammar: Grammar,
    token_key_map: HashMap<String, TokenKind>,
    symbol_index: HashMap<String, SymbolId>,
}

impl TceyLoader {
    /// Parse a grammar from text.
    pub fn load(text: &str) -> Result<Grammar, YaccError> {
        let mut loader = TceyLoader::default();
        loader.load_grammar(text)?;
        Ok(loader.grammar)
    }

    /// Parse a grammar from a file on disk.
    pub fn load_file(path: &Path) -> Result<Grammar, YaccError> {
        let text = fs::read_to_string(path)
            .map_err(|_| YaccError::CantOpenFile(path.to_string_lossy().into_owned()))?;
        TceyLoader::load(&text)
    }

    fn load_grammar(&mut self, text: &str) -> Result<(), YaccError> {
        let mut scanner = Scanner::new(text);
        while let Some(keyword) = scanner.next_token() {
            match keyword {
                "%start" => {
                    let name = scanner.next_token().ok_or(YaccError::UnexpectedEof)?;
                    self.grammar.entry_symbol_id = self.intern(name)?;
                }
                "%%" => {
                    self.load_body(&mut scanner)?;
                    break;
                }
                "/*_tcey_" => self.load_tcey_block(&mut scanner),
                "/*" => scanner.skip_past("*/"),
                _ if keyword.starts_with('%') => scanner.skip_line(),
                _ => scanner.skip_line(),
            }
        }
        Ok(())
    }

    fn load_tcey_block(&mut self, scanner: &mut Scanner) {
        while let Some(keyword) = scanner.next_token() {
            match keyword {
                "*/" => break,
                "token-key" => {
                    let key = scanner.next_token();
                    let value = scanner.next_token();
                    if let (Some(key), Some(value)) = (key, value) {
                        if let Some(kind) = TokenKind::lookup(value) {
                            self.token_key_map.insert(key.to_string(), kind);
                        }
                    }
                }
                _ => scanner.skip_line(),
            }
        }
    }

    fn load_body(&mut self, scanner: &mut Scanner) -> Result<(), YaccError> {
        while self.load_expression(scanner)? {}
        Ok(())
    }

    /// Read one `lhs : a b | c ;` rule. Returns false at the end of the
    /// productions section.
    fn load_expression(&mut self, scanner: &mut Scanner) -> Result<bool, YaccError> {
        let target = match scanner.next_token() {
            None => return Ok(false),
            Some("%%") => return Ok(false),
            Some(name) => name,
        };
        match scanner.next_token() {
            Some(":") => (),
            Some(found) => {
                return Err(YaccError::BadExpression {
                    target: target.to_string(),
                    found: found.to_string(),
                })
            }
            None => return Err(YaccError::UnexpectedEof),
        }

        let target_symbol_id = self.intern(target)?;
        let id = self.grammar.expressions.len();
        let mut rules: Vec<Vec<SymbolId>> = vec![];
        let mut rule: Vec<SymbolId> = vec![];
        loop {
            let token = scanner.next_token().ok_or(YaccError::UnexpectedEof)?;
            match token {
                ";" | "|" => {
                    if !rule.is_empty() {
                        rules.push(std::mem::replace(&mut rule, vec![]));
                    }
                    if token == ";" {
                        break;
                    }
                }
                name => rule.push(self.intern(name)?),
            }
        }
        self.grammar.expressions.push(Expression {
            id,
            target_symbol_id,
            rules,
        });
        Ok(true)
    }

    /// Find or create the symbol named `name`.
    fn intern(&mut self, name: &str) -> Result<SymbolId, YaccError> {
        if let Some(&id) = self.symbol_index.get(name) {
            return Ok(id);
        }
        let lowercase_start = name
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false);
        let id = self.grammar.symbols.len();
        let symbol = if lowercase_start {
            Symbol {
                id,
                name: name.to_string(),
                symbol_type: SymbolType::NonTerminal,
                token_kind: TokenKind::Unknown,
                symbol_kind: SymbolKind::of_name(name),
            }
        } else {
            let token_kind = self
                .token_key_map
                .get(name)
                .copied()
                .or_else(|| TokenKind::lookup(name))
                .ok_or_else(|| YaccError::UnknownSymbol(name.to_string()))?;
            Symbol {
                id,
                name: name.to_string(),
                symbol_type: SymbolType::Terminal,
                token_kind,
                symbol_kind: SymbolKind::Unknown,
            }
        };
        self.grammar.symbols.push(symbol);
        self.symbol_index.insert(name.to_string(), id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
/*_tcey_
    token-key IF if
    token-key IDENT --_identifier_
    token-key '(' (
    token-key ')' )
    token-key ';' ;
*/

%start statement
%token IGNORED DIRECTIVE

/* an ordinary comment
   spanning lines */

%%

statement
    : IF '(' expr ')' statement
    | expr ';'
    ;

expr
    : IDENT
    ;
"#;

    #[test]
    fn loads_symbols_and_rules() {
        let grammar = TceyLoader::load(SMALL).unwrap();

        let statement = grammar
            .symbols
            .iter()
            .find(|s| s.name == "statement")
            .unwrap();
        assert_eq!(statement.symbol_type, SymbolType::NonTerminal);
        assert_eq!(statement.symbol_kind, SymbolKind::Statement);
        assert_eq!(grammar.entry_symbol_id, statement.id);

        let if_sym = grammar.symbols.iter().find(|s| s.name == "IF").unwrap();
        assert_eq!(if_sym.symbol_type, SymbolType::Terminal);
        assert_eq!(if_sym.token_kind, TokenKind::KwIf);

        let ident = grammar.symbols.iter().find(|s| s.name == "IDENT").unwrap();
        assert_eq!(ident.token_kind, TokenKind::Identifier);

        assert_eq!(grammar.expressions.len(), 2);
        assert_eq!(grammar.expressions[0].rules.len(), 2);
        assert_eq!(grammar.expressions[0].rules[0].len(), 5);
        assert_eq!(grammar.expressions[1].rules.len(), 1);
    }

    #[test]
    fn terminals_fall_back_to_the_builtin_map() {
        // "+" resolves without a token-key entry.
        let text = "%start e\n%%\ne : e + IDENT ;\n";
        let err = TceyLoader::load(text).unwrap_err();
        // IDENT has no binding here; "+" resolved fine before it.
        assert_eq!(err, YaccError::UnknownSymbol("IDENT".to_string()));

        let text = "/*_tcey_\ntoken-key IDENT --_identifier_\n*/\n%start e\n%%\ne : IDENT + IDENT ;\n";
        let grammar = TceyLoader::load(text).unwrap();
        let plus = grammar.symbols.iter().find(|s| s.name == "+").unwrap();
        assert_eq!(plus.token_kind, TokenKind::Plus);
    }

    #[test]
    fn missing_colon_is_a_bad_expression() {
        let text = "%start a\n%%\na b ;\n";
        match TceyLoader::load(text).unwrap_err() {
            YaccError::BadExpression { target, found } => {
                assert_eq!(target, "a");
                assert_eq!(found, "b");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn empty_alternatives_are_dropped() {
        let text = "%start a\n%%\na : | a a ;\n";
        let grammar = TceyLoader::load(text).unwrap();
        assert_eq!(grammar.expressions[0].rules.len(), 1);
    }
}
