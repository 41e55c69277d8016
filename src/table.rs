// Copyright 2023 ToyCC contributors

//! The Action/Goto table and its `.tcpt` text serialization.
//!
//! ```text
//! pStId <id>                            initial state
//! sym <name> <id> <type> <tk> <sk>      symbol (enums encoded as integers)
//! fe <id> <target> r1 r2 ... end        flat production
//! tc <state> <symbol> <type> <target>   one table cell
//! ```
//!
//! Missing cells implicitly denote [`ParserCommand::Error`]. Loading is
//! strict: any malformed field clears the table and reports the failure.

use crate::grammar::{FlatProduction, Symbol, SymbolId, SymbolKind, SymbolType};
use crate::scan::Scanner;
use crate::token::TokenKind;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

pub type StateId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserCommand {
    Accept,
    Error,
    Goto(StateId),
    Shift(StateId),
    Reduce(usize),
}

impl ParserCommand {
    fn encode(self) -> (u32, usize) {
        match self {
            ParserCommand::Accept => (0, 0),
            ParserCommand::Error => (1, 0),
            ParserCommand::Goto(target) => (2, target),
            ParserCommand::Shift(target) => (3, target),
            ParserCommand::Reduce(production) => (4, production),
        }
    }

    fn decode(cmd_type: u32, target: usize) -> Option<Self> {
        match cmd_type {
            0 => Some(ParserCommand::Accept),
            1 => Some(ParserCommand::Error),
            2 => Some(ParserCommand::Goto(target)),
            3 => Some(ParserCommand::Shift(target)),
            4 => Some(ParserCommand::Reduce(target)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLoadError {
    BadDirective(String),
    BadInteger(String),
    BadEncoding(String),
    NonContiguousIds(String),
    MissingEnd,
    UnexpectedEof,
}

impl fmt::Display for TableLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableLoadError::BadDirective(text) => write!(f, "bad directive \"{}\"", text),
            TableLoadError::BadInteger(text) => write!(f, "expected an integer, got \"{}\"", text),
            TableLoadError::BadEncoding(what) => write!(f, "bad enum encoding for {}", what),
            TableLoadError::NonContiguousIds(what) => {
                write!(f, "{} ids are not contiguous from zero", what)
            }
            TableLoadError::MissingEnd => write!(f, "flat production without \"end\""),
            TableLoadError::UnexpectedEof => write!(f, "table file ended mid-record"),
        }
    }
}

impl std::error::Error for TableLoadError {}

#[derive(Debug, Clone, Default)]
pub struct ParserTable {
    pub primary_state_id: StateId,
    pub symbols: Vec<Symbol>,
    pub productions: Vec<FlatProduction>,
    cells: BTreeMap<(StateId, SymbolId), ParserCommand>,
}

impl ParserTable {
    pub fn new() -> Self {
        ParserTable::default()
    }

    pub fn clear(&mut self) {
        self.primary_state_id = 0;
        self.symbols.clear();
        self.productions.clear();
        self.cells.clear();
    }

    pub fn set_command(&mut self, state: StateId, symbol: SymbolId, command: ParserCommand) {
        self.cells.insert((state, symbol), command);
    }

    /// Cell lookup; absent cells are errors.
    pub fn command(&self, state: StateId, symbol: SymbolId) -> ParserCommand {
        self.cells
            .get(&(state, symbol))
            .copied()
            .unwrap_or(ParserCommand::Error)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&(StateId, SymbolId), &ParserCommand)> {
        self.cells.iter()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn dump<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "pStId {}", self.primary_state_id)?;
        for symbol in self.symbols.iter() {
            writeln!(
                writer,
                "sym {} {} {} {} {}",
                symbol.name,
                symbol.id,
                match symbol.symbol_type {
                    SymbolType::NonTerminal => 0,
                    SymbolType::Terminal => 1,
                },
                symbol.token_kind as u32,
                symbol.symbol_kind as u32,
            )?;
        }
        for production in self.productions.iter() {
            write!(writer, "fe {} {}", production.id, production.target_symbol_id)?;
            for symbol_id in production.rhs.iter() {
                write!(writer, " {}", symbol_id)?;
            }
            writeln!(writer, " end")?;
        }
        for ((state, symbol), command) in self.cells.iter() {
            let (cmd_type, target) = command.encode();
            writeln!(writer, "tc {} {} {} {}", state, symbol, cmd_type, target)?;
        }
        Ok(())
    }

    /// Load from `.tcpt` text. On failure the table is left cleared.
    pub fn load(&mut self, text: &str) -> Result<(), TableLoadError> {
        self.clear();
        let result = self.load_inner(text);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn load_inner(&mut self, text: &str) -> Result<(), TableLoadError> {
        let mut scanner = Scanner::new(text);
        let mut symbols: BTreeMap<SymbolId, Symbol> = BTreeMap::new();
        let mut productions: BTreeMap<usize, FlatProduction> = BTreeMap::new();

        while let Some(directive) = scanner.next_token() {
            match directive {
                "pStId" => {
                    self.primary_state_id = next_usize(&mut scanner)?;
                }
                "sym" => {
                    let name = scanner
                        .next_token()
                        .ok_or(TableLoadError::UnexpectedEof)?
                        .to_string();
                    let id = next_usize(&mut scanner)?;
                    let symbol_type = match next_usize(&mut scanner)? {
                        0 => SymbolType::NonTerminal,
                        1 => SymbolType::Terminal,
                        _ => return Err(TableLoadError::BadEncoding("symbol type".into())),
                    };
                    let token_kind = TokenKind::from_u32(next_usize(&mut scanner)? as u32)
                        .ok_or_else(|| TableLoadError::BadEncoding("token kind".into()))?;
                    let symbol_kind = SymbolKind::from_u32(next_usize(&mut scanner)? as u32)
                        .ok_or_else(|| TableLoadError::BadEncoding("symbol kind".into()))?;
                    symbols.insert(
                        id,
                        Symbol {
                            id,
                            name,
                            symbol_type,
                            token_kind,
                            symbol_kind,
                        },
                    );
                }
                "fe" => {
                    let id = next_usize(&mut scanner)?;
                    let target_symbol_id = next_usize(&mut scanner)?;
                    let mut rhs = vec![];
                    loop {
                        let token = scanner.next_token().ok_or(TableLoadError::MissingEnd)?;
                        if token == "end" {
                            break;
                        }
                        rhs.push(
                            token
                                .parse::<SymbolId>()
                                .map_err(|_| TableLoadError::BadInteger(token.to_string()))?,
                        );
                    }
                    productions.insert(
                        id,
                        FlatProduction {
                            id,
                            target_symbol_id,
                            rhs,
                        },
                    );
                }
                "tc" => {
                    let state = next_usize(&mut scanner)?;
                    let symbol = next_usize(&mut scanner)?;
                    let cmd_type = next_usize(&mut scanner)? as u32;
                    let target = next_usize(&mut scanner)?;
                    let command = ParserCommand::decode(cmd_type, target)
                        .ok_or_else(|| TableLoadError::BadEncoding("command type".into()))?;
                    self.cells.insert((state, symbol), command);
                }
                other => return Err(TableLoadError::BadDirective(other.to_string())),
            }
        }

        self.symbols = into_contiguous(symbols, "symbol")?;
        self.productions = into_contiguous(productions, "production")?;
        Ok(())
    }
}

fn next_usize(scanner: &mut Scanner) -> Result<usize, TableLoadError> {
    let token = scanner.next_token().ok_or(TableLoadError::UnexpectedEof)?;
    token
        .parse::<usize>()
        .map_err(|_| TableLoadError::BadInteger(token.to_string()))
}

/// Ids double as vector indices, so the id space must be 0..n.
fn into_contiguous<T>(map: BTreeMap<usize, T>, what: &str) -> Result<Vec<T>, TableLoadError> {
    let mut out = Vec::with_capacity(map.len());
    for (expected, (id, value)) in map.into_iter().enumerate() {
        if id != expected {
            return Err(TableLoadError::NonContiguousIds(what.to_string()));
        }
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ParserTable {
        let mut table = ParserTable::new();
        table.primary_state_id = 0;
        table.symbols = vec![
            Symbol {
                id: 0,
                name: "expr".to_string(),
                symbol_type: SymbolType::NonTerminal,
                token_kind: TokenKind::Unknown,
                symbol_kind: SymbolKind::Expression,
            },
            Symbol {
                id: 1,
                name: "NUM".to_string(),
                symbol_type: SymbolType::Terminal,
                token_kind: TokenKind::NumericConstant,
                symbol_kind: SymbolKind::Unknown,
            },
        ];
        table.productions = vec![FlatProduction {
            id: 0,
            target_symbol_id: 0,
            rhs: vec![1],
        }];
        table.set_command(0, 1, ParserCommand::Shift(1));
        table.set_command(1, 1, ParserCommand::Reduce(0));
        table.set_command(0, 0, ParserCommand::Goto(2));
        table.set_command(2, 1, ParserCommand::Accept);
        table
    }

    #[test]
    fn dump_then_load_is_identity() {
        let table = sample_table();
        let mut text = Vec::new();
        table.dump(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();

        let mut reloaded = ParserTable::new();
        reloaded.load(&text).unwrap();

        assert_eq!(reloaded.primary_state_id, table.primary_state_id);
        assert_eq!(reloaded.symbols.len(), table.symbols.len());
        for (a, b) in reloaded.symbols.iter().zip(table.symbols.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.symbol_type, b.symbol_type);
            assert_eq!(a.token_kind, b.token_kind);
            assert_eq!(a.symbol_kind, b.symbol_kind);
        }
        assert_eq!(reloaded.productions, table.productions);
        let cells_a: Vec<_> = reloaded.cells().map(|(k, v)| (*k, *v)).collect();
        let cells_b: Vec<_> = table.cells().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(cells_a, cells_b);
    }

    #[test]
    fn missing_cells_are_errors() {
        let table = sample_table();
        assert_eq!(table.command(7, 7), ParserCommand::Error);
        assert_eq!(table.command(0, 1), ParserCommand::Shift(1));
    }

    #[test]
    fn bad_input_clears_the_table() {
        let mut table = sample_table();
        let err = table.load("pStId zero\n").unwrap_err();
        assert_eq!(err, TableLoadError::BadInteger("zero".to_string()));
        assert!(table.symbols.is_empty());
        assert_eq!(table.cell_count(), 0);

        let mut table = sample_table();
        let err = table.load("fe 0 1 2 3\n").unwrap_err();
        assert_eq!(err, TableLoadError::MissingEnd);
        assert!(table.productions.is_empty());
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let mut table = ParserTable::new();
        assert_eq!(
            table.load("bogus 1 2\n").unwrap_err(),
            TableLoadError::BadDirective("bogus".to_string())
        );
    }
}
