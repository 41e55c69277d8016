// Copyright 2023 ToyCC contributors

//! toycc: an educational compiler front end plus a minimal code generator
//! for a subset of C.
//!
//! The pipeline, stage by stage:
//!
//! 1. [`dfa`] + [`lexer`] — a table-driven DFA cuts the source into tokens
//!    with 1-based source positions.
//! 2. [`yacc`] — loads an extended-Yacc grammar into the [`grammar`] model.
//! 3. [`lr1`] — canonical LR(1) item sets and the Action/Goto [`table`],
//!    which round-trips through a text cache.
//! 4. [`parser`] — shift-reduce driver building the [`ast`].
//! 5. [`tcir`] — symbol tables and the textual three-address IR.
//! 6. [`x86`] — peephole optimization and i386 assembly emission.
//!
//! Each stage is a pure function from its input artifact to its output;
//! failures surface as per-stage diagnostic lists. The only process-wide
//! state is the lazily built token-kind name map in [`token`].

pub mod ast;
pub mod cli;
pub mod dfa;
pub mod grammar;
pub mod lexer;
pub mod lr1;
pub mod parser;
pub mod scan;
pub mod table;
pub mod tcir;
pub mod token;
pub mod x86;
pub mod yacc;

pub use ast::AstNode;
pub use dfa::{Dfa, DfaError};
pub use grammar::{Grammar, Symbol, SymbolKind, SymbolType};
pub use lexer::{LexError, Lexer};
pub use lr1::Lr1Builder;
pub use parser::{ParseError, Parser};
pub use table::{ParserCommand, ParserTable, TableLoadError};
pub use token::{Token, TokenKind};
pub use yacc::{TceyLoader, YaccError};
