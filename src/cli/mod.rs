// Copyright 2023 ToyCC contributors

//! Command-line front end.
//!
//! Arguments follow the `s<subprogram> -<flag> -<key>:<value>` convention;
//! the dispatcher in `main.rs` picks the subprogram and hands it the parsed
//! parameter map. Stage failures map to negative exit codes so callers can
//! tell where the pipeline stopped.

pub mod lexer_cli;
pub mod parser_cli;
pub mod uni_cli;

use crate::lexer::Lexer;
use crate::lr1::Lr1Builder;
use crate::parser::Parser;
use crate::table::ParserTable;
use crate::token::Token;
use crate::yacc::TceyLoader;
use colored::Colorize;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

pub const DEFAULT_TCDF_PATH: &str = "resources/c99.tcdf";
pub const DEFAULT_TCEY_PATH: &str = "resources/c99.tcey.yacc";

pub const EXIT_OK: i32 = 0;
pub const EXIT_MISSING_FNAME: i32 = -1;
pub const EXIT_OPEN_FAILED: i32 = -2;
pub const EXIT_GRAMMAR_ERROR: i32 = -3;
pub const EXIT_DFA_NOT_READY: i32 = -4;
pub const EXIT_LEXER_ERRORS: i32 = -5;
pub const EXIT_PARSER_ERRORS: i32 = -6;
pub const EXIT_IR_ERRORS: i32 = -7;
pub const EXIT_OUTPUT_FAILED: i32 = -9;

/// Parsed command line: `-key:value` pairs, `-flag` switches and anything
/// that did not start with a dash.
#[derive(Debug, Default)]
pub struct CliParams {
    values: BTreeMap<String, String>,
    flags: BTreeSet<String>,
    pub extras: Vec<String>,
}

impl CliParams {
    pub fn parse(args: &[String]) -> Self {
        let mut params = CliParams::default();
        for arg in args {
            if let Some(body) = arg.strip_prefix('-') {
                match body.find(':') {
                    Some(split) => {
                        params
                            .values
                            .insert(body[..split].to_string(), body[split + 1..].to_string());
                    }
                    None => {
                        params.flags.insert(body.to_string());
                    }
                }
            } else {
                params.extras.push(arg.clone());
            }
        }
        params
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }
}

/// Color goes away for `-disable-color` and for redirected output.
pub fn configure_color(params: &CliParams) {
    if params.flag("disable-color") || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
}

pub fn print_usage() {
    println!();
    println!("toycc - an educational C compiler");
    println!();
    println!("usage: toycc s[subprogram name] [options]");
    println!();
    println!("available subprograms:");
    println!("  LexerCli  - lexical analyzer.");
    println!("  ParserCli - syntax analyzer building the syntax tree.");
    println!("  UniCli    - the full pipeline down to i386 assembly.");
    println!();
    println!("options are passed to the subprogram:");
    println!("  with format: -[key]:[value]");
    println!("  or flag: -[flag]");
    println!();
    println!("common options:");
    println!("  -fname:[x]      : specify input file 'x' (required).");
    println!("  -help           : print this message.");
    println!("  -dump-tokens    : dump tokens.");
    println!("  -tcdf:[x]       : lexer DFA description file.");
    println!("  -tcey:[x]       : grammar file.");
    println!("  -cache-table:[x]: parser table cache file.");
    println!("  -rebuild-table  : rebuild the parser table from the grammar.");
    println!("  -no-store-table : don't store a freshly built table.");
    println!("  -dump-ast       : dump the syntax tree as graphviz dot.");
    println!("  -dot-file:[x]   : write the dot dump to file 'x'.");
    println!("  -dump-ir        : dump toycc ir code.");
    println!("  -ir-to-file:[x] : write the ir dump to file 'x'.");
    println!("  -asm-to-file:[x]: write assembly to file 'x'.");
    println!("  -disable-color  : disable colored diagnostics.");
    println!();
    println!("example:");
    println!("  toycc sUniCli -fname:test.c -rebuild-table -dump-ir");
    println!();
}

pub fn error_tag(tag: &str) -> String {
    format!("{}", tag.red().bold())
}

/// Build the lexer from the configured DFA description.
pub fn load_lexer(params: &CliParams) -> Result<Lexer, i32> {
    let path = params.value("tcdf").unwrap_or(DEFAULT_TCDF_PATH);
    let description = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            eprintln!(
                "{} failed to open dfa description {}: {}",
                error_tag("[error]"),
                path,
                error
            );
            return Err(EXIT_DFA_NOT_READY);
        }
    };
    Lexer::from_description(&description).map_err(|error| {
        eprintln!("{} lexer dfa: {}", error_tag("[error]"), error);
        EXIT_DFA_NOT_READY
    })
}

/// Open the source, lex it, report errors and honour `-dump-tokens`.
pub fn lexical_analysis(
    params: &CliParams,
    see_char_constants_as_numerics: bool,
) -> Result<Vec<Token>, i32> {
    let fname = match params.value("fname") {
        Some(fname) => fname,
        None => {
            eprintln!("{} fname required.", error_tag("[error]"));
            print_usage();
            return Err(EXIT_MISSING_FNAME);
        }
    };
    let source = match fs::read_to_string(fname) {
        Ok(source) => source,
        Err(error) => {
            eprintln!(
                "{} failed to open source file {}: {}",
                error_tag("[error]"),
                fname,
                error
            );
            return Err(EXIT_OPEN_FAILED);
        }
    };

    let lexer = load_lexer(params)?;
    let (tokens, errors) = lexer.analyze(&source, see_char_constants_as_numerics);
    if !errors.is_empty() {
        for error in errors.iter() {
            eprintln!(
                "{} ({}, {}) {}. token: {}.",
                error_tag("lexer error:"),
                error.row,
                error.col,
                error.message,
                error.token.content
            );
        }
        return Err(EXIT_LEXER_ERRORS);
    }

    if params.flag("dump-tokens") {
        dump_tokens(&tokens);
    }
    Ok(tokens)
}

pub fn dump_tokens(tokens: &[Token]) {
    for token in tokens {
        println!("token");
        println!("pos    : <{}, {}>", token.row, token.col);
        println!("kind   : {}", token.kind.name());
        println!("kind id: {}", token.kind as u32);
        println!("content: ");
        println!("{}", token.content);
        println!("--- end of token ---");
    }
}

/// Get an Action/Goto table: from the cache when allowed and possible,
/// otherwise rebuilt from the grammar (and stored back atomically).
pub fn prepare_parser_table(params: &CliParams) -> Result<ParserTable, i32> {
    let tcey_path = params.value("tcey").unwrap_or(DEFAULT_TCEY_PATH).to_string();
    let cache_path = params
        .value("cache-table")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.tcpt", tcey_path));

    if !params.flag("rebuild-table") {
        match fs::read_to_string(&cache_path) {
            Ok(text) => {
                let mut table = ParserTable::new();
                match table.load(&text) {
                    Ok(()) => return Ok(table),
                    Err(error) => warn!("failed to load table cache: {}", error),
                }
            }
            Err(error) => warn!("failed to open cache {}: {}", cache_path, error),
        }
    }

    let grammar = match TceyLoader::load_file(&PathBuf::from(&tcey_path)) {
        Ok(grammar) => grammar,
        Err(error) => {
            eprintln!("{} {}", error_tag("[error]"), error);
            return Err(EXIT_GRAMMAR_ERROR);
        }
    };
    let table = Lr1Builder::new(&grammar).build_table();

    if !params.flag("no-store-table") {
        if let Err(error) = store_table(&table, &cache_path) {
            warn!("failed to store parser table: {}", error);
        }
    }
    Ok(table)
}

/// Write-to-temp-then-rename so a half-written cache is never observed.
fn store_table(table: &ParserTable, cache_path: &str) -> std::io::Result<()> {
    let temp_path = format!("{}.tmp", cache_path);
    {
        let mut file = fs::File::create(&temp_path)?;
        table.dump(&mut file)?;
    }
    fs::rename(&temp_path, cache_path)
}

/// Parse the token list, report errors and honour `-dump-ast`/`-dot-file`.
pub fn syntax_analysis(params: &CliParams, tokens: &[Token]) -> Result<Parser, i32> {
    let table = prepare_parser_table(params)?;
    let mut parser = Parser::new(table);
    let errors = parser.parse(tokens);
    if !errors.is_empty() {
        for error in errors.iter() {
            eprint!("{} {}. ", error_tag("parser error:"), error.message);
            if let Some(token) = &error.token {
                eprint!("at: ({}, {}), {}. ", token.row, token.col, token.content);
            }
            eprintln!();
        }
        return Err(EXIT_PARSER_ERRORS);
    }

    if params.flag("dump-ast") {
        if let Some(root) = parser.ast_root() {
            let mut dumped_to_file = false;
            if let Some(path) = params.value("dot-file") {
                if let Ok(mut file) = fs::File::create(path) {
                    dumped_to_file = root.dump_dot(&mut file).is_ok();
                }
            }
            if !dumped_to_file {
                let stdout = std::io::stdout();
                let _ = root.dump_dot(&mut stdout.lock());
            }
        }
    }
    Ok(parser)
}
