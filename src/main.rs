// Copyright 2023 ToyCC contributors

//! Entry point: parse the command line and start the requested subprogram.
//!
//! ```text
//! toycc s[subprogram] (-[flag] | -[key]:[value])*
//! ```

use toycc::cli::{self, CliParams};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let subprogram = match args.first() {
        Some(first) if first.starts_with('s') && first.len() > 1 => first[1..].to_string(),
        _ => {
            cli::print_usage();
            std::process::exit(1);
        }
    };
    let params = CliParams::parse(&args[1..]);

    let code = match subprogram.as_str() {
        "LexerCli" => cli::lexer_cli::run(&params),
        "ParserCli" => cli::parser_cli::run(&params),
        "UniCli" => cli::uni_cli::run(&params),
        other => {
            eprintln!("unknown subprogram: {}", other);
            cli::print_usage();
            1
        }
    };
    std::process::exit(code);
}
