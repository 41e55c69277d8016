// Copyright 2023 ToyCC contributors

//! `ParserCli`: lexical + syntax analysis, with optional AST dumping.

use super::{
    configure_color, lexical_analysis, print_usage, syntax_analysis, CliParams, EXIT_OK,
};

pub fn run(params: &CliParams) -> i32 {
    configure_color(params);
    if params.flag("help") {
        print_usage();
        return EXIT_OK;
    }

    let tokens = match lexical_analysis(params, true) {
        Ok(tokens) => tokens,
        Err(code) => return code,
    };
    match syntax_analysis(params, &tokens) {
        Ok(_) => EXIT_OK,
        Err(code) => code,
    }
}
