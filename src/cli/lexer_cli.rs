// Copyright 2023 ToyCC contributors

//! `LexerCli`: lexical analysis only.

use super::{configure_color, lexical_analysis, print_usage, CliParams, EXIT_OK};

pub fn run(params: &CliParams) -> i32 {
    configure_color(params);
    if params.flag("help") {
        print_usage();
        return EXIT_OK;
    }

    // `-char-as-num` folds char constants into their ASCII value, the same
    // view the parser-facing subprograms use.
    match lexical_analysis(params, params.flag("char-as-num")) {
        Ok(_) => EXIT_OK,
        Err(code) => code,
    }
}
