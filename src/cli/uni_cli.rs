// Copyright 2023 ToyCC contributors

//! `UniCli`: the full pipeline. Source text to tokens, AST, TCIR and i386
//! assembly.

use super::{
    configure_color, error_tag, lexical_analysis, print_usage, syntax_analysis, CliParams,
    EXIT_IR_ERRORS, EXIT_OK, EXIT_OUTPUT_FAILED, EXIT_PARSER_ERRORS,
};
use crate::tcir::{IrDiagnostic, IrGenerator};
use crate::x86::Intel386AssemblyGenerator;
use colored::Colorize;
use std::fs;

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
    let parser = match syntax_analysis(params, &tokens) {
        Ok(parser) => parser,
        Err(code) => return code,
    };
    let ast_root = match parser.ast_root() {
        Some(root) => root,
        None => {
            eprintln!("{} parser produced no tree.", error_tag("[error]"));
            return EXIT_PARSER_ERRORS;
        }
    };

    let mut generator = IrGenerator::new();
    generator.process(ast_root);

    for warning in generator.warnings() {
        eprintln!("{} {}", "warning:".yellow().bold(), warning.message);
        print_diagnostic_location(warning);
    }
    for error in generator.errors() {
        eprintln!("{} {}", error_tag("error:"), error.message);
        print_diagnostic_location(error);
    }
    if !generator.errors().is_empty() {
        return EXIT_IR_ERRORS;
    }

    let mut ir_text = Vec::new();
    if generator.dump(&mut ir_text).is_err() {
        eprintln!("{} failed to render ir.", error_tag("[error]"));
        return EXIT_OUTPUT_FAILED;
    }
    let ir_text = String::from_utf8_lossy(&ir_text).into_owned();

    if params.flag("dump-ir") {
        if let Some(path) = params.value("ir-to-file") {
            if fs::write(path, &ir_text).is_err() {
                eprintln!("{} failed to open ir output file.", error_tag("[error]"));
                return EXIT_OUTPUT_FAILED;
            }
        } else {
            print!("{}", ir_text);
        }
    }

    let mut asm_generator = Intel386AssemblyGenerator::new();
    let mut asm_text = Vec::new();
    match asm_generator.generate(&ir_text, &mut asm_text) {
        Ok(asm_errors) => {
            for message in asm_errors {
                eprintln!("{} {}", error_tag("asm error:"), message);
            }
        }
        Err(error) => {
            eprintln!("{} {}", error_tag("asm error:"), error);
            return EXIT_OUTPUT_FAILED;
        }
    }
    let asm_text = String::from_utf8_lossy(&asm_text).into_owned();

    if let Some(path) = params.value("asm-to-file") {
        if fs::write(path, &asm_text).is_err() {
            eprintln!("{} failed to open asm output file.", error_tag("[error]"));
            return EXIT_OUTPUT_FAILED;
        }
    } else {
        print!("{}", asm_text);
    }

    EXIT_OK
}

/// Print the first terminal under the diagnostic's node: its content and
/// source position.
fn print_diagnostic_location(diagnostic: &IrDiagnostic) {
    if let Some(node) = &diagnostic.node {
        if let Some(terminal) = node.first_terminal() {
            let token = terminal.token();
            eprintln!("  token: {}", token.content);
            eprintln!("  loc  : ({}, {})", token.row, token.col);
        }
    }
}
