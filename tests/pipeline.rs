// Copyright 2023 ToyCC contributors

//! End-to-end pipeline tests over the shipped resources: source text to
//! tokens, AST, TCIR and assembly.

use lazy_static::lazy_static;
use toycc::lexer::Lexer;
use toycc::lr1::Lr1Builder;
use toycc::parser::Parser;
use toycc::table::ParserTable;
use toycc::tcir::{IrGenerator, IrInstruction};
use toycc::token::{Token, TokenKind};
use toycc::x86::{optimize_instructions, Intel386AssemblyGenerator};
use toycc::yacc::TceyLoader;

const TCDF: &str = include_str!("../resources/c99.tcdf");
const TCEY: &str = include_str!("../resources/c99.tcey.yacc");

lazy_static! {
    static ref LEXER: Lexer = Lexer::from_description(TCDF).unwrap();
    static ref TABLE: ParserTable = {
        let grammar = TceyLoader::load(TCEY).unwrap();
        Lr1Builder::new(&grammar).build_table()
    };
}

fn lex(source: &str) -> Vec<Token> {
    let (tokens, errors) = LEXER.analyze(source, true);
    assert!(errors.is_empty(), "lexer errors: {:?}", errors);
    tokens
}

fn parse(source: &str) -> Parser {
    let mut parser = Parser::new(TABLE.clone());
    let errors = parser.parse(&lex(source));
    assert!(errors.is_empty(), "parser errors: {:?}", errors);
    parser
}

fn generate_ir(source: &str) -> IrGenerator {
    let parser = parse(source);
    let mut generator = IrGenerator::new();
    let error_count = generator.process(parser.ast_root().unwrap());
    assert_eq!(error_count, 0, "ir errors: {:?}", generator.errors());
    generator
}

fn generate_asm(source: &str) -> String {
    let generator = generate_ir(source);
    let mut ir_text = Vec::new();
    generator.dump(&mut ir_text).unwrap();
    let mut asm_generator = Intel386AssemblyGenerator::new();
    let mut asm = Vec::new();
    let errors = asm_generator
        .generate(&String::from_utf8(ir_text).unwrap(), &mut asm)
        .unwrap();
    assert!(errors.is_empty(), "asm errors: {:?}", errors);
    String::from_utf8(asm).unwrap()
}

fn ir_lines(generator: &IrGenerator) -> Vec<String> {
    generator
        .instructions()
        .iter()
        .map(|instruction| instruction.to_string())
        .collect()
}

#[test]
fn empty_source_lexes_to_nothing_and_fails_to_parse() {
    let (tokens, errors) = LEXER.analyze("", true);
    assert!(tokens.is_empty());
    assert!(errors.is_empty());

    let mut parser = Parser::new(TABLE.clone());
    let parse_errors = parser.parse(&[]);
    assert_eq!(parse_errors.len(), 1);
    assert_eq!(parse_errors[0].message, "unexpected end of tokens.");
}

#[test]
fn single_declaration_reaches_static_data() {
    let generator = generate_ir("int x = 1;");
    let variable = generator.global_table().get_variable("x").unwrap();
    assert_eq!(variable.value_type.name(), "s32");
    assert_eq!(variable.init_value, 1);
    assert!(generator.instructions().is_empty());

    let mut dump = Vec::new();
    generator.dump(&mut dump).unwrap();
    let dump = String::from_utf8(dump).unwrap();
    assert!(dump.contains("int var x s32 1"));
}

#[test]
fn minimal_function_ir_and_assembly() {
    let generator = generate_ir("int main() { return 0; }");
    let lines = ir_lines(&generator);
    assert!(lines.contains(&"label main".to_string()));
    assert!(lines.contains(&"mov vreg 0 imm 0".to_string()));
    assert!(lines.contains(&"ret".to_string()));

    let asm = generate_asm("int main() { return 0; }");
    assert!(asm.contains("main:"));
    assert!(asm.contains("push ebp"));
    assert!(asm.contains("mov ebp, esp"));
    assert!(asm.contains("mov dword eax, 0"));
    assert!(asm.contains("leave"));
    assert!(asm.contains("ret"));
}

#[test]
fn if_else_uses_distinct_labels_and_jumps() {
    let generator = generate_ir("int f(int a){ if (a) return 1; else return 2; }");
    let lines = ir_lines(&generator);

    let else_label = lines
        .iter()
        .find_map(|line| line.strip_prefix("label ").filter(|l| l.starts_with(".if_else_")))
        .expect("an else label")
        .to_string();
    let end_label = lines
        .iter()
        .find_map(|line| line.strip_prefix("label ").filter(|l| l.starts_with(".if_end_")))
        .expect("an end label")
        .to_string();
    assert_ne!(else_label, end_label);
    assert!(lines.contains(&format!("je {}", else_label)));
    assert!(lines.contains(&format!("jmp {}", end_label)));
}

#[test]
fn while_loop_with_break_and_continue_targets() {
    let generator =
        generate_ir("int f(int n){ while (n) { if (n) break; n = n - 1; } return n; }");
    let lines = ir_lines(&generator);

    let exp_labels: Vec<&String> = lines
        .iter()
        .filter(|line| line.starts_with("label .while_loop_exp_"))
        .collect();
    let end_labels: Vec<&String> = lines
        .iter()
        .filter(|line| line.starts_with("label .while_loop_end_"))
        .collect();
    assert_eq!(exp_labels.len(), 1);
    assert_eq!(end_labels.len(), 1);

    let end_label = end_labels[0].strip_prefix("label ").unwrap();
    assert!(
        lines.contains(&format!("jmp {}", end_label)),
        "break must jump to the loop end label"
    );

    // n - 1 evaluates through a push/pop pair around the right operand
    let push_pos = lines.iter().position(|l| l == "push 4 vreg 0").unwrap();
    let pop_pos = lines.iter().position(|l| l == "pop 4 vreg 1").unwrap();
    let sub_pos = lines.iter().position(|l| l == "sub vreg 1 vreg 0").unwrap();
    assert!(push_pos < pop_pos && pop_pos < sub_pos);
    assert!(lines.contains(&"xchg vreg 0 vreg 1".to_string()));
}

#[test]
fn for_and_do_while_loops_compile() {
    let generator = generate_ir(
        "int f(int n){ int i; for (i = 0; i < n; i = i + 1) { n = n + 1; } \
         do { n = n - 1; } while (n); return n; }",
    );
    let lines = ir_lines(&generator);
    assert!(lines.iter().any(|l| l.starts_with("label .for_loop_estmt_")));
    assert!(lines.iter().any(|l| l.starts_with("label .for_loop_exp_")));
    assert!(lines.iter().any(|l| l.starts_with("label .do_while_stmt_")));
    assert!(lines.iter().any(|l| l.starts_with("label .do_while_end_")));
}

#[test]
fn conditional_and_short_circuit_labels() {
    let generator = generate_ir("int f(int a, int b){ return a && b ? a : b || a; }");
    let lines = ir_lines(&generator);
    assert!(lines.iter().any(|l| l.starts_with("label .logical_and_out_")));
    assert!(lines.iter().any(|l| l.starts_with("label .logical_or_out_")));
    assert!(lines.iter().any(|l| l.starts_with("label .con_false_")));
    assert!(lines.iter().any(|l| l.starts_with("label .con_exit_")));
    assert!(lines.iter().any(|l| l.starts_with("jne .logical_or_out_")));
}

#[test]
fn global_initializers_fold_at_compile_time() {
    let generator = generate_ir(
        "int a = 1 + 2 - 3; int b = (1 || 0) && 1; int c = 5 ^ 1; \
         int d = ~0; int e = -4; int f = 2 == 2; int g = 'A';",
    );
    let table = generator.global_table();
    assert_eq!(table.get_variable("a").unwrap().init_value, 0);
    assert_eq!(table.get_variable("b").unwrap().init_value, 1);
    assert_eq!(table.get_variable("c").unwrap().init_value, 4);
    assert_eq!(table.get_variable("d").unwrap().init_value, -1);
    assert_eq!(table.get_variable("e").unwrap().init_value, -4);
    assert_eq!(table.get_variable("f").unwrap().init_value, 1);
    assert_eq!(table.get_variable("g").unwrap().init_value, 65);
}

#[test]
fn function_calls_use_the_cdecl_convention() {
    let source = include_str!("../testdata/fib.c");
    let generator = generate_ir(source);
    let lines = ir_lines(&generator);
    assert!(lines.contains(&"pushfc 4 vreg 0".to_string()));
    assert!(lines.contains(&"call fib".to_string()));

    let asm = generate_asm(source);
    assert!(asm.contains("call fib"));
    assert!(asm.contains("add esp, 4"));
    // the comparison n < 2 materializes a flag into eax
    assert!(asm.contains("setl al"));
    assert!(asm.contains("movzx eax, al"));
}

#[test]
fn nested_scopes_get_distinct_ids_and_stack_slots() {
    let source = include_str!("../testdata/scopes.c");
    let generator = generate_ir(source);

    // total (outer block) and step (inner block)
    assert_eq!(generator.desc_table().len(), 2);
    let function = generator.global_table().get_function("f").unwrap();
    assert!(function.root_block_id > 0);
    assert_eq!(generator.global_table().get_variable("g").unwrap().init_value, 5);

    let mut dump = Vec::new();
    generator.dump(&mut dump).unwrap();
    let dump = String::from_utf8(dump).unwrap();
    assert_eq!(dump.matches("% begin").count(), 2);

    let asm = generate_asm(source);
    // two nested locals: 8 bytes of frame
    assert!(asm.contains("sub esp, 8"));
    assert!(asm.contains("[ebp - 4]"));
    assert!(asm.contains("[ebp - 8]"));
    // the global g lands in the data section, little endian
    assert!(asm.contains("g:"));
    assert!(asm.contains("db 5, 0, 0, 0"));
}

#[test]
fn shadowing_declares_two_variables() {
    let generator = generate_ir("int f(){ int x; x = 1; { int x; x = 2; } return x; }");
    assert_eq!(generator.desc_table().len(), 2);
    let lines = ir_lines(&generator);
    assert!(lines.contains(&"mov val 1 vreg 0".to_string()));
    assert!(lines.contains(&"mov val 2 vreg 0".to_string()));
}

#[test]
fn unsupported_constructs_report_ir_errors() {
    let parser = parse("int f(int x){ return x * 2; }");
    let mut generator = IrGenerator::new();
    let error_count = generator.process(parser.ast_root().unwrap());
    assert!(error_count > 0);
    assert!(generator.errors()[0].message.starts_with("not supported:"));

    let parser = parse("int f(){ goto out; out: return 1; }");
    let mut generator = IrGenerator::new();
    assert!(generator.process(parser.ast_root().unwrap()) > 0);
}

#[test]
fn semantic_errors_report_positions() {
    let parser = parse("int f(){ return y; }");
    let mut generator = IrGenerator::new();
    assert!(generator.process(parser.ast_root().unwrap()) > 0);
    assert!(generator
        .errors()
        .iter()
        .any(|e| e.message.contains("symbol not found: y")));
}

#[test]
fn peephole_erases_push_pop_and_double_ret() {
    let mut instructions = vec![
        IrInstruction::parse("push vreg 0"),
        IrInstruction::parse("pop vreg 0"),
        IrInstruction::parse("ret"),
        IrInstruction::parse("ret"),
    ];
    optimize_instructions(&mut instructions);
    let lines: Vec<String> = instructions.iter().map(|i| i.to_string()).collect();
    assert_eq!(lines, vec!["ret"]);
}

#[test]
fn table_cache_round_trips_through_a_file() {
    use std::io::Write;

    let mut text = Vec::new();
    TABLE.dump(&mut text).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c99.tcpt");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&text).unwrap();
    drop(file);

    let mut reloaded = ParserTable::new();
    reloaded
        .load(&std::fs::read_to_string(&path).unwrap())
        .unwrap();
    assert_eq!(reloaded.primary_state_id, TABLE.primary_state_id);
    assert_eq!(reloaded.symbols.len(), TABLE.symbols.len());
    assert_eq!(reloaded.productions.len(), TABLE.productions.len());
    assert_eq!(reloaded.cell_count(), TABLE.cell_count());

    // a reloaded table drives the parser just as well
    let mut parser = Parser::new(reloaded);
    let errors = parser.parse(&lex("int main() { return 0; }"));
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn relex_round_trip_preserves_the_token_stream() {
    let source = "int main() { /* note */ int x = 10; // trailing\n return x; }";
    let original: Vec<(String, TokenKind)> = lex(source)
        .into_iter()
        .filter(|token| !token.kind.is_comment())
        .map(|token| (token.content.clone(), token.kind))
        .collect();

    let joined = original
        .iter()
        .map(|(content, _)| content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let relexed: Vec<(String, TokenKind)> = lex(&joined)
        .into_iter()
        .filter(|token| !token.kind.is_comment())
        .map(|token| (token.content.clone(), token.kind))
        .collect();

    assert_eq!(original, relexed);
}

#[test]
fn dot_dump_renders_the_tree() {
    let parser = parse("int x;");
    let mut out = Vec::new();
    parser.ast_root().unwrap().dump_dot(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("digraph G1 {"));
    assert!(text.contains("translation_unit"));
    assert!(text.contains("\\nx\\n(1, 5)"));
}

#[test]
fn syntax_errors_carry_positions() {
    let mut parser = Parser::new(TABLE.clone());
    let errors = parser.parse(&lex("int main() { return 0 }"));
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("unexpected token: }"));

    let mut parser = Parser::new(TABLE.clone());
    let errors = parser.parse(&lex("int main() { return 0;"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "unexpected end of tokens.");
}
