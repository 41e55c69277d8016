// Copyright 2023 ToyCC contributors

//! TCIR generation: a recursive descent over the AST, one method per grammar
//! non-terminal the emitter understands.
//!
//! Expression routines return an [`ExprValue`]: a compile-time constant (the
//! only possibility at global scope), a plain rvalue left in `vreg 0`, or an
//! lvalue that `++`/`--` and assignment may re-target. Binary operators
//! evaluate the left operand into `vreg 0`, push it, evaluate the right
//! operand, pop the saved value into `vreg 1`, operate and leave the result
//! in `vreg 0`.

use crate::ast::AstNode;
use crate::grammar::SymbolKind;
use crate::tcir::ir::IrInstruction;
use crate::tcir::symtab::{
    BlockId, BlockSymbolTable, FunctionSymbol, FunctionParamSymbol, GlobalSymbolTable,
    SymbolVisibility, VarId, VariableDescriptionTable, VariableSymbol,
};
use crate::tcir::value_type::ValueType;
use crate::token::TokenKind;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Per-node diagnostic; errors count toward failure, warnings never do.
#[derive(Debug, Clone)]
pub struct IrDiagnostic {
    pub message: String,
    pub node: Option<AstNode>,
}

impl std::fmt::Display for IrDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Where an lvalue lives; renders to the TCIR operand that addresses it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LvalueRef {
    Local(VarId),
    Param(String),
    Global(String),
}

impl LvalueRef {
    fn ir_operand(&self) -> String {
        match self {
            LvalueRef::Local(id) => format!("val {}", id),
            LvalueRef::Param(name) => format!("fval {}", name),
            LvalueRef::Global(name) => format!("val {}", name),
        }
    }
}

/// Tagged result of an expression routine.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExprValue {
    /// Compile-time value (global scope only).
    Constant(i64),
    /// Result lives in `vreg 0`.
    Rvalue,
    /// Result lives in `vreg 0` and is addressable.
    Lvalue(LvalueRef),
}

#[derive(Debug, Default)]
pub struct IrGenerator {
    desc_table: VariableDescriptionTable,
    global_table: GlobalSymbolTable,
    /// The live scope chain, current block included, keyed by id.
    live_blocks: BTreeMap<BlockId, BlockSymbolTable>,
    current_block_id: Option<BlockId>,
    current_function: Option<String>,
    instructions: Vec<IrInstruction>,
    block_symtab_dump: String,
    errors: Vec<IrDiagnostic>,
    warnings: Vec<IrDiagnostic>,
    next_label_id: i32,
    next_var_id: VarId,
    next_block_id: BlockId,
    break_targets: Vec<String>,
    continue_targets: Vec<String>,
}

impl IrGenerator {
    pub fn new() -> Self {
        let mut generator = IrGenerator::default();
        generator.reset_counters();
        generator
    }

    fn reset_counters(&mut self) {
        self.next_label_id = 1;
        self.next_var_id = 1;
        self.next_block_id = 1;
    }

    pub fn clear(&mut self) {
        self.desc_table.clear();
        self.global_table.clear();
        self.live_blocks.clear();
        self.current_block_id = None;
        self.current_function = None;
        self.instructions.clear();
        self.block_symtab_dump.clear();
        self.errors.clear();
        self.warnings.clear();
        self.break_targets.clear();
        self.continue_targets.clear();
        self.reset_counters();
    }

    /// Translate a `translation_unit` tree. Returns the number of errors.
    pub fn process(&mut self, root: &AstNode) -> usize {
        self.clear();
        self.process_translation_unit(root);
        self.errors.len()
    }

    pub fn errors(&self) -> &[IrDiagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[IrDiagnostic] {
        &self.warnings
    }

    pub fn instructions(&self) -> &[IrInstruction] {
        &self.instructions
    }

    pub fn global_table(&self) -> &GlobalSymbolTable {
        &self.global_table
    }

    pub fn desc_table(&self) -> &VariableDescriptionTable {
        &self.desc_table
    }

    /// Write the five-section TCIR text.
    pub fn dump<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "@ begin of extlink")?;
        for (name, function) in self.global_table.functions.iter() {
            if function.visibility == SymbolVisibility::Global {
                writeln!(writer, "export {} fun", name)?;
            }
        }
        for name in self.global_table.variables.keys() {
            writeln!(writer, "export {} var", name)?;
        }
        writeln!(writer, "@ end of extlink")?;
        writeln!(writer)?;

        writeln!(writer, "@ begin of static-data")?;
        for (name, variable) in self.global_table.variables.iter() {
            writeln!(
                writer,
                "int var {} {} {}",
                name,
                variable.value_type.name(),
                variable.init_value
            )?;
        }
        writeln!(writer, "@ end of static-data")?;
        writeln!(writer)?;

        writeln!(writer, "@ begin of global-symtab")?;
        self.global_table.dump(writer, &self.desc_table)?;
        writeln!(writer, "@ end of global-symtab")?;
        writeln!(writer)?;

        writeln!(writer, "@ begin of block-symtab")?;
        writer.write_all(self.block_symtab_dump.as_bytes())?;
        writeln!(writer, "@ end of block-symtab")?;
        writeln!(writer)?;

        writeln!(writer, "@ begin of instructions")?;
        for instruction in self.instructions.iter() {
            writeln!(writer, "{}", instruction)?;
        }
        writeln!(writer, "@ end of instructions")?;
        Ok(())
    }

    /* ---------- diagnostics ---------- */

    fn emit(&mut self, code: &str) {
        self.instructions.push(IrInstruction::parse(code));
    }

    fn error(&mut self, node: &AstNode, message: impl Into<String>) {
        self.errors.push(IrDiagnostic {
            message: message.into(),
            node: Some(node.clone()),
        });
    }

    fn warning(&mut self, node: &AstNode, message: impl Into<String>) {
        self.warnings.push(IrDiagnostic {
            message: message.into(),
            node: Some(node.clone()),
        });
    }

    fn unsupported(&mut self, node: &AstNode) {
        let message = match node.first_terminal() {
            Some(terminal) => {
                let token = terminal.token();
                format!(
                    "not supported: ({}, {}) {} as {}",
                    token.row, token.col, token.content, node.symbol().name
                )
            }
            None => format!("not supported: {}", node.symbol().name),
        };
        self.errors.push(IrDiagnostic {
            message,
            node: Some(node.clone()),
        });
    }

    fn next_label(&mut self) -> i32 {
        let id = self.next_label_id;
        self.next_label_id += 1;
        id
    }

    /* ---------- declarations ---------- */

    fn process_translation_unit(&mut self, node: &AstNode) {
        if node.child_count() == 1 {
            self.process_external_declaration(&node.child(0).unwrap());
        } else {
            self.process_translation_unit(&node.child(0).unwrap());
            self.process_external_declaration(&node.child(1).unwrap());
        }
    }

    fn process_external_declaration(&mut self, node: &AstNode) {
        let child = node.child(0).expect("external_declaration has one child");
        if child.symbol_kind() == SymbolKind::FunctionDefinition {
            self.process_function_definition(&child);
        } else {
            self.process_declaration(&child, true);
        }
    }

    fn process_function_definition(&mut self, node: &AstNode) {
        if node.child_count() != 3 {
            // the K&R declaration-list form
            self.unsupported(node);
            return;
        }
        let specifiers_node = node.child(0).unwrap();
        let declarator_node = node.child(1).unwrap();
        let body_node = node.child(2).unwrap();

        let specifier_tokens = match self.process_declaration_specifiers(&specifiers_node) {
            Some(tokens) => tokens,
            None => return,
        };

        if declarator_node.child_count() != 1 {
            self.unsupported(&declarator_node.child(0).unwrap());
            return;
        }
        let direct_declarator = declarator_node.child(0).unwrap();

        let mut params: Vec<FunctionParamSymbol> = vec![];
        if direct_declarator.child_count() == 3
            && direct_declarator
                .child(1)
                .map(|c| c.is_terminal() && c.token_kind() == TokenKind::LParen)
                .unwrap_or(false)
        {
            // direct_declarator '(' ')'
        } else if direct_declarator.child_count() == 4
            && direct_declarator
                .child(2)
                .map(|c| c.symbol_kind() == SymbolKind::ParameterTypeList)
                .unwrap_or(false)
        {
            let parameter_type_list = direct_declarator.child(2).unwrap();
            if parameter_type_list.child_count() != 1 {
                // variadic parameter list
                self.unsupported(&parameter_type_list);
            } else {
                let mut list = parameter_type_list.child(0).unwrap();
                let mut declarations = vec![];
                while list.child_count() > 1 {
                    declarations.push(list.child(2).unwrap());
                    list = list.child(0).unwrap();
                }
                declarations.push(list.child(0).unwrap());

                for declaration in declarations.iter().rev() {
                    if declaration.child_count() == 1 {
                        // parameter_declaration -> declaration_specifiers
                        self.unsupported(declaration);
                        continue;
                    }
                    let types = match self.process_declaration_specifiers(
                        &declaration.child(0).unwrap(),
                    ) {
                        Some(tokens) => tokens,
                        None => continue,
                    };
                    let param_declarator = declaration.child(1).unwrap();
                    if param_declarator.symbol_kind() == SymbolKind::AbstractDeclarator {
                        self.unsupported(&param_declarator);
                        continue;
                    }
                    if param_declarator.child_count() != 1 {
                        // pointer declarator
                        self.unsupported(&param_declarator.child(0).unwrap());
                        continue;
                    }
                    let direct = param_declarator.child(0).unwrap();
                    if direct.child_count() != 1 {
                        self.unsupported(declaration);
                        continue;
                    }
                    let name = direct.child(0).unwrap().token().content.clone();
                    params.push(FunctionParamSymbol {
                        name,
                        value_type: if types[0] == TokenKind::KwInt {
                            ValueType::S32
                        } else {
                            ValueType::Void
                        },
                        is_pointer: false,
                        is_va_list: false,
                    });
                }
            }
        } else {
            self.unsupported(&declarator_node);
            return;
        }

        let name_declarator = direct_declarator.child(0).unwrap();
        let name_node = match name_declarator.child(0) {
            Some(child) if child.is_terminal() => child,
            _ => {
                self.unsupported(&name_declarator);
                return;
            }
        };
        let function_name = name_node.token().content.clone();

        self.global_table.put_function(FunctionSymbol {
            name: function_name.clone(),
            return_type: if specifier_tokens[0] == TokenKind::KwInt {
                ValueType::S32
            } else {
                ValueType::Void
            },
            is_imported: false,
            visibility: SymbolVisibility::Global,
            params,
            root_block_id: 0,
        });
        self.current_function = Some(function_name.clone());

        self.emit(&format!("label {}", function_name));
        let root_block = self.process_compound_statement(&body_node);
        if let Some(block_id) = root_block {
            if let Some(function) = self.global_table.functions.get_mut(&function_name) {
                function.root_block_id = block_id;
            }
        }
        // may duplicate a return's ret; the peephole pass strips it
        self.emit("ret");

        self.current_function = None;
    }

    /// Enter a fresh scope for `{ block_item_list }`, process it and dump the
    /// block record on exit. Returns the block id, or None for `{ }`.
    fn process_compound_statement(&mut self, node: &AstNode) -> Option<BlockId> {
        if node.child_count() == 2 {
            return None;
        }

        let block_id = self.next_block_id;
        self.next_block_id += 1;
        let parent_id = self.current_block_id;
        self.live_blocks
            .insert(block_id, BlockSymbolTable::new(block_id, parent_id));
        if let Some(parent) = parent_id.and_then(|id| self.live_blocks.get_mut(&id)) {
            parent.children.push(block_id);
        }
        self.current_block_id = Some(block_id);

        self.process_block_item_list(&node.child(1).unwrap());

        self.current_block_id = parent_id;
        if let Some(block) = self.live_blocks.remove(&block_id) {
            let mut record = Vec::new();
            block
                .dump(&mut record, &self.desc_table)
                .expect("writing to a Vec cannot fail");
            self.block_symtab_dump
                .push_str(&String::from_utf8_lossy(&record));
        }
        Some(block_id)
    }

    fn process_block_item_list(&mut self, node: &AstNode) {
        if node.child_count() == 1 {
            self.process_block_item(&node.child(0).unwrap());
        } else {
            self.process_block_item_list(&node.child(0).unwrap());
            self.process_block_item(&node.child(1).unwrap());
        }
    }

    fn process_block_item(&mut self, node: &AstNode) {
        let child = node.child(0).expect("block_item has one child");
        if child.symbol_kind() == SymbolKind::Statement {
            self.process_statement(&child);
        } else {
            self.process_declaration(&child, false);
        }
    }

    fn process_declaration(&mut self, node: &AstNode, is_global: bool) {
        if node.child_count() == 2 {
            // declaration_specifiers ';'
            return;
        }
        let specifier_tokens = match self.process_declaration_specifiers(&node.child(0).unwrap()) {
            Some(tokens) => tokens,
            None => {
                self.unsupported(node);
                return;
            }
        };

        let mut list = node.child(1).unwrap();
        let mut declarators = vec![];
        while list.child_count() > 1 {
            declarators.push(list.child(2).unwrap());
            list = list.child(0).unwrap();
        }
        declarators.push(list.child(0).unwrap());
        for declarator in declarators.iter().rev() {
            self.process_init_declarator(declarator, &specifier_tokens, is_global);
        }
    }

    fn process_init_declarator(
        &mut self,
        node: &AstNode,
        specifier_tokens: &[TokenKind],
        is_global: bool,
    ) {
        if specifier_tokens[0] != TokenKind::KwInt {
            self.error(
                &node.child(0).unwrap(),
                "unsupported value type. only int supported.",
            );
            return;
        }
        let value_type = ValueType::S32;

        let declarator = node.child(0).unwrap();
        if declarator.child_count() > 1 {
            // pointer
            self.unsupported(&declarator.child(0).unwrap());
            return;
        }
        let direct = declarator.child(0).unwrap();
        if direct.child_count() > 1 {
            // arrays and the like; only direct_declarator -> IDENTIFIER here
            self.unsupported(&direct);
            return;
        }
        let name = direct.child(0).unwrap().token().content.clone();

        let mut symbol = VariableSymbol {
            id: 0,
            name: name.clone(),
            bytes: value_type.bytes(),
            value_type,
            visibility: if is_global {
                SymbolVisibility::Global
            } else {
                SymbolVisibility::Internal
            },
            init_value: 0,
        };

        if is_global {
            if self.global_table.get_variable(&name).is_some() {
                self.warning(node, format!("symbol redefined: {}", name));
            }
            if self.global_table.get_function(&name).is_some() {
                self.error(node, format!("symbol defined as function: {}", name));
                return;
            }
        } else {
            let already_defined = self
                .current_block()
                .map(|block| block.get_by_name(&name, false, &self.live_blocks).is_some())
                .unwrap_or(false);
            if already_defined {
                self.error(node, format!("already defined: {}", name));
                return;
            }
            symbol.id = self.next_var_id;
            self.next_var_id += 1;
        }

        if node.child_count() == 1 {
            // no initializer; globals default to 0, locals stay undefined
            self.register_variable(symbol, is_global);
            return;
        }

        let initializer = node.child(2).unwrap();
        if initializer.child_count() > 1 {
            // brace initializer
            self.unsupported(&initializer);
            return;
        }
        let init_expression = initializer.child(0).unwrap();

        let error_count = self.errors.len();
        let value = self.process_assignment_expression(&init_expression, is_global);
        if self.errors.len() > error_count {
            return;
        }

        // Registered after the initializer runs, so the expression cannot
        // refer to the symbol it initializes.
        let local_id = symbol.id;
        self.register_variable(symbol, is_global);

        if is_global {
            match value {
                ExprValue::Constant(folded) => {
                    if let Some(variable) = self.global_table.variables.get_mut(&name) {
                        variable.init_value = folded;
                    }
                }
                _ => self.error(node, "global initializer is not a constant."),
            }
        } else {
            self.emit(&format!("mov val {} vreg 0", local_id));
        }
    }

    fn register_variable(&mut self, symbol: VariableSymbol, is_global: bool) {
        if is_global {
            self.global_table.put_variable(symbol);
        } else if let Some(block_id) = self.current_block_id {
            let desc_table = &mut self.desc_table;
            if let Some(block) = self.live_blocks.get_mut(&block_id) {
                block.put(symbol, desc_table);
            }
        }
    }

    fn current_block(&self) -> Option<&BlockSymbolTable> {
        self.current_block_id
            .and_then(|id| self.live_blocks.get(&id))
    }

    /// Only `int` and `void` pass; everything else is reported. Returns the
    /// accepted specifier tokens or None when diagnostics were added.
    fn process_declaration_specifiers(&mut self, node: &AstNode) -> Option<Vec<TokenKind>> {
        if node.child_count() != 1 {
            self.unsupported(node);
            return None;
        }
        let child = node.child(0).unwrap();
        if child.symbol_kind() != SymbolKind::TypeSpecifier {
            self.unsupported(node);
            return None;
        }
        let specifier = child.child(0).unwrap();
        if specifier.child_count() != 0 {
            // struct_or_union_specifier / enum_specifier
            self.unsupported(&specifier);
            return None;
        }
        match specifier.token_kind() {
            TokenKind::KwInt => Some(vec![TokenKind::KwInt]),
            TokenKind::KwVoid => Some(vec![TokenKind::KwVoid]),
            _ => {
                self.unsupported(&specifier);
                None
            }
        }
    }

    /* ---------- statements ---------- */

    fn process_statement(&mut self, node: &AstNode) {
        let child = node.child(0).expect("statement has one child");
        match child.symbol_kind() {
            SymbolKind::LabeledStatement => self.unsupported(&child),
            SymbolKind::CompoundStatement => {
                self.process_compound_statement(&child);
            }
            SymbolKind::ExpressionStatement => self.process_expression_statement(&child),
            SymbolKind::SelectionStatement => self.process_selection_statement(&child),
            SymbolKind::IterationStatement => self.process_iteration_statement(&child),
            SymbolKind::JumpStatement => self.process_jump_statement(&child),
            _ => self.error(&child, "internal error: unrecognized statement form"),
        }
    }

    fn process_expression_statement(&mut self, node: &AstNode) {
        if node.child_count() > 1 {
            self.process_expression(&node.child(0).unwrap(), false);
        }
    }

    fn process_selection_statement(&mut self, node: &AstNode) {
        if node.child(0).unwrap().token_kind() == TokenKind::KwSwitch {
            self.unsupported(&node.child(0).unwrap());
            return;
        }

        let end_label = format!(".if_end_{}", self.next_label());
        self.process_expression(&node.child(2).unwrap(), false);

        let has_else = node.child_count() == 7;
        if has_else {
            let else_label = format!(".if_else_{}", self.next_label());
            self.emit(&format!("je {}", else_label));
            self.process_statement(&node.child(4).unwrap());
            self.emit(&format!("jmp {}", end_label));
            self.emit(&format!("label {}", else_label));
            self.process_statement(&node.child(6).unwrap());
        } else {
            self.emit(&format!("je {}", end_label));
            self.process_statement(&node.child(4).unwrap());
        }
        self.emit(&format!("label {}", end_label));
    }

    fn process_iteration_statement(&mut self, node: &AstNode) {
        let head = node.child(0).unwrap().token_kind();
        if head == TokenKind::KwWhile {
            // WHILE '(' expression ')' statement
            self.process_while_loop(&node.child(2).unwrap(), &node.child(4).unwrap());
        } else if head == TokenKind::KwDo {
            // DO statement WHILE '(' expression ')' ';'
            self.process_do_while_loop(&node.child(1).unwrap(), &node.child(4).unwrap());
        } else if node.child_count() == 6 {
            // FOR '(' init cond ')' statement
            self.process_for_loop(
                &node.child(2).unwrap(),
                &node.child(3).unwrap(),
                None,
                &node.child(5).unwrap(),
            );
        } else {
            // FOR '(' init cond step ')' statement
            self.process_for_loop(
                &node.child(2).unwrap(),
                &node.child(3).unwrap(),
                node.child(4).as_ref(),
                &node.child(6).unwrap(),
            );
        }
    }

    fn process_while_loop(&mut self, condition: &AstNode, body: &AstNode) {
        let label_id = self.next_label();
        let exp_label = format!(".while_loop_exp_{}", label_id);
        let stmt_label = format!(".while_loop_stmt_{}", label_id);
        let end_label = format!(".while_loop_end_{}", label_id);

        self.continue_targets.push(exp_label.clone());
        self.break_targets.push(end_label.clone());

        self.emit(&format!("label {}", exp_label));
        self.process_expression(condition, false);
        self.emit(&format!("je {}", end_label));
        self.emit(&format!("label {}", stmt_label));
        self.process_statement(body);
        self.emit(&format!("jmp {}", exp_label));
        self.emit(&format!("label {}", end_label));

        self.continue_targets.pop();
        self.break_targets.pop();
    }

    fn process_do_while_loop(&mut self, body: &AstNode, condition: &AstNode) {
        let label_id = self.next_label();
        let stmt_label = format!(".do_while_stmt_{}", label_id);
        let exp_label = format!(".do_while_exp_{}", label_id);
        let end_label = format!(".do_while_end_{}", label_id);

        self.continue_targets.push(exp_label.clone());
        self.break_targets.push(end_label.clone());

        self.emit(&format!("label {}", stmt_label));
        self.process_statement(body);
        self.emit(&format!("label {}", exp_label));
        self.process_expression(condition, false);
        self.emit(&format!("je {}", end_label));
        self.emit(&format!("jmp {}", stmt_label));
        self.emit(&format!("label {}", end_label));

        self.continue_targets.pop();
        self.break_targets.pop();
    }

    fn process_for_loop(
        &mut self,
        init: &AstNode,
        condition: &AstNode,
        step: Option<&AstNode>,
        body: &AstNode,
    ) {
        if init.symbol_kind() == SymbolKind::Declaration {
            // loop variables must be declared outside the header
            self.unsupported(init);
            return;
        }

        let label_id = self.next_label();
        let estmt_label = format!(".for_loop_estmt_{}", label_id);
        let exp_label = format!(".for_loop_exp_{}", label_id);
        let end_label = format!(".for_loop_end_{}", label_id);

        self.continue_targets.push(exp_label.clone());
        self.break_targets.push(end_label.clone());

        self.process_expression_statement(init);
        self.emit(&format!("label {}", estmt_label));
        self.process_expression_statement(condition);
        self.emit(&format!("je {}", end_label));
        self.process_statement(body);
        self.emit(&format!("label {}", exp_label));
        if let Some(step) = step {
            self.process_expression(step, false);
        }
        self.emit(&format!("jmp {}", estmt_label));
        self.emit(&format!("label {}", end_label));

        self.continue_targets.pop();
        self.break_targets.pop();
    }

    fn process_jump_statement(&mut self, node: &AstNode) {
        let head = node.child(0).unwrap();
        match head.token_kind() {
            TokenKind::KwGoto => {
                self.error(&head, "\"goto\" is not currently supported.");
            }
            TokenKind::KwContinue => match self.continue_targets.last().cloned() {
                Some(target) => self.emit(&format!("jmp {}", target)),
                None => self.error(&head, "nowhere to skip for \"continue\"."),
            },
            TokenKind::KwBreak => match self.break_targets.last().cloned() {
                Some(target) => self.emit(&format!("jmp {}", target)),
                None => self.error(&head, "nowhere to skip for \"break\"."),
            },
            TokenKind::KwReturn => {
                if node.child_count() == 3 {
                    self.process_expression(&node.child(1).unwrap(), false);
                }
                self.emit("ret");
            }
            _ => (),
        }
    }

    /* ---------- expressions ---------- */

    fn process_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_assignment_expression(&node.child(0).unwrap(), is_global);
        }
        let error_count = self.errors.len();
        self.process_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }
        self.process_assignment_expression(&node.child(2).unwrap(), is_global)
    }

    fn process_assignment_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_conditional_expression(&node.child(0).unwrap(), is_global);
        }
        if is_global {
            self.unsupported(node);
            return ExprValue::Rvalue;
        }

        let error_count = self.errors.len();
        let target = self.process_unary_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }
        let target = match target {
            ExprValue::Lvalue(lvalue) => lvalue,
            _ => {
                self.error(node, "cannot find symbol.");
                return ExprValue::Rvalue;
            }
        };

        let operator = node
            .child(1)
            .and_then(|op| op.child(0))
            .map(|t| t.token_kind())
            .unwrap_or(TokenKind::Unknown);

        self.process_assignment_expression(&node.child(2).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }

        match operator {
            TokenKind::Equal => {
                self.emit(&format!("mov {} vreg 0", target.ir_operand()));
                ExprValue::Rvalue
            }
            _ => {
                // compound assignment operators
                self.unsupported(&node.child(1).unwrap().child(0).unwrap());
                ExprValue::Rvalue
            }
        }
    }

    fn process_conditional_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        let error_count = self.errors.len();
        let condition = self.process_logical_or_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }
        if node.child_count() == 1 {
            return condition;
        }

        if is_global {
            let chosen = match condition {
                ExprValue::Constant(value) => value != 0,
                _ => false,
            };
            if chosen {
                self.process_expression(&node.child(2).unwrap(), is_global)
            } else {
                self.process_conditional_expression(&node.child(4).unwrap(), is_global)
            }
        } else {
            let label_id = self.next_label();
            let exit_label = format!(".con_exit_{}", label_id);
            let false_label = format!(".con_false_{}", label_id);

            self.emit(&format!("je {}", false_label));
            self.process_expression(&node.child(2).unwrap(), is_global);
            self.emit(&format!("jmp {}", exit_label));
            self.emit(&format!("label {}", false_label));
            self.process_conditional_expression(&node.child(4).unwrap(), is_global);
            self.emit(&format!("label {}", exit_label));
            ExprValue::Rvalue
        }
    }

    fn process_logical_or_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_logical_and_expression(&node.child(0).unwrap(), is_global);
        }
        let error_count = self.errors.len();
        let left = self.process_logical_or_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }

        if is_global {
            if let ExprValue::Constant(value) = left {
                if value != 0 {
                    return ExprValue::Constant(1);
                }
            }
            match self.process_logical_and_expression(&node.child(2).unwrap(), is_global) {
                ExprValue::Constant(value) => ExprValue::Constant((value != 0) as i64),
                other => other,
            }
        } else {
            let out_label = format!(".logical_or_out_{}", self.next_label());
            // short circuit: a non-zero left operand skips the right one
            self.emit(&format!("jne {}", out_label));
            self.process_logical_and_expression(&node.child(2).unwrap(), is_global);
            self.emit(&format!("label {}", out_label));
            ExprValue::Rvalue
        }
    }

    fn process_logical_and_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_inclusive_or_expression(&node.child(0).unwrap(), is_global);
        }
        let error_count = self.errors.len();
        let left = self.process_logical_and_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }

        if is_global {
            if let ExprValue::Constant(value) = left {
                if value == 0 {
                    return ExprValue::Constant(0);
                }
            }
            match self.process_inclusive_or_expression(&node.child(2).unwrap(), is_global) {
                ExprValue::Constant(value) => ExprValue::Constant((value != 0) as i64),
                other => other,
            }
        } else {
            let out_label = format!(".logical_and_out_{}", self.next_label());
            // short circuit: a zero left operand decides the result
            self.emit(&format!("je {}", out_label));
            self.process_inclusive_or_expression(&node.child(2).unwrap(), is_global);
            self.emit(&format!("label {}", out_label));
            ExprValue::Rvalue
        }
    }

    fn process_inclusive_or_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_exclusive_or_expression(&node.child(0).unwrap(), is_global);
        }
        if is_global {
            let left = self.process_inclusive_or_expression(&node.child(0).unwrap(), is_global);
            let right = self.process_exclusive_or_expression(&node.child(2).unwrap(), is_global);
            fold_binary(left, right, |a, b| a | b)
        } else {
            self.unsupported(node);
            ExprValue::Rvalue
        }
    }

    fn process_exclusive_or_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_and_expression(&node.child(0).unwrap(), is_global);
        }
        if is_global {
            let left = self.process_exclusive_or_expression(&node.child(0).unwrap(), is_global);
            let right = self.process_and_expression(&node.child(2).unwrap(), is_global);
            fold_binary(left, right, |a, b| a ^ b)
        } else {
            self.unsupported(node);
            ExprValue::Rvalue
        }
    }

    fn process_and_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_equality_expression(&node.child(0).unwrap(), is_global);
        }
        if is_global {
            let left = self.process_and_expression(&node.child(0).unwrap(), is_global);
            let right = self.process_equality_expression(&node.child(2).unwrap(), is_global);
            fold_binary(left, right, |a, b| a & b)
        } else {
            self.unsupported(node);
            ExprValue::Rvalue
        }
    }

    fn process_equality_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_relational_expression(&node.child(0).unwrap(), is_global);
        }
        let error_count = self.errors.len();
        let left = self.process_equality_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }
        let operator = node.child(1).unwrap().token_kind();

        if is_global {
            let right = self.process_relational_expression(&node.child(2).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            fold_binary(left, right, |a, b| {
                if operator == TokenKind::EqualEqual {
                    (a == b) as i64
                } else {
                    (a != b) as i64
                }
            })
        } else {
            self.emit("push 4 vreg 0");
            self.process_relational_expression(&node.child(2).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            self.emit("pop 4 vreg 1");
            let condition = if operator == TokenKind::EqualEqual {
                "eq"
            } else {
                "ne"
            };
            self.emit(&format!("cmp vreg 1 vreg 0 {}", condition));
            ExprValue::Rvalue
        }
    }

    fn process_relational_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_shift_expression(&node.child(0).unwrap(), is_global);
        }
        let error_count = self.errors.len();
        let left = self.process_relational_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }
        let operator = node.child(1).unwrap().token_kind();

        if is_global {
            let right = self.process_shift_expression(&node.child(2).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            fold_binary(left, right, |a, b| match operator {
                TokenKind::Less => (a < b) as i64,
                TokenKind::Greater => (a > b) as i64,
                TokenKind::LessEqual => (a <= b) as i64,
                _ => (a >= b) as i64,
            })
        } else {
            self.emit("push 4 vreg 0");
            self.process_shift_expression(&node.child(2).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            self.emit("pop 4 vreg 1");
            let condition = match operator {
                TokenKind::Less => "l",
                TokenKind::Greater => "g",
                TokenKind::LessEqual => "le",
                _ => "ge",
            };
            self.emit(&format!("cmp vreg 1 vreg 0 {}", condition));
            ExprValue::Rvalue
        }
    }

    fn process_shift_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() > 1 {
            self.unsupported(&node.child(1).unwrap());
            return ExprValue::Rvalue;
        }
        self.process_additive_expression(&node.child(0).unwrap(), is_global)
    }

    fn process_additive_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_multiplicative_expression(&node.child(0).unwrap(), is_global);
        }
        let error_count = self.errors.len();
        let left = self.process_additive_expression(&node.child(0).unwrap(), is_global);
        if self.errors.len() > error_count {
            return ExprValue::Rvalue;
        }
        let operator = node.child(1).unwrap().token_kind();

        if is_global {
            let right =
                self.process_multiplicative_expression(&node.child(2).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            fold_binary(left, right, |a, b| {
                if operator == TokenKind::Plus {
                    a.wrapping_add(b)
                } else {
                    a.wrapping_sub(b)
                }
            })
        } else {
            self.emit("push 4 vreg 0");
            self.process_multiplicative_expression(&node.child(2).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            self.emit("pop 4 vreg 1");
            if operator == TokenKind::Plus {
                self.emit("add vreg 1 vreg 0");
            } else {
                self.emit("sub vreg 1 vreg 0");
            }
            // the result sits in vreg 1; the accumulator is vreg 0
            self.emit("xchg vreg 0 vreg 1");
            ExprValue::Rvalue
        }
    }

    fn process_multiplicative_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_cast_expression(&node.child(0).unwrap(), is_global);
        }
        // * / % are not emitted
        self.unsupported(&node.child(1).unwrap());
        ExprValue::Rvalue
    }

    fn process_cast_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() > 1 {
            // '(' type_name ')' cast_expression: no conversion is performed
            return self.process_cast_expression(&node.child(3).unwrap(), is_global);
        }
        self.process_unary_expression(&node.child(0).unwrap(), is_global)
    }

    fn process_unary_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_postfix_expression(&node.child(0).unwrap(), is_global);
        }

        let head = node.child(0).unwrap();
        if head.is_terminal() {
            if head.token_kind() == TokenKind::KwSizeof {
                self.unsupported(&head);
                return ExprValue::Rvalue;
            }
            // prefix ++ / --
            if is_global {
                self.error(node, "cannot use ++/-- in global scope.");
                return ExprValue::Rvalue;
            }
            let error_count = self.errors.len();
            let operand = self.process_unary_expression(&node.child(1).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            let target = match operand {
                ExprValue::Lvalue(lvalue) => lvalue,
                _ => {
                    self.error(node, "cannot use ++/-- on constant value.");
                    return ExprValue::Rvalue;
                }
            };
            let operand_code = target.ir_operand();
            if head.token_kind() == TokenKind::PlusPlus {
                self.emit(&format!("add {} imm 1", operand_code));
            } else {
                self.emit(&format!("sub {} imm 1", operand_code));
            }
            self.emit(&format!("mov vreg 0 {}", operand_code));
            return ExprValue::Rvalue;
        }

        // unary_operator cast_expression
        let operator = head
            .child(0)
            .map(|t| t.token_kind())
            .unwrap_or(TokenKind::Unknown);
        if is_global {
            let error_count = self.errors.len();
            let operand = self.process_cast_expression(&node.child(1).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            let value = match operand {
                ExprValue::Constant(value) => value,
                _ => return ExprValue::Rvalue,
            };
            match operator {
                TokenKind::Plus => ExprValue::Constant(value),
                TokenKind::Minus => ExprValue::Constant(value.wrapping_neg()),
                TokenKind::Tilde => ExprValue::Constant(!value),
                TokenKind::Exclaim => ExprValue::Constant((value == 0) as i64),
                _ => {
                    // & and * need addresses
                    self.unsupported(&head);
                    ExprValue::Rvalue
                }
            }
        } else {
            self.unsupported(&head);
            ExprValue::Rvalue
        }
    }

    fn process_postfix_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 1 {
            return self.process_primary_expression(&node.child(0).unwrap(), is_global);
        }

        if node.child_count() == 2 {
            // postfix ++ / --
            let operator = node.child(1).unwrap().token_kind();
            let error_count = self.errors.len();
            let value = self.process_postfix_expression(&node.child(0).unwrap(), is_global);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            if is_global {
                self.error(
                    &node.child(0).unwrap(),
                    "cannot assign ++/-- in global scope.",
                );
                return ExprValue::Rvalue;
            }
            let target = match value {
                ExprValue::Lvalue(lvalue) => lvalue,
                _ => {
                    self.error(&node.child(0).unwrap(), "cannot assign ++/-- to constants.");
                    return ExprValue::Rvalue;
                }
            };
            let operand_code = target.ir_operand();
            // old value stays in vreg 0
            self.emit(&format!("mov vreg 0 {}", operand_code));
            if operator == TokenKind::PlusPlus {
                self.emit(&format!("add {} imm 1", operand_code));
            } else {
                self.emit(&format!("sub {} imm 1", operand_code));
            }
            return ExprValue::Rvalue;
        }

        if node.child(0).unwrap().is_terminal() {
            // '(' type_name ')' '{' initializer_list '}'
            self.unsupported(node);
            return ExprValue::Rvalue;
        }

        let after_head = node.child(1).unwrap().token_kind();
        if after_head == TokenKind::LSquare
            || after_head == TokenKind::Period
            || after_head == TokenKind::Arrow
        {
            self.unsupported(&node.child(1).unwrap());
            return ExprValue::Rvalue;
        }

        // postfix '(' ')' | postfix '(' argument_expression_list ')'
        self.process_function_call(node, is_global)
    }

    fn process_function_call(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if is_global {
            self.error(node, "cannot call functions in a global initializer.");
            return ExprValue::Rvalue;
        }

        let callee = node.child(0).unwrap();
        let name_node = match callee.first_terminal() {
            Some(terminal) if terminal.token_kind() == TokenKind::Identifier => terminal,
            _ => {
                self.unsupported(&callee);
                return ExprValue::Rvalue;
            }
        };
        let name = name_node.token().content.clone();

        let param_count = match self.global_table.get_function(&name) {
            Some(function) => function.params.len(),
            None => {
                self.error(&callee, format!("function not found: {}", name));
                return ExprValue::Rvalue;
            }
        };

        // rightmost argument first (cdecl)
        let mut arguments = vec![];
        if node.child_count() == 4 {
            let mut list = node.child(2).unwrap();
            while list.child_count() > 1 {
                arguments.push(list.child(2).unwrap());
                list = list.child(0).unwrap();
            }
            arguments.push(list.child(0).unwrap());
        }

        if arguments.len() != param_count {
            self.error(
                node,
                format!(
                    "call to {} passes {} arguments, expected {}",
                    name,
                    arguments.len(),
                    param_count
                ),
            );
            return ExprValue::Rvalue;
        }

        let error_count = self.errors.len();
        for argument in arguments.iter() {
            self.process_assignment_expression(argument, false);
            if self.errors.len() > error_count {
                return ExprValue::Rvalue;
            }
            self.emit("pushfc 4 vreg 0");
        }
        self.emit(&format!("call {}", name));
        // return value convention: vreg 0
        ExprValue::Rvalue
    }

    fn process_primary_expression(&mut self, node: &AstNode, is_global: bool) -> ExprValue {
        if node.child_count() == 3 {
            // '(' expression ')'
            return self.process_expression(&node.child(1).unwrap(), is_global);
        }

        let leaf = node.child(0).unwrap();
        match leaf.token_kind() {
            TokenKind::StringLiteral => {
                self.unsupported(&leaf);
                ExprValue::Rvalue
            }
            TokenKind::Identifier => {
                let name = leaf.token().content.clone();
                if is_global {
                    self.error(
                        &leaf,
                        format!(
                            "cannot use variable to init value in global scope. ({})",
                            name
                        ),
                    );
                    return ExprValue::Rvalue;
                }

                if let Some(var_id) = self
                    .current_block()
                    .and_then(|block| block.get_by_name(&name, true, &self.live_blocks))
                {
                    self.emit(&format!("mov vreg 0 val {}", var_id));
                    return ExprValue::Lvalue(LvalueRef::Local(var_id));
                }

                let param = self
                    .current_function
                    .as_ref()
                    .and_then(|f| self.global_table.get_function(f))
                    .and_then(|f| f.find_param(&name))
                    .cloned();
                if let Some(param) = param {
                    if param.value_type != ValueType::S32 {
                        self.error(&leaf, "only support int32.");
                        return ExprValue::Rvalue;
                    }
                    self.emit(&format!("mov vreg 0 fval {}", name));
                    return ExprValue::Lvalue(LvalueRef::Param(name));
                }

                if self.global_table.get_variable(&name).is_some() {
                    self.emit(&format!("mov vreg 0 val {}", name));
                    return ExprValue::Lvalue(LvalueRef::Global(name));
                }

                self.error(&leaf, format!("symbol not found: {}", name));
                ExprValue::Rvalue
            }
            _ => {
                // numeric constant (floats never reach here)
                let value = match parse_integer(&leaf.token().content) {
                    Some(value) => value,
                    None => {
                        self.error(&leaf, "cannot parse constant.");
                        return ExprValue::Rvalue;
                    }
                };
                if is_global {
                    ExprValue::Constant(value)
                } else {
                    self.emit(&format!("mov vreg 0 imm {}", value));
                    ExprValue::Rvalue
                }
            }
        }
    }
}

fn fold_binary(left: ExprValue, right: ExprValue, op: impl Fn(i64, i64) -> i64) -> ExprValue {
    match (left, right) {
        (ExprValue::Constant(a), ExprValue::Constant(b)) => ExprValue::Constant(op(a, b)),
        _ => ExprValue::Rvalue,
    }
}

/// Integer literal in the forms the lexer classifies as numeric: decimal,
/// `0x` hex and leading-zero octal.
fn parse_integer(text: &str) -> Option<i64> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).ok();
    }
    if text.len() > 1 && text.starts_with('0') {
        return i64::from_str_radix(&text[1..], 8).ok();
    }
    text.parse::<i64>().ok()
}
