// Copyright 2023 ToyCC contributors

//! Grammar model: symbols, expressions and flattened productions.
//!
//! Symbols are value objects stored in index-keyed lists; every cross
//! reference between grammar structures is a plain id, never a pointer into
//! a vector.

use crate::token::TokenKind;

pub type SymbolId = usize;
pub type ExpressionId = usize;
pub type ProductionId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolType {
    /// `A -> b (C)`
    NonTerminal,
    /// `A -> (b) C`
    Terminal,
}

macro_rules! symbol_kinds {
    ( $( $variant:ident => $name:expr, )+ ) => {
        /// Classification of a non-terminal by its grammar name. The TCIR
        /// emitter dispatches on this instead of comparing name strings.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum SymbolKind {
            Unknown,
            $( $variant, )+
        }

        impl SymbolKind {
            const ALL: &'static [SymbolKind] = &[ SymbolKind::Unknown, $( SymbolKind::$variant, )+ ];

            pub fn of_name(name: &str) -> SymbolKind {
                match name {
                    $( $name => SymbolKind::$variant, )+
                    _ => SymbolKind::Unknown,
                }
            }

            pub fn from_u32(value: u32) -> Option<SymbolKind> {
                SymbolKind::ALL.get(value as usize).copied()
            }
        }
    };
}

symbol_kinds! {
    TranslationUnit => "translation_unit",
    ExternalDeclaration => "external_declaration",
    FunctionDefinition => "function_definition",
    Declaration => "declaration",
    DeclarationSpecifiers => "declaration_specifiers",
    TypeSpecifier => "type_specifier",
    InitDeclaratorList => "init_declarator_list",
    InitDeclarator => "init_declarator",
    Declarator => "declarator",
    DirectDeclarator => "direct_declarator",
    Pointer => "pointer",
    ParameterTypeList => "parameter_type_list",
    ParameterList => "parameter_list",
    ParameterDeclaration => "parameter_declaration",
    AbstractDeclarator => "abstract_declarator",
    Initializer => "initializer",
    InitializerList => "initializer_list",
    Statement => "statement",
    LabeledStatement => "labeled_statement",
    CompoundStatement => "compound_statement",
    BlockItemList => "block_item_list",
    BlockItem => "block_item",
    ExpressionStatement => "expression_statement",
    SelectionStatement => "selection_statement",
    IterationStatement => "iteration_statement",
    JumpStatement => "jump_statement",
    Expression => "expression",
    AssignmentExpression => "assignment_expression",
    AssignmentOperator => "assignment_operator",
    ConditionalExpression => "conditional_expression",
    ConstantExpression => "constant_expression",
    LogicalOrExpression => "logical_or_expression",
    LogicalAndExpression => "logical_and_expression",
    InclusiveOrExpression => "inclusive_or_expression",
    ExclusiveOrExpression => "exclusive_or_expression",
    AndExpression => "and_expression",
    EqualityExpression => "equality_expression",
    RelationalExpression => "relational_expression",
    ShiftExpression => "shift_expression",
    AdditiveExpression => "additive_expression",
    MultiplicativeExpression => "multiplicative_expression",
    CastExpression => "cast_expression",
    UnaryExpression => "unary_expression",
    UnaryOperator => "unary_operator",
    PostfixExpression => "postfix_expression",
    PrimaryExpression => "primary_expression",
    ArgumentExpressionList => "argument_expression_list",
    TypeName => "type_name",
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub symbol_type: SymbolType,
    /// Meaningful only for terminals.
    pub token_kind: TokenKind,
    /// Meaningful only for non-terminals.
    pub symbol_kind: SymbolKind,
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        self.symbol_type == SymbolType::Terminal
    }

    pub fn is_non_terminal(&self) -> bool {
        self.symbol_type == SymbolType::NonTerminal
    }
}

impl PartialEq for Symbol {
    /// Equal when the ids match; otherwise compared structurally.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            || (self.name == other.name
                && self.symbol_type == other.symbol_type
                && self.token_kind == other.token_kind)
    }
}

impl Eq for Symbol {}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One grammar rule with alternatives:
/// `target -> rules[0][0] rules[0][1] ... | rules[1][0] ...`
#[derive(Debug, Clone)]
pub struct Expression {
    pub id: ExpressionId,
    pub target_symbol_id: SymbolId,
    pub rules: Vec<Vec<SymbolId>>,
}

/// A single alternative of a single non-terminal, indexed independently.
/// Empty right-hand sides are disallowed by the grammar loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatProduction {
    pub id: ProductionId,
    pub target_symbol_id: SymbolId,
    pub rhs: Vec<SymbolId>,
}

#[derive(Debug, Clone, Default)]
pub struct Grammar {
    pub symbols: Vec<Symbol>,
    pub entry_symbol_id: SymbolId,
    pub expressions: Vec<Expression>,
}

impl Grammar {
    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: SymbolId, name: &str, symbol_type: SymbolType) -> Symbol {
        Symbol {
            id,
            name: name.to_string(),
            symbol_type,
            token_kind: TokenKind::Unknown,
            symbol_kind: SymbolKind::of_name(name),
        }
    }

    #[test]
    fn equality_is_by_id_then_structural() {
        let a = symbol(0, "statement", SymbolType::NonTerminal);
        let b = symbol(0, "renamed", SymbolType::NonTerminal);
        assert_eq!(a, b); // same id wins

        let c = symbol(1, "statement", SymbolType::NonTerminal);
        assert_eq!(a, c); // structurally identical

        let d = symbol(2, "statement", SymbolType::Terminal);
        assert_ne!(a, d);
    }

    #[test]
    fn symbol_kinds_resolve_from_grammar_names() {
        assert_eq!(
            SymbolKind::of_name("iteration_statement"),
            SymbolKind::IterationStatement
        );
        assert_eq!(SymbolKind::of_name("IDENTIFIER"), SymbolKind::Unknown);
    }

    #[test]
    fn symbol_kind_u32_round_trip() {
        let kind = SymbolKind::of_name("jump_statement");
        assert_eq!(SymbolKind::from_u32(kind as u32), Some(kind));
        assert_eq!(SymbolKind::from_u32(9999), None);
    }
}
