// Copyright 2023 ToyCC contributors

//! The TCIR layer: instruction container, symbol tables and the generator
//! that lowers an AST into the five-section textual IR.

pub mod generator;
pub mod ir;
pub mod symtab;
pub mod value_type;

pub use generator::{IrDiagnostic, IrGenerator};
pub use ir::{split_sections, IrFormatError, IrInstruction};
pub use symtab::{
    BlockId, BlockSymbolTable, FunctionParamSymbol, FunctionSymbol, GlobalSymbolTable,
    SymbolVisibility, SymtabError, VarId, VariableDescriptionTable, VariableSymbol,
};
pub use value_type::ValueType;
