// Copyright 2023 ToyCC contributors

//! Symbol tables for TCIR generation and re-reading.
//!
//! Ownership: the [`VariableDescriptionTable`] owns every block-local
//! variable of a translation unit; [`BlockSymbolTable`]s hold ids into it.
//! The [`GlobalSymbolTable`] owns functions and global variables. Blocks
//! reference each other by id; the root block has no parent.

use crate::scan::Scanner;
use crate::tcir::value_type::ValueType;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

pub type VarId = i32;
pub type BlockId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolVisibility {
    /// Like `static`.
    Internal,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSymbol {
    pub id: VarId,
    pub name: String,
    pub bytes: usize,
    pub value_type: ValueType,
    pub visibility: SymbolVisibility,
    pub init_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParamSymbol {
    pub name: String,
    pub value_type: ValueType,
    pub is_pointer: bool,
    /// The `...` marker.
    pub is_va_list: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub return_type: ValueType,
    pub is_imported: bool,
    pub visibility: SymbolVisibility,
    pub params: Vec<FunctionParamSymbol>,
    /// Block-symtab id of the function body; 0 when the body declares no
    /// locals (block ids start at 1).
    pub root_block_id: BlockId,
}

impl FunctionSymbol {
    pub fn find_param(&self, name: &str) -> Option<&FunctionParamSymbol> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn find_param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|param| param.name == name)
    }

    /// Stack bytes the caller pushes for a call to this function.
    pub fn param_stack_bytes(&self) -> usize {
        self.params.len() * 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymtabError {
    BadToken(String),
    BadInteger(String),
    UnknownValueType(String),
    UnexpectedEof,
}

impl fmt::Display for SymtabError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SymtabError::BadToken(token) => write!(f, "bad token \"{}\"", token),
            SymtabError::BadInteger(token) => write!(f, "expected an integer, got \"{}\"", token),
            SymtabError::UnknownValueType(token) => write!(f, "unknown value type \"{}\"", token),
            SymtabError::UnexpectedEof => write!(f, "symbol table record ended early"),
        }
    }
}

impl std::error::Error for SymtabError {}

/// Owning container for all block-local variables of a translation unit.
#[derive(Debug, Default)]
pub struct VariableDescriptionTable {
    symbols: BTreeMap<VarId, VariableSymbol>,
}

impl VariableDescriptionTable {
    pub fn put(&mut self, symbol: VariableSymbol) {
        self.symbols.insert(symbol.id, symbol);
    }

    pub fn get(&self, id: VarId) -> Option<&VariableSymbol> {
        self.symbols.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VarId, &VariableSymbol)> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

/// Global function and variable symbols.
#[derive(Debug, Default)]
pub struct GlobalSymbolTable {
    pub functions: BTreeMap<String, FunctionSymbol>,
    pub variables: BTreeMap<String, VariableSymbol>,
}

impl GlobalSymbolTable {
    pub fn get_function(&self, name: &str) -> Option<&FunctionSymbol> {
        self.functions.get(name)
    }

    pub fn get_variable(&self, name: &str) -> Option<&VariableSymbol> {
        self.variables.get(name)
    }

    pub fn put_function(&mut self, symbol: FunctionSymbol) {
        self.functions.insert(symbol.name.clone(), symbol);
    }

    pub fn put_variable(&mut self, symbol: VariableSymbol) {
        self.variables.insert(symbol.name.clone(), symbol);
    }

    pub fn clear(&mut self) {
        self.functions.clear();
        self.variables.clear();
    }

    /// Write the `global-symtab` section body: function signatures first,
    /// then every block-local from the description table.
    pub fn dump<W: Write>(
        &self,
        writer: &mut W,
        desc_table: &VariableDescriptionTable,
    ) -> io::Result<()> {
        for (name, function) in self.functions.iter() {
            writeln!(
                writer,
                "fun {} {} {} {} {}",
                match function.visibility {
                    SymbolVisibility::Global => "visible",
                    SymbolVisibility::Internal => "internal",
                },
                name,
                function.params.len(),
                function.return_type.name(),
                function.root_block_id,
            )?;
            for param in function.params.iter() {
                writeln!(
                    writer,
                    "  {} {} {}",
                    param.value_type.name(),
                    if param.is_pointer { "ptr" } else { "value" },
                    param.name,
                )?;
            }
        }
        for (id, symbol) in desc_table.iter() {
            writeln!(
                writer,
                "var {} {} {} {}",
                id,
                symbol.name,
                symbol.value_type.name(),
                symbol.bytes,
            )?;
        }
        Ok(())
    }

    /// Parse a `global-symtab` section body back into tables.
    pub fn build(body: &str) -> Result<(GlobalSymbolTable, VariableDescriptionTable), SymtabError> {
        let mut table = GlobalSymbolTable::default();
        let mut desc_table = VariableDescriptionTable::default();
        let mut scanner = Scanner::new(body);
        while let Some(record) = scanner.next_token() {
            match record {
                "fun" => {
                    let visibility = match next(&mut scanner)? {
                        "visible" => SymbolVisibility::Global,
                        "internal" => SymbolVisibility::Internal,
                        other => return Err(SymtabError::BadToken(other.to_string())),
                    };
                    let name = next(&mut scanner)?.to_string();
                    let argc = next_int(&mut scanner)?;
                    let return_type = next_value_type(&mut scanner)?;
                    let root_block_id = next_int(&mut scanner)?;
                    let mut params = vec![];
                    for _ in 0..argc {
                        let value_type = next_value_type(&mut scanner)?;
                        let is_pointer = match next(&mut scanner)? {
                            "ptr" => true,
                            "value" => false,
                            other => return Err(SymtabError::BadToken(other.to_string())),
                        };
                        let param_name = next(&mut scanner)?.to_string();
                        params.push(FunctionParamSymbol {
                            name: param_name,
                            value_type,
                            is_pointer,
                            is_va_list: false,
                        });
                    }
                    table.put_function(FunctionSymbol {
                        name,
                        return_type,
                        is_imported: false,
                        visibility: SymbolVisibility::Global,
                        params,
                        root_block_id,
                    });
                }
                "var" => {
                    let id = next_int(&mut scanner)?;
                    let name = next(&mut scanner)?.to_string();
                    let value_type = next_value_type(&mut scanner)?;
                    let bytes = next_int(&mut scanner)? as usize;
                    desc_table.put(VariableSymbol {
                        id,
                        name,
                        bytes,
                        value_type,
                        visibility: SymbolVisibility::Internal,
                        init_value: 0,
                    });
                }
                other => return Err(SymtabError::BadToken(other.to_string())),
            }
        }
        Ok((table, desc_table))
    }
}

/// Per-scope record of local variables. Symbol ids within a table are
/// strictly increasing, which allows binary search by id.
#[derive(Debug, Default)]
pub struct BlockSymbolTable {
    pub id: BlockId,
    pub parent_id: Option<BlockId>,
    pub children: Vec<BlockId>,
    symbols: Vec<VarId>,
    name_index: BTreeMap<String, VarId>,
}

impl BlockSymbolTable {
    pub fn new(id: BlockId, parent_id: Option<BlockId>) -> Self {
        Self {
            id,
            parent_id,
            children: vec![],
            symbols: vec![],
            name_index: BTreeMap::new(),
        }
    }

    pub fn symbol_ids(&self) -> &[VarId] {
        &self.symbols
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Register a variable here and hand its ownership to the description
    /// table.
    pub fn put(&mut self, symbol: VariableSymbol, desc_table: &mut VariableDescriptionTable) {
        debug_assert!(
            self.symbols.last().map_or(true, |&last| last < symbol.id),
            "symbol ids must be strictly increasing within a block"
        );
        self.symbols.push(symbol.id);
        self.name_index.insert(symbol.name.clone(), symbol.id);
        desc_table.put(symbol);
    }

    fn local_by_name(&self, name: &str) -> Option<VarId> {
        self.name_index.get(name).copied()
    }

    fn local_by_id(&self, id: VarId) -> Option<VarId> {
        self.symbols.binary_search(&id).ok().map(|idx| self.symbols[idx])
    }

    /// Name lookup, optionally walking up the parent chain.
    pub fn get_by_name(
        &self,
        name: &str,
        allow_from_parents: bool,
        blocks: &BTreeMap<BlockId, BlockSymbolTable>,
    ) -> Option<VarId> {
        if let Some(id) = self.local_by_name(name) {
            return Some(id);
        }
        if !allow_from_parents {
            return None;
        }
        let mut parent_id = self.parent_id;
        while let Some(id) = parent_id {
            let block = blocks.get(&id)?;
            if let Some(found) = block.local_by_name(name) {
                return Some(found);
            }
            parent_id = block.parent_id;
        }
        None
    }

    /// Id lookup, optionally walking up the parent chain.
    pub fn get_by_id(
        &self,
        var_id: VarId,
        allow_from_parents: bool,
        blocks: &BTreeMap<BlockId, BlockSymbolTable>,
    ) -> Option<VarId> {
        if let Some(id) = self.local_by_id(var_id) {
            return Some(id);
        }
        if !allow_from_parents {
            return None;
        }
        let mut parent_id = self.parent_id;
        while let Some(id) = parent_id {
            let block = blocks.get(&id)?;
            if let Some(found) = block.local_by_id(var_id) {
                return Some(found);
            }
            parent_id = block.parent_id;
        }
        None
    }

    /// Write one `% begin ... % end` record. The root block prints its own
    /// id as `parent-tab-id`, which is how the text format marks a root.
    pub fn dump<W: Write>(
        &self,
        writer: &mut W,
        desc_table: &VariableDescriptionTable,
    ) -> io::Result<()> {
        writeln!(writer, "% begin")?;
        writeln!(writer, "tab-id {}", self.id)?;
        writeln!(writer, "parent-tab-id {}", self.parent_id.unwrap_or(self.id))?;
        for &var_id in self.symbols.iter() {
            if let Some(symbol) = desc_table.get(var_id) {
                writeln!(
                    writer,
                    "var {} {} {} {}",
                    symbol.id,
                    symbol.name,
                    symbol.value_type.name(),
                    symbol.bytes,
                )?;
            }
        }
        writeln!(writer, "% end")?;
        Ok(())
    }

    /// Parse a `block-symtab` section body: a sequence of `% begin`/`% end`
    /// records. Parent/child links are wired afterwards from the recorded
    /// ids.
    pub fn build(
        body: &str,
        desc_table: &mut VariableDescriptionTable,
    ) -> Result<BTreeMap<BlockId, BlockSymbolTable>, SymtabError> {
        let mut blocks: BTreeMap<BlockId, BlockSymbolTable> = BTreeMap::new();
        let mut parent_of: BTreeMap<BlockId, BlockId> = BTreeMap::new();
        let mut scanner = Scanner::new(body);
        while let Some(marker) = scanner.next_token() {
            if marker != "%" {
                return Err(SymtabError::BadToken(marker.to_string()));
            }
            match next(&mut scanner)? {
                "begin" => (),
                other => return Err(SymtabError::BadToken(other.to_string())),
            }
            let mut block = BlockSymbolTable::default();
            loop {
                match next(&mut scanner)? {
                    "%" => {
                        // the closing "end"
                        next(&mut scanner)?;
                        break;
                    }
                    "tab-id" => block.id = next_int(&mut scanner)?,
                    "parent-tab-id" => {
                        parent_of.insert(block.id, next_int(&mut scanner)?);
                    }
                    "var" => {
                        let id = next_int(&mut scanner)?;
                        let name = next(&mut scanner)?.to_string();
                        let value_type = next_value_type(&mut scanner)?;
                        let bytes = next_int(&mut scanner)? as usize;
                        block.put(
                            VariableSymbol {
                                id,
                                name,
                                bytes,
                                value_type,
                                visibility: SymbolVisibility::Internal,
                                init_value: 0,
                            },
                            desc_table,
                        );
                    }
                    other => return Err(SymtabError::BadToken(other.to_string())),
                }
            }
            blocks.insert(block.id, block);
        }

        let ids: Vec<BlockId> = blocks.keys().copied().collect();
        for id in ids {
            let parent = parent_of.get(&id).copied().unwrap_or(id);
            if parent != id {
                if let Some(block) = blocks.get_mut(&id) {
                    block.parent_id = Some(parent);
                }
                if let Some(parent_block) = blocks.get_mut(&parent) {
                    parent_block.children.push(id);
                }
            }
        }
        Ok(blocks)
    }
}

fn next<'a>(scanner: &mut Scanner<'a>) -> Result<&'a str, SymtabError> {
    scanner.next_token().ok_or(SymtabError::UnexpectedEof)
}

fn next_int(scanner: &mut Scanner) -> Result<i32, SymtabError> {
    let token = next(scanner)?;
    token
        .parse::<i32>()
        .map_err(|_| SymtabError::BadInteger(token.to_string()))
}

fn next_value_type(scanner: &mut Scanner) -> Result<ValueType, SymtabError> {
    let token = next(scanner)?;
    ValueType::of_name(token).ok_or_else(|| SymtabError::UnknownValueType(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(id: VarId, name: &str) -> VariableSymbol {
        VariableSymbol {
            id,
            name: name.to_string(),
            bytes: 4,
            value_type: ValueType::S32,
            visibility: SymbolVisibility::Internal,
            init_value: 0,
        }
    }

    #[test]
    fn scope_lookup_walks_parents_only_when_allowed() {
        let mut desc = VariableDescriptionTable::default();
        let mut blocks = BTreeMap::new();

        let mut outer = BlockSymbolTable::new(1, None);
        outer.put(local(1, "n"), &mut desc);
        blocks.insert(1, outer);

        let mut inner = BlockSymbolTable::new(2, Some(1));
        inner.put(local(2, "tmp"), &mut desc);
        blocks.insert(2, inner);

        let inner = &blocks[&2];
        assert_eq!(inner.get_by_name("tmp", false, &blocks), Some(2));
        assert_eq!(inner.get_by_name("n", false, &blocks), None);
        assert_eq!(inner.get_by_name("n", true, &blocks), Some(1));
        assert_eq!(inner.get_by_name("missing", true, &blocks), None);

        assert_eq!(inner.get_by_id(1, true, &blocks), Some(1));
        assert_eq!(inner.get_by_id(1, false, &blocks), None);
    }

    #[test]
    fn id_lookup_uses_the_increasing_order() {
        let mut desc = VariableDescriptionTable::default();
        let mut block = BlockSymbolTable::new(1, None);
        for id in &[2, 5, 9, 14] {
            block.put(local(*id, &format!("v{}", id)), &mut desc);
        }
        let blocks = BTreeMap::new();
        assert_eq!(block.get_by_id(9, false, &blocks), Some(9));
        assert_eq!(block.get_by_id(3, false, &blocks), None);
    }

    #[test]
    fn block_records_round_trip() {
        let mut desc = VariableDescriptionTable::default();
        let mut root = BlockSymbolTable::new(1, None);
        root.put(local(1, "a"), &mut desc);
        let mut child = BlockSymbolTable::new(2, Some(1));
        child.put(local(2, "b"), &mut desc);

        let mut text = Vec::new();
        root.dump(&mut text, &desc).unwrap();
        child.dump(&mut text, &desc).unwrap();
        let text = String::from_utf8(text).unwrap();

        let mut rebuilt_desc = VariableDescriptionTable::default();
        let blocks = BlockSymbolTable::build(&text, &mut rebuilt_desc).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[&1].parent_id, None);
        assert_eq!(blocks[&2].parent_id, Some(1));
        assert_eq!(blocks[&1].children, vec![2]);
        assert_eq!(rebuilt_desc.get(2).unwrap().name, "b");
        assert_eq!(rebuilt_desc.get(1).unwrap().bytes, 4);
    }

    #[test]
    fn global_symtab_round_trip() {
        let mut table = GlobalSymbolTable::default();
        table.put_function(FunctionSymbol {
            name: "f".to_string(),
            return_type: ValueType::S32,
            is_imported: false,
            visibility: SymbolVisibility::Global,
            params: vec![FunctionParamSymbol {
                name: "a".to_string(),
                value_type: ValueType::S32,
                is_pointer: false,
                is_va_list: false,
            }],
            root_block_id: 1,
        });
        let mut desc = VariableDescriptionTable::default();
        desc.put(local(1, "x"));

        let mut text = Vec::new();
        table.dump(&mut text, &desc).unwrap();
        let text = String::from_utf8(text).unwrap();

        let (rebuilt, rebuilt_desc) = GlobalSymbolTable::build(&text).unwrap();
        let function = rebuilt.get_function("f").unwrap();
        assert_eq!(function.params.len(), 1);
        assert_eq!(function.params[0].name, "a");
        assert_eq!(function.root_block_id, 1);
        assert_eq!(function.find_param_index("a"), Some(0));
        assert_eq!(rebuilt_desc.get(1).unwrap().name, "x");
    }

    #[test]
    fn malformed_records_are_rejected() {
        let mut desc = VariableDescriptionTable::default();
        assert!(BlockSymbolTable::build("junk\n", &mut desc).is_err());
        assert!(GlobalSymbolTable::build("fun visible f one s32 0\n").is_err());
    }
}
