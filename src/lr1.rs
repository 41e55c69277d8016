// Copyright 2023 ToyCC contributors

//! Canonical LR(1) construction: flat productions, FIRST sets, item-set
//! closure, GOTO and the Action/Goto table.
//!
//! The grammar handed in must be free of empty right-hand sides (the loader
//! guarantees this), which keeps FIRST computation to a union over the first
//! symbol of every alternative.

use crate::grammar::{
    FlatProduction, Grammar, ProductionId, Symbol, SymbolId, SymbolKind, SymbolType,
};
use crate::table::{ParserCommand, ParserTable};
use crate::token::TokenKind;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `[A -> alpha . beta, a]`, by ids. Items are value objects; equality and
/// ordering ignore identity entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lr1Item {
    pub production_id: ProductionId,
    pub dot_pos: usize,
    pub lookahead_id: SymbolId,
}

impl Lr1Item {
    fn shifted(self) -> Self {
        Lr1Item {
            production_id: self.production_id,
            dot_pos: self.dot_pos + 1,
            lookahead_id: self.lookahead_id,
        }
    }
}

/// A state of the automaton: its kernel and the closed item set. Two states
/// are the same exactly when their kernels coincide (the closure is a
/// function of the kernel), which matches whole-item-set equality.
#[derive(Debug, Clone)]
pub struct Lr1State {
    pub id: usize,
    pub kernel: BTreeSet<Lr1Item>,
    pub items: BTreeSet<Lr1Item>,
}

#[derive(Debug)]
pub struct Lr1Builder {
    symbols: Vec<Symbol>,
    productions: Vec<FlatProduction>,
    productions_of: HashMap<SymbolId, Vec<ProductionId>>,
    first_sets: HashMap<SymbolId, BTreeSet<SymbolId>>,
    states: Vec<Lr1State>,
    transitions: BTreeMap<(usize, SymbolId), usize>,
    entry_symbol_id: SymbolId,
    eof_symbol_id: SymbolId,
    entry_production_id: ProductionId,
}

impl Lr1Builder {
    pub fn new(grammar: &Grammar) -> Self {
        let mut builder = Lr1Builder {
            symbols: grammar.symbols.clone(),
            productions: vec![],
            productions_of: HashMap::new(),
            first_sets: HashMap::new(),
            states: vec![],
            transitions: BTreeMap::new(),
            entry_symbol_id: 0,
            eof_symbol_id: 0,
            entry_production_id: 0,
        };
        builder.extract_flat_productions(grammar);
        builder.extend_grammar(grammar.entry_symbol_id);
        builder.make_eof_symbol();
        builder.construct_first_sets();
        builder.construct_states();
        debug!(
            "LR(1) construction: {} productions, {} states",
            builder.productions.len(),
            builder.states.len()
        );
        builder
    }

    pub fn states(&self) -> &[Lr1State] {
        &self.states
    }

    pub fn transitions(&self) -> &BTreeMap<(usize, SymbolId), usize> {
        &self.transitions
    }

    pub fn first_set(&self, symbol_id: SymbolId) -> Option<&BTreeSet<SymbolId>> {
        self.first_sets.get(&symbol_id)
    }

    pub fn eof_symbol_id(&self) -> SymbolId {
        self.eof_symbol_id
    }

    /// `A -> a | b` becomes two flat productions with the same target.
    fn extract_flat_productions(&mut self, grammar: &Grammar) {
        for expression in grammar.expressions.iter() {
            for rule in expression.rules.iter() {
                let id = self.productions.len();
                self.productions.push(FlatProduction {
                    id,
                    target_symbol_id: expression.target_symbol_id,
                    rhs: rule.clone(),
                });
                self.productions_of
                    .entry(expression.target_symbol_id)
                    .or_insert_with(Vec::new)
                    .push(id);
            }
        }
    }

    /// Augment with a fresh start symbol and `S' -> S`.
    fn extend_grammar(&mut self, grammar_entry: SymbolId) {
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            id,
            name: "__lr1_entry__".to_string(),
            symbol_type: SymbolType::NonTerminal,
            token_kind: TokenKind::Unknown,
            symbol_kind: SymbolKind::Unknown,
        });
        let production_id = self.productions.len();
        self.productions.push(FlatProduction {
            id: production_id,
            target_symbol_id: id,
            rhs: vec![grammar_entry],
        });
        self.productions_of.insert(id, vec![production_id]);
        self.entry_symbol_id = id;
        self.entry_production_id = production_id;
    }

    fn make_eof_symbol(&mut self) {
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            id,
            name: "<eof>".to_string(),
            symbol_type: SymbolType::Terminal,
            token_kind: TokenKind::Eof,
            symbol_kind: SymbolKind::Unknown,
        });
        self.eof_symbol_id = id;
    }

    /// Iterative fixpoint. FIRST of a terminal is itself; FIRST of a
    /// non-terminal is the union over the first symbol of each alternative.
    fn construct_first_sets(&mut self) {
        for symbol in self.symbols.iter() {
            if symbol.symbol_type == SymbolType::Terminal {
                let mut set = BTreeSet::new();
                set.insert(symbol.id);
                self.first_sets.insert(symbol.id, set);
            } else {
                self.first_sets.insert(symbol.id, BTreeSet::new());
            }
        }
        let mut updated = true;
        while updated {
            updated = false;
            for production in self.productions.iter() {
                let first_symbol = match production.rhs.first() {
                    Some(&symbol_id) => symbol_id,
                    None => continue,
                };
                let additions: Vec<SymbolId> = self.first_sets[&first_symbol]
                    .iter()
                    .copied()
                    .collect();
                let target_set = self
                    .first_sets
                    .get_mut(&production.target_symbol_id)
                    .expect("all symbols seeded");
                for symbol_id in additions {
                    updated |= target_set.insert(symbol_id);
                }
            }
        }
    }

    /// Close an item set: for `[A -> alpha . B beta, a]` add `[B -> . gamma, b]`
    /// for every production of B and every `b` in FIRST(beta a). Deduplication
    /// key is (production, lookahead); added items always have dot 0.
    fn closure(&self, kernel: &BTreeSet<Lr1Item>) -> BTreeSet<Lr1Item> {
        let mut items = kernel.clone();
        let mut work: Vec<Lr1Item> = items.iter().copied().collect();
        while let Some(item) = work.pop() {
            let production = &self.productions[item.production_id];
            let next_symbol_id = match production.rhs.get(item.dot_pos) {
                Some(&symbol_id) => symbol_id,
                None => continue, // reduce item
            };
            if self.symbols[next_symbol_id].is_terminal() {
                continue;
            }
            let lookaheads: Vec<SymbolId> = match production.rhs.get(item.dot_pos + 1) {
                Some(beta_first) => self.first_sets[beta_first].iter().copied().collect(),
                None => vec![item.lookahead_id],
            };
            if let Some(expansions) = self.productions_of.get(&next_symbol_id) {
                for &production_id in expansions {
                    for &lookahead_id in lookaheads.iter() {
                        let new_item = Lr1Item {
                            production_id,
                            dot_pos: 0,
                            lookahead_id,
                        };
                        if items.insert(new_item) {
                            work.push(new_item);
                        }
                    }
                }
            }
        }
        items
    }

    /// Build the state set from state 0 = closure of `[S' -> . S, $]`,
    /// following GOTO over every symbol that appears after a dot.
    fn construct_states(&mut self) {
        let mut start_kernel = BTreeSet::new();
        start_kernel.insert(Lr1Item {
            production_id: self.entry_production_id,
            dot_pos: 0,
            lookahead_id: self.eof_symbol_id,
        });
        let mut kernel_index: HashMap<BTreeSet<Lr1Item>, usize> = HashMap::new();
        kernel_index.insert(start_kernel.clone(), 0);
        self.states.push(Lr1State {
            id: 0,
            kernel: start_kernel.clone(),
            items: self.closure(&start_kernel),
        });

        let mut current = 0;
        while current < self.states.len() {
            let mut goto_kernels: BTreeMap<SymbolId, BTreeSet<Lr1Item>> = BTreeMap::new();
            for item in self.states[current].items.iter() {
                let production = &self.productions[item.production_id];
                if let Some(&next_symbol_id) = production.rhs.get(item.dot_pos) {
                    goto_kernels
                        .entry(next_symbol_id)
                        .or_insert_with(BTreeSet::new)
                        .insert(item.shifted());
                }
            }
            for (symbol_id, kernel) in goto_kernels {
                let target = match kernel_index.get(&kernel) {
                    Some(&existing) => existing,
                    None => {
                        let id = self.states.len();
                        kernel_index.insert(kernel.clone(), id);
                        let items = self.closure(&kernel);
                        self.states.push(Lr1State { id, kernel, items });
                        id
                    }
                };
                self.transitions.insert((current, symbol_id), target);
            }
            current += 1;
        }
    }

    /// Emit the Action/Goto table. Reduce cells are written first and
    /// shift/goto cells afterwards; on overlap the later write wins, so a
    /// shift deterministically resolves a shift/reduce conflict.
    pub fn build_table(&self) -> ParserTable {
        let mut table = ParserTable::new();
        table.primary_state_id = 0;
        table.symbols = self.symbols.clone();
        table.productions = self.productions.clone();

        let mut reduce_reduce = 0u32;
        let mut shift_reduce = 0u32;

        for state in self.states.iter() {
            for item in state.items.iter() {
                let production = &self.productions[item.production_id];
                if item.dot_pos < production.rhs.len() {
                    continue;
                }
                if item.production_id == self.entry_production_id {
                    table.set_command(state.id, item.lookahead_id, ParserCommand::Accept);
                    continue;
                }
                if let ParserCommand::Reduce(_) = table.command(state.id, item.lookahead_id) {
                    reduce_reduce += 1;
                }
                table.set_command(
                    state.id,
                    item.lookahead_id,
                    ParserCommand::Reduce(item.production_id),
                );
            }
        }

        for (&(state_id, symbol_id), &target) in self.transitions.iter() {
            let command = if self.symbols[symbol_id].is_terminal() {
                if let ParserCommand::Reduce(_) = table.command(state_id, symbol_id) {
                    shift_reduce += 1;
                }
                ParserCommand::Shift(target)
            } else {
                ParserCommand::Goto(target)
            };
            table.set_command(state_id, symbol_id, command);
        }

        if shift_reduce > 0 || reduce_reduce > 0 {
            debug!(
                "table conflicts resolved: {} shift/reduce (shift kept), {} reduce/reduce (later production kept)",
                shift_reduce, reduce_reduce
            );
        }
        table
    }
}
