// Copyright 2023 ToyCC contributors

//! Abstract syntax tree.
//!
//! A node owns its children; the parent link is a weak back-reference, so
//! dropping the root frees the whole tree. For terminal nodes `token` carries
//! the lexeme; for non-terminal nodes it is unused.

use crate::grammar::{Symbol, SymbolKind, SymbolType};
use crate::token::{Token, TokenKind};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::{Rc, Weak};

#[derive(Debug)]
pub struct AstNodeData {
    symbol: Symbol,
    token: Token,
    parent: RefCell<Weak<AstNodeData>>,
    children: RefCell<Vec<AstNode>>,
}

#[derive(Debug, Clone)]
pub struct AstNode(Rc<AstNodeData>);

impl AstNode {
    pub fn new_leaf(symbol: Symbol, token: Token) -> Self {
        AstNode(Rc::new(AstNodeData {
            symbol,
            token,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(vec![]),
        }))
    }

    pub fn new_internal(symbol: Symbol) -> Self {
        AstNode::new_leaf(symbol, Token::default())
    }

    /// Append `child` and point its parent link back here.
    pub fn add_child(&self, child: &AstNode) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    pub fn symbol(&self) -> &Symbol {
        &self.0.symbol
    }

    pub fn symbol_type(&self) -> SymbolType {
        self.0.symbol.symbol_type
    }

    pub fn symbol_kind(&self) -> SymbolKind {
        self.0.symbol.symbol_kind
    }

    pub fn is_terminal(&self) -> bool {
        self.0.symbol.symbol_type == SymbolType::Terminal
    }

    pub fn token(&self) -> &Token {
        &self.0.token
    }

    pub fn token_kind(&self) -> TokenKind {
        self.0.token.kind
    }

    pub fn parent(&self) -> Option<AstNode> {
        self.0.parent.borrow().upgrade().map(AstNode)
    }

    pub fn children(&self) -> Vec<AstNode> {
        self.0.children.borrow().clone()
    }

    pub fn child(&self, index: usize) -> Option<AstNode> {
        self.0.children.borrow().get(index).cloned()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    pub fn same_node(&self, other: &AstNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Walk parent links to the tree root.
    pub fn root(&self) -> AstNode {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Leftmost terminal under this node, if any. Diagnostics use it to
    /// anchor a non-terminal to a source position.
    pub fn first_terminal(&self) -> Option<AstNode> {
        let mut current = self.clone();
        loop {
            if current.is_terminal() {
                return Some(current);
            }
            match current.child(0) {
                Some(child) => current = child,
                None => return None,
            }
        }
    }

    fn dot_label(&self) -> String {
        let mut label = format!("{:p}\\n{}", Rc::as_ptr(&self.0), self.0.symbol.name);
        if self.is_terminal() {
            label += &format!(
                "\\n{}\\n({}, {})",
                self.0.token.content, self.0.token.row, self.0.token.col
            );
        }
        label
    }

    fn dump_dot_edges<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for child in self.children() {
            child.dump_dot_edges(writer)?;
        }
        if let Some(parent) = self.parent() {
            writeln!(
                writer,
                "\"{}\" -> \"{}\";",
                parent.dot_label(),
                self.dot_label()
            )?;
        }
        Ok(())
    }

    /// Write the subtree as a Graphviz digraph.
    pub fn dump_dot<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "digraph G1 {{")?;
        self.dump_dot_edges(writer)?;
        writeln!(writer, "}}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: usize, name: &str, symbol_type: SymbolType) -> Symbol {
        Symbol {
            id,
            name: name.to_string(),
            symbol_type,
            token_kind: TokenKind::Unknown,
            symbol_kind: SymbolKind::of_name(name),
        }
    }

    fn leaf(name: &str, content: &str) -> AstNode {
        AstNode::new_leaf(
            symbol(1, name, SymbolType::Terminal),
            Token::new(content.to_string(), 1, 1, TokenKind::Identifier),
        )
    }

    #[test]
    fn children_point_back_to_their_parent() {
        let root = AstNode::new_internal(symbol(0, "expression", SymbolType::NonTerminal));
        let a = leaf("IDENT", "a");
        let b = leaf("IDENT", "b");
        root.add_child(&a);
        root.add_child(&b);

        assert_eq!(root.child_count(), 2);
        assert!(a.parent().unwrap().same_node(&root));
        assert!(b.parent().unwrap().same_node(&root));
        assert!(root.parent().is_none());
        assert!(b.root().same_node(&root));
    }

    #[test]
    fn first_terminal_is_the_leftmost_leaf() {
        let root = AstNode::new_internal(symbol(0, "expression", SymbolType::NonTerminal));
        let inner = AstNode::new_internal(symbol(2, "primary_expression", SymbolType::NonTerminal));
        let a = leaf("IDENT", "a");
        inner.add_child(&a);
        root.add_child(&inner);
        root.add_child(&leaf("IDENT", "b"));

        assert!(root.first_terminal().unwrap().same_node(&a));
    }

    #[test]
    fn dot_dump_draws_parent_child_edges() {
        let root = AstNode::new_internal(symbol(0, "expression", SymbolType::NonTerminal));
        let a = leaf("IDENT", "a");
        root.add_child(&a);

        let mut out = Vec::new();
        root.dump_dot(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph G1 {"));
        assert!(text.contains("expression"));
        assert!(text.contains("\\na\\n(1, 1)"));
        assert!(text.contains(" -> "));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn dropping_the_root_frees_the_subtree() {
        let child = leaf("IDENT", "a");
        {
            let root = AstNode::new_internal(symbol(0, "expression", SymbolType::NonTerminal));
            root.add_child(&child);
            assert!(child.parent().is_some());
        }
        // Only the outer handle keeps the child alive; its parent is gone.
        assert!(child.parent().is_none());
    }
}
