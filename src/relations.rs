use std::rc::Rc;

use tree_sitter::Node;

use crate::graph::{CodeGraph, EdgeLabel};
use crate::visitor::{Dispatch, Flow, Visitor};

/// Emits the tree skeleton: a `child` edge to every child and a `sibling`
/// edge from the previous sibling.
pub struct AstRelationVisitor<'g, 't> {
    graph: &'g mut CodeGraph,
    table: Rc<Dispatch<'t, Self>>,
}

impl<'g, 't> AstRelationVisitor<'g, 't> {
    pub fn new(graph: &'g mut CodeGraph) -> Self {
        let mut table = Dispatch::new();
        table.on_any(Self::visit);
        AstRelationVisitor {
            graph,
            table: Rc::new(table),
        }
    }

    fn visit(&mut self, node: Node<'t>) -> Flow {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.graph.relate_ast(node, child, EdgeLabel::Child);
        }
        if let Some(prev) = node.prev_sibling() {
            self.graph.relate_ast(prev, node, EdgeLabel::Sibling);
        }
        Flow::Descend
    }
}

impl<'t> Visitor<'t> for AstRelationVisitor<'_, 't> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        let table = Rc::clone(&self.table);
        table.run(self, node)
    }
}

#[cfg(test)]
use crate::Lang;

#[cfg(test)]
fn graph_for(src: &[u8]) -> CodeGraph {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_python::LANGUAGE))
        .unwrap();
    let tree = parser.parse(src, None).unwrap();
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Python);
    let mut v = AstRelationVisitor::new(&mut g);
    crate::visitor::walk(&mut v, tree.root_node());
    g
}

#[test]
fn every_child_gets_a_child_edge() {
    let g = graph_for(b"x = 1\ny = 2\n");
    let root = g.root();

    // module -> two expression statements
    let children: Vec<_> = g.successors(root, Some(EdgeLabel::Child)).collect();
    assert_eq!(children.len(), 2);
    for child in &children {
        assert_eq!(g.node(*child).name(), "expression_statement");
    }
}

#[test]
fn siblings_are_chained_in_order() {
    let g = graph_for(b"x = 1\ny = 2\n");
    let root = g.root();

    let children: Vec<_> = g.successors(root, Some(EdgeLabel::Child)).collect();
    let with_sibling = children
        .iter()
        .filter(|&&c| g.successors(c, Some(EdgeLabel::Sibling)).count() == 1)
        .count();
    // Exactly one of the two statements has a following sibling.
    assert_eq!(with_sibling, 1);
}
