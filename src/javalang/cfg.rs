//! Statement-level control flow for Java.
//!
//! Same tail discipline as the Python visitor, with two Java twists: pending
//! `break` / `continue` jumps are keyed by label (unlabeled jumps use a
//! reserved key), and `do` bodies run before their condition is ever looked
//! at, which makes the loop shape identical to `while` here.

use std::collections::HashMap;
use std::rc::Rc;

use petgraph::graph::NodeIndex;
use tracing::debug;
use tree_sitter::Node;

use crate::graph::{CodeGraph, EdgeLabel};
use crate::token::text_of;
use crate::visitor::{Dispatch, Flow, Visitor, walk, walk_children, walk_field};

/// Key for unlabeled break/continue.
const LOOP_LABEL: &str = "__LOOP__";

pub struct ControlFlowVisitor<'g, 's, 't> {
    graph: &'g mut CodeGraph,
    src: &'s [u8],
    last_stmts: Vec<NodeIndex>,
    returns_from: Vec<NodeIndex>,
    break_from: HashMap<String, Vec<NodeIndex>>,
    continue_from: HashMap<String, Vec<NodeIndex>>,
    table: Rc<Dispatch<'t, Self>>,
}

impl<'g, 's, 't> ControlFlowVisitor<'g, 's, 't> {
    pub fn new(graph: &'g mut CodeGraph, src: &'s [u8]) -> Self {
        let mut table = Dispatch::new();
        table.on("block", Self::visit_block);
        table.on("method_declaration", Self::visit_method_declaration);
        table.on("return_statement", Self::visit_return_statement);
        table.on("labeled_statement", Self::visit_labeled_statement);
        table.on("break_statement", Self::visit_break_statement);
        table.on("continue_statement", Self::visit_continue_statement);
        table.on("if_statement", Self::visit_if_statement);
        table.on("for_statement", Self::visit_loop);
        table.on("while_statement", Self::visit_loop);
        table.on("do_statement", Self::visit_loop);
        table.on("try_statement", Self::visit_try_statement);
        table.on_any(Self::visit);
        ControlFlowVisitor {
            graph,
            src,
            last_stmts: Vec::new(),
            returns_from: Vec::new(),
            break_from: HashMap::new(),
            continue_from: HashMap::new(),
            table: Rc::new(table),
        }
    }

    fn add_next(&mut self, node: Node<'t>) -> NodeIndex {
        let stmt = self.graph.intern_ast(node);
        debug!(target: "cfg", "next stmt {} <- {} tails", node.kind(), self.last_stmts.len());
        for &last in &self.last_stmts {
            self.graph.add_relation(last, stmt, EdgeLabel::ControlFlow);
        }
        self.last_stmts = vec![stmt];
        stmt
    }

    fn reset_last(&mut self, target: Vec<NodeIndex>) -> Vec<NodeIndex> {
        std::mem::replace(&mut self.last_stmts, target)
    }

    /// Label of a `break`/`continue`: the identifier child if present, the
    /// reserved loop key otherwise.
    fn jump_label(&self, node: Node<'t>) -> String {
        if node.child_count() > 2 {
            if let Some(name) = node.child(1) {
                return text_of(name, self.src);
            }
        }
        LOOP_LABEL.to_owned()
    }

    fn visit_block(&mut self, node: Node<'t>) -> Flow {
        walk_children(self, node);
        Flow::Prune
    }

    fn visit_method_declaration(&mut self, node: Node<'t>) -> Flow {
        let here = self.graph.intern_ast(node);
        let outside_last = self.reset_last(vec![here]);
        let outside_returns = std::mem::take(&mut self.returns_from);

        walk_field(self, node, "body");

        let tails = std::mem::take(&mut self.last_stmts);
        let returns = std::mem::take(&mut self.returns_from);
        for stmt in tails.into_iter().chain(returns) {
            self.graph.add_relation(stmt, here, EdgeLabel::ReturnFrom);
        }

        self.returns_from = outside_returns;
        self.last_stmts = outside_last;
        Flow::Prune
    }

    fn visit_return_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.add_next(node);
        self.returns_from.push(here);
        self.last_stmts.clear();
        Flow::Prune
    }

    /// After the labeled body, route the label's pending continues back into
    /// the body head and merge its pending breaks into the exit.
    fn visit_labeled_statement(&mut self, node: Node<'t>) -> Flow {
        let (Some(name_node), Some(body)) = (node.child(0), node.child(2)) else {
            return Flow::Descend;
        };
        let name = text_of(name_node, self.src);

        walk(self, body);

        let current_last = std::mem::take(&mut self.last_stmts);
        self.last_stmts = self.continue_from.remove(&name).unwrap_or_default();
        self.add_next(body);

        let mut last = current_last;
        last.extend(self.break_from.remove(&name).unwrap_or_default());
        self.last_stmts = last;
        Flow::Prune
    }

    fn visit_break_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.add_next(node);
        let label = self.jump_label(node);
        self.break_from.entry(label).or_default().push(here);
        self.last_stmts.clear();
        Flow::Prune
    }

    fn visit_continue_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.add_next(node);
        let label = self.jump_label(node);
        self.continue_from.entry(label).or_default().push(here);
        self.last_stmts.clear();
        Flow::Prune
    }

    fn visit_if_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.add_next(node);

        walk_field(self, node, "consequence");
        let left = self.reset_last(vec![here]);

        walk_field(self, node, "alternative");
        let right = self.reset_last(vec![here]);

        self.last_stmts = left.into_iter().chain(right).collect();
        Flow::Prune
    }

    /// `for`, `while` and `do` all reduce to the same wiring at statement
    /// granularity: head, body, continues into the back-edge, breaks into
    /// the exit.
    fn visit_loop(&mut self, node: Node<'t>) -> Flow {
        let prev_break = self.break_from.remove(LOOP_LABEL).unwrap_or_default();
        let prev_continue = self.continue_from.remove(LOOP_LABEL).unwrap_or_default();

        self.add_next(node);
        walk_field(self, node, "body");
        let continues = self.continue_from.remove(LOOP_LABEL).unwrap_or_default();
        self.last_stmts.extend(continues);
        self.add_next(node);

        let breaks = self.break_from.remove(LOOP_LABEL).unwrap_or_default();
        self.last_stmts.extend(breaks);

        self.break_from.insert(LOOP_LABEL.to_owned(), prev_break);
        self.continue_from
            .insert(LOOP_LABEL.to_owned(), prev_continue);
        Flow::Prune
    }

    fn visit_try_statement(&mut self, node: Node<'t>) -> Flow {
        self.add_next(node);
        let starting = self.last_stmts.clone();

        walk_field(self, node, "body");

        let mut handler_entry = self.last_stmts.clone();
        handler_entry.extend(starting);
        self.last_stmts = handler_entry.clone();
        let mut out_last: Vec<NodeIndex> = Vec::new();

        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        drop(cursor);
        let mut finally_clauses = Vec::new();
        for child in children {
            match child.kind() {
                "catch_clause" => {
                    walk(self, child);
                    out_last.extend(self.last_stmts.iter().copied());
                    self.last_stmts = handler_entry.clone();
                }
                "finally_clause" => finally_clauses.push(child),
                _ => {}
            }
        }

        self.last_stmts.extend(out_last);

        for clause in finally_clauses {
            walk(self, clause);
        }
        Flow::Prune
    }

    fn visit(&mut self, node: Node<'t>) -> Flow {
        if node.kind().ends_with("statement") {
            self.add_next(node);
            return Flow::Prune;
        }
        Flow::Descend
    }
}

impl<'t> Visitor<'t> for ControlFlowVisitor<'_, '_, 't> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        let table = Rc::clone(&self.table);
        table.run(self, node)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
use crate::Lang;
#[cfg(test)]
use crate::graph::GraphNode;

#[cfg(test)]
fn cfg_graph(src: &[u8]) -> CodeGraph {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_java::LANGUAGE))
        .unwrap();
    let tree = parser.parse(src, None).unwrap();
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Java);
    let mut v = ControlFlowVisitor::new(&mut g, src);
    walk(&mut v, tree.root_node());
    g
}

#[cfg(test)]
fn inner_at(g: &CodeGraph, kind: &str, row: usize) -> NodeIndex {
    g.nodes()
        .find(|(_, n)| {
            matches!(n, GraphNode::Syntax(info) if info.kind == kind && info.start.0 == row)
        })
        .map(|(ix, _)| ix)
        .unwrap_or_else(|| panic!("no {kind} vertex at row {row}"))
}

#[cfg(test)]
fn has_edge(g: &CodeGraph, src: NodeIndex, dst: NodeIndex, label: EdgeLabel) -> bool {
    g.successors(src, Some(label)).any(|s| s == dst)
}

#[test]
fn for_loop_back_edge_and_break_exit() {
    let src = b"class T {
  void m() {
    for (int i = 0; i < 10; i++) {
      if (cond) break;
    }
    x();
  }
}
";
    let g = cfg_graph(src);
    let for_stmt = inner_at(&g, "for_statement", 2);
    let if_stmt = inner_at(&g, "if_statement", 3);
    let brk = inner_at(&g, "break_statement", 3);
    let after = inner_at(&g, "expression_statement", 5);

    assert!(has_edge(&g, for_stmt, if_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, if_stmt, for_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, brk, after, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, for_stmt, after, EdgeLabel::ControlFlow));
}

#[test]
fn labeled_continue_targets_the_outer_loop() {
    let src = b"class T {
  void m() {
    outer: for (;;) {
      for (;;) {
        continue outer;
      }
    }
  }
}
";
    let g = cfg_graph(src);
    let outer = inner_at(&g, "for_statement", 2);
    let inner = inner_at(&g, "for_statement", 3);
    let cont = inner_at(&g, "continue_statement", 4);

    assert!(has_edge(&g, cont, outer, EdgeLabel::ControlFlow));
    assert!(!has_edge(&g, cont, inner, EdgeLabel::ControlFlow));
}

#[test]
fn do_while_executes_its_body_once() {
    let src = b"class T {
  void m() {
    do {
      a();
    } while (c);
    b();
  }
}
";
    let g = cfg_graph(src);
    let do_stmt = inner_at(&g, "do_statement", 2);
    let body = inner_at(&g, "expression_statement", 3);
    let after = inner_at(&g, "expression_statement", 5);

    assert!(has_edge(&g, do_stmt, body, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, body, do_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, do_stmt, after, EdgeLabel::ControlFlow));
}

#[test]
fn try_catch_finally_wiring() {
    let src = b"class T {
  void m() {
    try {
      a();
    } catch (E e) {
      b();
    } finally {
      c();
    }
  }
}
";
    let g = cfg_graph(src);
    let body_stmt = inner_at(&g, "expression_statement", 3);
    let handler_stmt = inner_at(&g, "expression_statement", 5);
    let finally_stmt = inner_at(&g, "expression_statement", 7);

    assert!(has_edge(&g, body_stmt, handler_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, body_stmt, finally_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, handler_stmt, finally_stmt, EdgeLabel::ControlFlow));
}

#[test]
fn method_tails_and_returns_exit_to_the_declaration() {
    let src = b"class T {
  int m() {
    if (c) {
      return 1;
    }
    x();
  }
}
";
    let g = cfg_graph(src);
    let method = inner_at(&g, "method_declaration", 1);
    let ret = inner_at(&g, "return_statement", 3);
    let tail = inner_at(&g, "expression_statement", 5);

    assert!(has_edge(&g, ret, method, EdgeLabel::ReturnFrom));
    assert!(has_edge(&g, tail, method, EdgeLabel::ReturnFrom));
}
