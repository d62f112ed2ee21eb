//! Statement-level control flow for Python.
//!
//! The visitor threads a set of dangling "tail" statements through the walk:
//! every new statement receives a `controlflow` edge from each tail and then
//! becomes the sole tail. Branches fork the tail set and join it afterwards;
//! loops feed pending `continue` jumps back into the head and pending
//! `break` jumps into the exit.

use std::rc::Rc;

use petgraph::graph::NodeIndex;
use tracing::debug;
use tree_sitter::Node;

use crate::graph::{CodeGraph, EdgeLabel};
use crate::visitor::{Dispatch, Flow, Visitor, walk, walk_children, walk_field, walk_opt};

/// Tail set plus the pending-jump stacks shared by both flow visitors.
#[derive(Default)]
struct FlowState {
    last_stmts: Vec<NodeIndex>,
    break_from: Vec<NodeIndex>,
    continue_from: Vec<NodeIndex>,
    returns_from: Vec<NodeIndex>,
    yields_from: Vec<NodeIndex>,
}

impl FlowState {
    /// Wire every tail into `node` and make it the sole tail.
    fn add_next(&mut self, graph: &mut CodeGraph, node: Node<'_>) -> NodeIndex {
        let stmt = graph.intern_ast(node);
        debug!(target: "cfg", "next stmt {} <- {} tails", node.kind(), self.last_stmts.len());
        for &last in &self.last_stmts {
            graph.add_relation(last, stmt, EdgeLabel::ControlFlow);
        }
        self.last_stmts = vec![stmt];
        stmt
    }

    fn reset_last(&mut self, target: Vec<NodeIndex>) -> Vec<NodeIndex> {
        std::mem::replace(&mut self.last_stmts, target)
    }
}

pub struct ControlFlowVisitor<'g, 't> {
    graph: &'g mut CodeGraph,
    flow: FlowState,
    table: Rc<Dispatch<'t, Self>>,
}

impl<'g, 't> ControlFlowVisitor<'g, 't> {
    pub fn new(graph: &'g mut CodeGraph) -> Self {
        let mut table = Dispatch::new();
        table.on("block", Self::visit_block);
        table.on("function_definition", Self::visit_function_definition);
        table.on("if_statement", Self::visit_if_statement);
        table.on("return_statement", Self::visit_return_statement);
        table.on("yield_statement", Self::visit_yield_statement);
        table.on("break_statement", Self::visit_break_statement);
        table.on("continue_statement", Self::visit_continue_statement);
        table.on("for_statement", Self::visit_loop);
        table.on("while_statement", Self::visit_loop);
        table.on("try_statement", Self::visit_try_statement);
        table.on_any(Self::visit);
        ControlFlowVisitor {
            graph,
            flow: FlowState::default(),
            table: Rc::new(table),
        }
    }

    fn visit_block(&mut self, node: Node<'t>) -> Flow {
        walk_children(self, node);
        Flow::Prune
    }

    fn visit_function_definition(&mut self, node: Node<'t>) -> Flow {
        let here = self.graph.intern_ast(node);
        let outside_last = self.flow.reset_last(vec![here]);
        let outside_returns = std::mem::take(&mut self.flow.returns_from);
        let outside_yields = std::mem::take(&mut self.flow.yields_from);

        walk_field(self, node, "body");

        // Whatever is still dangling falls off the end of the function.
        let tails = std::mem::take(&mut self.flow.last_stmts);
        let returns = std::mem::take(&mut self.flow.returns_from);
        for stmt in tails.into_iter().chain(returns) {
            self.graph.add_relation(stmt, here, EdgeLabel::ReturnFrom);
        }
        for stmt in std::mem::take(&mut self.flow.yields_from) {
            self.graph.add_relation(stmt, here, EdgeLabel::YieldFrom);
        }

        self.flow.returns_from = outside_returns;
        self.flow.yields_from = outside_yields;
        self.flow.last_stmts = outside_last;
        Flow::Prune
    }

    fn visit_if_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);

        walk_field(self, node, "consequence");
        let left = self.flow.reset_last(vec![here]);

        walk_field(self, node, "alternative");
        let right = self.flow.reset_last(vec![here]);

        self.flow.last_stmts = left.into_iter().chain(right).collect();
        Flow::Prune
    }

    fn visit_return_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);
        self.flow.returns_from.push(here);
        self.flow.last_stmts.clear();
        Flow::Prune
    }

    fn visit_yield_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);
        self.flow.yields_from.push(here);
        Flow::Prune
    }

    fn visit_break_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);
        self.flow.break_from.push(here);
        self.flow.last_stmts.clear();
        Flow::Prune
    }

    fn visit_continue_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);
        self.flow.continue_from.push(here);
        self.flow.last_stmts.clear();
        Flow::Prune
    }

    /// `for` and `while` share one shape: body, continues joined into the
    /// back-edge, the `else` clause on the exit path, breaks joined after it.
    fn visit_loop(&mut self, node: Node<'t>) -> Flow {
        let prev_break = std::mem::take(&mut self.flow.break_from);
        let prev_continue = std::mem::take(&mut self.flow.continue_from);

        self.flow.add_next(self.graph, node);
        walk_field(self, node, "body");
        let continues = std::mem::take(&mut self.flow.continue_from);
        self.flow.last_stmts.extend(continues);
        self.flow.add_next(self.graph, node);

        walk_field(self, node, "alternative");

        let breaks = std::mem::take(&mut self.flow.break_from);
        self.flow.last_stmts.extend(breaks);

        self.flow.break_from = prev_break;
        self.flow.continue_from = prev_continue;
        Flow::Prune
    }

    fn visit_try_statement(&mut self, node: Node<'t>) -> Flow {
        self.flow.add_next(self.graph, node);
        let starting = self.flow.last_stmts.clone();

        walk_field(self, node, "body");
        walk_field(self, node, "alternative");

        // Any statement of the body (or the entry itself) may raise, so every
        // handler starts from the union of both.
        let mut handler_entry = self.flow.last_stmts.clone();
        handler_entry.extend(starting);
        self.flow.last_stmts = handler_entry.clone();
        let mut out_last: Vec<NodeIndex> = Vec::new();

        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        drop(cursor);
        let mut finally_clauses = Vec::new();
        for child in children {
            match child.kind() {
                "except_clause" => {
                    walk(self, child);
                    out_last.extend(self.flow.last_stmts.iter().copied());
                    self.flow.last_stmts = handler_entry.clone();
                }
                "finally_clause" => finally_clauses.push(child),
                _ => {}
            }
        }

        self.flow.last_stmts.extend(out_last);

        for clause in finally_clauses {
            walk(self, clause);
        }
        Flow::Prune
    }

    /// Statement node types all carry the `statement` suffix in tree-sitter,
    /// which catches everything without a dedicated handler.
    fn visit(&mut self, node: Node<'t>) -> Flow {
        if node.kind().ends_with("statement") {
            self.flow.add_next(self.graph, node);
            return Flow::Prune;
        }
        Flow::Descend
    }
}

impl<'t> Visitor<'t> for ControlFlowVisitor<'_, 't> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        let table = Rc::clone(&self.table);
        table.run(self, node)
    }
}

// Sub-statement control flow ------------------------------------------------

/// Extends the statement-level flow down into expressions: calls, operators,
/// assignments and conditions become flow nodes themselves, and assignments
/// additionally record `assigned_from` between value and targets.
pub struct SubControlFlowVisitor<'g, 't> {
    graph: &'g mut CodeGraph,
    flow: FlowState,
    table: Rc<Dispatch<'t, Self>>,
}

impl<'g, 't> SubControlFlowVisitor<'g, 't> {
    pub fn new(graph: &'g mut CodeGraph) -> Self {
        let mut table = Dispatch::new();
        table.on("block", Self::visit_block);
        table.on("function_definition", Self::visit_function_definition);
        table.on("break_statement", Self::visit_break_statement);
        table.on("continue_statement", Self::visit_continue_statement);
        table.on("call", Self::visit_call);
        table.on("assignment", Self::visit_assignment);
        table.on("named_expression", Self::visit_named_expression);
        table.on("augmented_assignment", Self::visit_augmented_assignment);
        table.on("return_statement", Self::visit_return_statement);
        table.on("yield_statement", Self::visit_yield_statement);
        table.on("if_statement", Self::visit_if_statement);
        table.on("conditional_expression", Self::visit_conditional_expression);
        table.on("try_statement", Self::visit_try_statement);
        table.on("while_statement", Self::visit_while_statement);
        table.on("for_statement", Self::visit_for_statement);
        table.on("with_item", Self::visit_with_item);
        table.on("binary_operator", Self::visit_binary_operator);
        table.on("boolean_operator", Self::visit_binary_operator);
        table.on("comparison_operator", Self::visit_comparison_operator);
        table.on("assert_statement", Self::visit_assert_statement);
        table.on("not_operator", Self::visit_unary_operator);
        table.on("unary_operator", Self::visit_unary_operator);
        table.on("attribute", Self::visit_attribute);
        table.on_any(Self::visit);
        SubControlFlowVisitor {
            graph,
            flow: FlowState::default(),
            table: Rc::new(table),
        }
    }

    fn assigned_from(&mut self, value: Node<'t>, target: Node<'t>) {
        self.graph.relate_ast(value, target, EdgeLabel::AssignedFrom);
    }

    /// Statements stay transparent here; flow passes through their
    /// sub-expressions instead.
    fn visit(&mut self, node: Node<'t>) -> Flow {
        if node.kind().ends_with("statement") {
            self.flow.add_next(self.graph, node);
        }
        Flow::Descend
    }

    fn visit_block(&mut self, node: Node<'t>) -> Flow {
        walk_children(self, node);
        Flow::Prune
    }

    fn visit_function_definition(&mut self, node: Node<'t>) -> Flow {
        let here = self.graph.intern_ast(node);
        let outside_last = self.flow.reset_last(vec![here]);
        let outside_returns = std::mem::take(&mut self.flow.returns_from);
        let outside_yields = std::mem::take(&mut self.flow.yields_from);

        walk_field(self, node, "body");

        let tails = std::mem::take(&mut self.flow.last_stmts);
        let returns = std::mem::take(&mut self.flow.returns_from);
        for stmt in tails.into_iter().chain(returns) {
            self.graph.add_relation(stmt, here, EdgeLabel::ReturnFrom);
        }
        for stmt in std::mem::take(&mut self.flow.yields_from) {
            self.graph.add_relation(stmt, here, EdgeLabel::YieldFrom);
        }

        self.flow.returns_from = outside_returns;
        self.flow.yields_from = outside_yields;
        self.flow.last_stmts = outside_last;
        Flow::Prune
    }

    fn visit_break_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);
        self.flow.break_from.push(here);
        self.flow.last_stmts.clear();
        Flow::Prune
    }

    fn visit_continue_statement(&mut self, node: Node<'t>) -> Flow {
        let here = self.flow.add_next(self.graph, node);
        self.flow.continue_from.push(here);
        self.flow.last_stmts.clear();
        Flow::Prune
    }

    fn visit_call(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "function");
        walk_field(self, node, "arguments");
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_assignment(&mut self, node: Node<'t>) -> Flow {
        let value = node.child_by_field_name("right");
        walk_opt(self, value);

        if let (Some(value), Some(targets)) = (value, node.child_by_field_name("left")) {
            for target in target_identifiers(targets) {
                self.assigned_from(value, target);
            }
        }

        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_named_expression(&mut self, node: Node<'t>) -> Flow {
        let value = node.child_by_field_name("value");
        walk_opt(self, value);
        if let (Some(value), Some(name)) = (value, node.child_by_field_name("name")) {
            self.assigned_from(value, name);
        }
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_augmented_assignment(&mut self, node: Node<'t>) -> Flow {
        let value = node.child_by_field_name("right");
        walk_opt(self, value);
        if let (Some(value), Some(target)) = (value, node.child_by_field_name("left")) {
            self.assigned_from(value, target);
        }
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_return_statement(&mut self, node: Node<'t>) -> Flow {
        if node.child_count() > 0 {
            if let Some(value) = node.child(0) {
                walk(self, value);
            }
            self.flow.add_next(self.graph, node);
        }
        let here = self.graph.intern_ast(node);
        self.flow.returns_from.push(here);
        self.flow.last_stmts.clear();
        Flow::Prune
    }

    fn visit_yield_statement(&mut self, node: Node<'t>) -> Flow {
        if node.child_count() > 0 {
            if let Some(value) = node.child(0) {
                walk(self, value);
            }
            let here = self.flow.add_next(self.graph, node);
            self.flow.yields_from.push(here);
        }
        Flow::Prune
    }

    fn visit_if_statement(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "condition");
        let after_test = self.flow.last_stmts.clone();

        walk_field(self, node, "consequence");
        let left = self.flow.reset_last(after_test.clone());

        walk_field(self, node, "alternative");
        let right = self.flow.reset_last(after_test);

        self.flow.last_stmts = left.into_iter().chain(right).collect();
        Flow::Prune
    }

    fn visit_conditional_expression(&mut self, node: Node<'t>) -> Flow {
        let children = non_comment_children(node);
        if children.len() != 5 {
            return Flow::Descend;
        }
        let (left, condition, right) = (children[0], children[2], children[4]);

        walk(self, condition);
        let after_test = self.flow.last_stmts.clone();

        walk(self, left);
        let left_last = self.flow.reset_last(after_test.clone());

        walk(self, right);
        let right_last = self.flow.reset_last(after_test);

        self.flow.last_stmts = left_last.into_iter().chain(right_last).collect();
        Flow::Prune
    }

    fn visit_try_statement(&mut self, node: Node<'t>) -> Flow {
        let starting = self.flow.last_stmts.clone();

        walk_field(self, node, "body");
        walk_field(self, node, "alternative");

        let mut handler_entry = self.flow.last_stmts.clone();
        handler_entry.extend(starting);
        self.flow.last_stmts = handler_entry.clone();
        let mut out_last: Vec<NodeIndex> = Vec::new();

        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        drop(cursor);
        let mut finally_clauses = Vec::new();
        for child in children {
            match child.kind() {
                "except_clause" => {
                    walk(self, child);
                    out_last.extend(self.flow.last_stmts.iter().copied());
                    self.flow.last_stmts = handler_entry.clone();
                }
                "finally_clause" => finally_clauses.push(child),
                _ => {}
            }
        }

        self.flow.last_stmts.extend(out_last);

        for clause in finally_clauses {
            walk(self, clause);
        }
        Flow::Prune
    }

    fn visit_while_statement(&mut self, node: Node<'t>) -> Flow {
        let prev_break = std::mem::take(&mut self.flow.break_from);
        let prev_continue = std::mem::take(&mut self.flow.continue_from);

        walk_field(self, node, "condition");
        walk_field(self, node, "body");
        let continues = std::mem::take(&mut self.flow.continue_from);
        self.flow.last_stmts.extend(continues);
        walk_field(self, node, "condition");

        walk_field(self, node, "alternative");

        let breaks = std::mem::take(&mut self.flow.break_from);
        self.flow.last_stmts.extend(breaks);

        self.flow.break_from = prev_break;
        self.flow.continue_from = prev_continue;
        Flow::Prune
    }

    fn visit_for_statement(&mut self, node: Node<'t>) -> Flow {
        let prev_break = std::mem::take(&mut self.flow.break_from);
        let prev_continue = std::mem::take(&mut self.flow.continue_from);

        walk_field(self, node, "left");
        if let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) {
            self.assigned_from(left, right);
        }

        walk_field(self, node, "body");
        let continues = std::mem::take(&mut self.flow.continue_from);
        self.flow.last_stmts.extend(continues);
        walk_field(self, node, "body");

        walk_field(self, node, "alternative");

        let breaks = std::mem::take(&mut self.flow.break_from);
        self.flow.last_stmts.extend(breaks);

        self.flow.break_from = prev_break;
        self.flow.continue_from = prev_continue;
        Flow::Prune
    }

    fn visit_with_item(&mut self, node: Node<'t>) -> Flow {
        let value = node.child_by_field_name("value");
        walk_opt(self, value);
        if let (Some(value), Some(alias)) = (value, node.child_by_field_name("alias")) {
            self.assigned_from(value, alias);
            walk(self, alias);
        }
        Flow::Prune
    }

    fn visit_binary_operator(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "left");
        walk_field(self, node, "right");
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_comparison_operator(&mut self, node: Node<'t>) -> Flow {
        if let Some(left) = node.child(0) {
            walk(self, left);
        }
        if node.child_count() > 1 {
            if let Some(right) = node.child(node.child_count() - 1) {
                walk(self, right);
            }
        }
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_assert_statement(&mut self, node: Node<'t>) -> Flow {
        if let Some(test) = node.child(1) {
            walk(self, test);
        }
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_unary_operator(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "argument");
        self.flow.add_next(self.graph, node);
        Flow::Prune
    }

    fn visit_attribute(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "object");
        walk_field(self, node, "attribute");
        Flow::Prune
    }
}

impl<'t> Visitor<'t> for SubControlFlowVisitor<'_, 't> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        let table = Rc::clone(&self.table);
        table.run(self, node)
    }
}

fn non_comment_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

// Target identifier collection ----------------------------------------------

/// Finds the identifiers of a multi-target left-hand side (tuple unpack,
/// subscripts, attributes).
struct IdFinder<'t> {
    ids: Vec<Node<'t>>,
    table: Rc<Dispatch<'t, Self>>,
}

impl<'t> IdFinder<'t> {
    fn new() -> Self {
        let mut table = Dispatch::new();
        table.on("identifier", Self::visit_identifier);
        IdFinder {
            ids: Vec::new(),
            table: Rc::new(table),
        }
    }

    fn visit_identifier(&mut self, node: Node<'t>) -> Flow {
        self.ids.push(node);
        Flow::Descend
    }
}

impl<'t> Visitor<'t> for IdFinder<'t> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        let table = Rc::clone(&self.table);
        table.run(self, node)
    }
}

fn target_identifiers<'t>(targets: Node<'t>) -> Vec<Node<'t>> {
    if targets.kind() == "identifier" {
        return vec![targets];
    }
    let mut finder = IdFinder::new();
    walk(&mut finder, targets);
    finder.ids
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
use crate::Lang;
#[cfg(test)]
use crate::graph::GraphNode;

#[cfg(test)]
fn parse(src: &[u8]) -> tree_sitter::Tree {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_python::LANGUAGE))
        .unwrap();
    parser.parse(src, None).unwrap()
}

#[cfg(test)]
fn cfg_graph(src: &[u8]) -> CodeGraph {
    let tree = parse(src);
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Python);
    let mut v = ControlFlowVisitor::new(&mut g);
    walk(&mut v, tree.root_node());
    g
}

#[cfg(test)]
fn subcfg_graph(src: &[u8]) -> CodeGraph {
    let tree = parse(src);
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Python);
    let mut v = SubControlFlowVisitor::new(&mut g);
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
fn while_loop_has_a_back_edge() {
    let g = cfg_graph(b"while c:\n    x = x + 1\n");
    let header = inner_at(&g, "while_statement", 0);
    let body = inner_at(&g, "expression_statement", 1);

    assert!(has_edge(&g, header, body, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, body, header, EdgeLabel::ControlFlow));
}

#[test]
fn if_else_tails_join_at_the_next_statement() {
    let g = cfg_graph(b"if c:\n    a()\nelse:\n    b()\nz()\n");
    let then_stmt = inner_at(&g, "expression_statement", 1);
    let else_stmt = inner_at(&g, "expression_statement", 3);
    let after = inner_at(&g, "expression_statement", 4);

    assert!(has_edge(&g, then_stmt, after, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, else_stmt, after, EdgeLabel::ControlFlow));
}

#[test]
fn try_except_finally_wiring() {
    let g = cfg_graph(b"try:\n    a()\nexcept E:\n    b()\nfinally:\n    c()\n");
    let body_stmt = inner_at(&g, "expression_statement", 1);
    let handler_stmt = inner_at(&g, "expression_statement", 3);
    let finally_stmt = inner_at(&g, "expression_statement", 5);

    // The body tail may raise into the handler, and both reach the finally.
    assert!(has_edge(&g, body_stmt, handler_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, body_stmt, finally_stmt, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, handler_stmt, finally_stmt, EdgeLabel::ControlFlow));
}

#[test]
fn returns_and_tails_exit_to_the_function() {
    let g = cfg_graph(b"def f():\n    if c:\n        return 1\n    x = 2\n");
    let func = inner_at(&g, "function_definition", 0);
    let ret = inner_at(&g, "return_statement", 2);
    let tail = inner_at(&g, "expression_statement", 3);

    assert!(has_edge(&g, ret, func, EdgeLabel::ReturnFrom));
    assert!(has_edge(&g, tail, func, EdgeLabel::ReturnFrom));
}

#[test]
fn break_joins_the_loop_exit() {
    let g = cfg_graph(b"while c:\n    if d:\n        break\n    e()\nz()\n");
    let brk = inner_at(&g, "break_statement", 2);
    let header = inner_at(&g, "while_statement", 0);
    let after = inner_at(&g, "expression_statement", 4);

    assert!(has_edge(&g, brk, after, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, header, after, EdgeLabel::ControlFlow));
    // The break does not flow back into the loop header.
    assert!(!has_edge(&g, brk, header, EdgeLabel::ControlFlow));
}

#[test]
fn sub_cfg_links_value_to_targets() {
    let g = subcfg_graph(b"x = y + 1\n");
    let value = inner_at(&g, "binary_operator", 0);
    let stmt = inner_at(&g, "expression_statement", 0);
    let assign = inner_at(&g, "assignment", 0);
    let target = g.tokens()[0];
    assert_eq!(g.node(target).name(), "x");

    assert!(has_edge(&g, value, target, EdgeLabel::AssignedFrom));
    assert!(has_edge(&g, stmt, value, EdgeLabel::ControlFlow));
    assert!(has_edge(&g, value, assign, EdgeLabel::ControlFlow));
}

#[test]
fn sub_cfg_tuple_unpack_links_every_target() {
    let g = subcfg_graph(b"a, b = f()\n");
    let value = inner_at(&g, "call", 0);
    let a = g.tokens()[0];
    let b = g.tokens()[2];
    assert_eq!(g.node(a).name(), "a");
    assert_eq!(g.node(b).name(), "b");

    assert!(has_edge(&g, value, a, EdgeLabel::AssignedFrom));
    assert!(has_edge(&g, value, b, EdgeLabel::AssignedFrom));
}

#[test]
fn sub_cfg_flows_through_calls() {
    let g = subcfg_graph(b"f(x)\n");
    let stmt = inner_at(&g, "expression_statement", 0);
    let call = inner_at(&g, "call", 0);

    assert!(has_edge(&g, stmt, call, EdgeLabel::ControlFlow));
}
