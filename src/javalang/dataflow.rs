//! Intraprocedural data flow for Java.
//!
//! Same frontier discipline as the Python visitor, shaped to Java's grammar:
//! method scope, block scoping, declarators, update and assignment
//! expressions, field accesses and `for`'s init/update sections. Loops are
//! unrolled exactly twice, never iterated to a fixpoint.

use std::collections::HashSet;
use std::rc::Rc;

use petgraph::graph::NodeIndex;
use tracing::debug;
use tree_sitter::Node;

use crate::graph::{CodeGraph, EdgeLabel};
use crate::scope::{IdContext, RwState, ScopeTree};
use crate::token::text_of;
use crate::visitor::{Dispatch, Flow, Visitor, walk_children, walk_field};

pub struct DataFlowVisitor<'g, 's, 't> {
    graph: &'g mut CodeGraph,
    src: &'s [u8],
    rw: RwState,
    returns_from_rw: Vec<RwState>,
    continue_from_rw: Vec<RwState>,
    break_from_rw: Vec<RwState>,
    scopes: ScopeTree,
    current_scope: Vec<String>,
    ctx: Option<IdContext>,
    table: Rc<Dispatch<'t, Self>>,
}

impl<'g, 's, 't> DataFlowVisitor<'g, 's, 't> {
    pub fn new(graph: &'g mut CodeGraph, src: &'s [u8]) -> Self {
        let mut table = Dispatch::new();
        table.on("identifier", Self::visit_identifier);
        table.on("block", Self::visit_block);
        table.on("return_statement", Self::visit_return_statement);
        table.on("method_declaration", Self::visit_method_declaration);
        table.on("if_statement", Self::visit_if_statement);
        table.on("while_statement", Self::visit_while_statement);
        table.on("do_statement", Self::visit_do_statement);
        table.on("for_statement", Self::visit_for_statement);
        table.on("continue_statement", Self::visit_continue_statement);
        table.on("break_statement", Self::visit_break_statement);
        table.on("field_access", Self::visit_field_access);
        table.on("method_invocation", Self::visit_method_invocation);
        table.on(
            "object_creation_expression",
            Self::visit_object_creation_expression,
        );
        table.on("variable_declarator", Self::visit_variable_declarator);
        table.on("assignment_expression", Self::visit_assignment_expression);
        table.on("update_expression", Self::visit_update_expression);
        table.on("resource", Self::visit_variable_declarator);
        table.on("lambda_expression", Self::visit_lambda_expression);
        DataFlowVisitor {
            graph,
            src,
            rw: RwState::default(),
            returns_from_rw: Vec::new(),
            continue_from_rw: Vec::new(),
            break_from_rw: Vec::new(),
            scopes: ScopeTree::default(),
            current_scope: vec!["G".to_owned()],
            ctx: None,
            table: Rc::new(table),
        }
    }

    fn with_ctx<R>(&mut self, ctx: IdContext, f: impl FnOnce(&mut Self) -> R) -> R {
        let prev = std::mem::replace(&mut self.ctx, Some(ctx));
        let out = f(self);
        self.ctx = prev;
        out
    }

    // Occurrence recording --------------------------------------------------

    fn occurrence_of(&mut self, ix: NodeIndex, name: &str) {
        let symbol = self.graph.intern_symbol(name);
        self.graph.add_relation(ix, symbol, EdgeLabel::OccurrenceOf);
    }

    fn record_write(&mut self, node: Node<'t>) {
        let ix = self.graph.intern_ast(node);
        let name = text_of(node, self.src);
        let qname = self.scopes.register(&self.current_scope, &name);
        debug!(target: "dataflow", "write {qname}");
        self.occurrence_of(ix, &name);
        self.rw.reads.insert(qname.clone(), HashSet::new());
        self.rw.writes.insert(qname, HashSet::from([ix]));
    }

    fn record_read(&mut self, node: Node<'t>) {
        let ix = self.graph.intern_ast(node);
        let name = text_of(node, self.src);
        let qname = self.scopes.qualname(&self.current_scope, &name);
        debug!(target: "dataflow", "read {qname}");
        self.occurrence_of(ix, &name);

        let previous = self.rw.reads.insert(qname.clone(), HashSet::from([ix]));
        for last_read in previous.unwrap_or_default() {
            self.graph
                .add_relation(last_read, ix, EdgeLabel::NextMayUse);
        }
        if let Some(writes) = self.rw.writes.get(&qname) {
            for &last_write in writes {
                self.graph
                    .add_relation(last_write, ix, EdgeLabel::LastMayWrite);
            }
        }
    }

    fn visit_identifier(&mut self, node: Node<'t>) -> Flow {
        match self.ctx {
            None | Some(IdContext::Read) => self.record_read(node),
            Some(IdContext::Write) => self.record_write(node),
        }
        Flow::Descend
    }

    // Scopes ----------------------------------------------------------------

    fn visit_block(&mut self, node: Node<'t>) -> Flow {
        self.current_scope.push("<block>".to_owned());
        walk_children(self, node);
        self.current_scope.pop();
        Flow::Prune
    }

    // Functions -------------------------------------------------------------

    fn visit_return_statement(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_children(v, node));

        if let Some(top) = self.returns_from_rw.last_mut() {
            top.merge(&self.rw);
        }
        self.rw = RwState::default();
        Flow::Prune
    }

    fn visit_method_declaration(&mut self, node: Node<'t>) -> Flow {
        self.returns_from_rw.push(RwState::default());
        let name = node
            .child_by_field_name("name")
            .map(|n| text_of(n, self.src))
            .unwrap_or_default();
        self.current_scope.push(name);

        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "parameters"));
        walk_field(self, node, "body");

        self.current_scope.pop();
        if let Some(returns) = self.returns_from_rw.pop() {
            self.rw.merge(&returns);
        }
        Flow::Prune
    }

    // Branches --------------------------------------------------------------

    fn visit_if_statement(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));

        let snapshot = self.rw.clone();
        walk_field(self, node, "consequence");

        let after_consequence = std::mem::replace(&mut self.rw, snapshot);
        walk_field(self, node, "alternative");

        self.rw.merge(&after_consequence);
        Flow::Prune
    }

    // Loops -----------------------------------------------------------------

    fn visit_continue_statement(&mut self, _node: Node<'t>) -> Flow {
        if let Some(top) = self.continue_from_rw.last_mut() {
            top.merge(&self.rw);
        }
        self.rw = RwState::default();
        Flow::Prune
    }

    fn visit_break_statement(&mut self, _node: Node<'t>) -> Flow {
        if let Some(top) = self.break_from_rw.last_mut() {
            top.merge(&self.rw);
        }
        self.rw = RwState::default();
        Flow::Prune
    }

    fn visit_while_statement(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));
        let after_zero = self.rw.clone();

        self.break_from_rw.push(RwState::default());
        self.continue_from_rw.push(RwState::default());

        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }

        // Second unroll: breaks from the first round are superseded, continue
        // joins start fresh.
        if let Some(top) = self.break_from_rw.last_mut() {
            *top = RwState::default();
        }
        self.continue_from_rw.push(RwState::default());

        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));
        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }

        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));

        self.rw.merge(&after_zero);
        if let Some(breaks) = self.break_from_rw.pop() {
            self.rw.merge(&breaks);
        }
        Flow::Prune
    }

    /// A `do` body always runs, so there is no zero-iteration path to join
    /// back in.
    fn visit_do_statement(&mut self, node: Node<'t>) -> Flow {
        self.break_from_rw.push(RwState::default());
        self.continue_from_rw.push(RwState::default());

        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }

        if let Some(top) = self.break_from_rw.last_mut() {
            *top = RwState::default();
        }
        self.continue_from_rw.push(RwState::default());

        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));
        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }

        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));

        if let Some(breaks) = self.break_from_rw.pop() {
            self.rw.merge(&breaks);
        }
        Flow::Prune
    }

    fn visit_for_statement(&mut self, node: Node<'t>) -> Flow {
        // Loop-local declarations live in their own scope segment.
        self.current_scope.push("<for>".to_owned());
        walk_field(self, node, "init");
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));

        let after_zero = self.rw.clone();

        self.break_from_rw.push(RwState::default());
        self.continue_from_rw.push(RwState::default());

        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }
        walk_field(self, node, "update");

        if let Some(top) = self.break_from_rw.last_mut() {
            *top = RwState::default();
        }
        self.continue_from_rw.push(RwState::default());

        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "condition"));
        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }
        walk_field(self, node, "update");

        self.rw.merge(&after_zero);
        if let Some(breaks) = self.break_from_rw.pop() {
            self.rw.merge(&breaks);
        }

        self.current_scope.pop();
        Flow::Prune
    }

    // Field access ----------------------------------------------------------

    /// Only the receiver is data flow; the member name is not a variable.
    fn visit_field_access(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "object"));
        Flow::Prune
    }

    fn visit_method_invocation(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "object"));
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "arguments"));
        Flow::Prune
    }

    fn visit_object_creation_expression(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "arguments"));
        Flow::Prune
    }

    // Assignments -----------------------------------------------------------

    fn visit_variable_declarator(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "value"));
        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "name"));
        Flow::Prune
    }

    fn visit_assignment_expression(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "right"));
        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "left"));
        Flow::Prune
    }

    /// `i++` reads the operand, then rewrites it.
    fn visit_update_expression(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_children(v, node));
        self.with_ctx(IdContext::Write, |v| walk_children(v, node));
        Flow::Prune
    }

    fn visit_lambda_expression(&mut self, node: Node<'t>) -> Flow {
        self.current_scope.push("<lambda>".to_owned());
        self.returns_from_rw.push(RwState::default());
        let snapshot = self.rw.clone();

        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "parameters"));
        walk_field(self, node, "body");

        self.rw = snapshot;
        self.current_scope.pop();
        self.returns_from_rw.pop();
        Flow::Prune
    }
}

impl<'t> Visitor<'t> for DataFlowVisitor<'_, '_, 't> {
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
fn dataflow_graph(src: &[u8]) -> CodeGraph {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_java::LANGUAGE))
        .unwrap();
    let tree = parser.parse(src, None).unwrap();
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Java);
    let mut v = DataFlowVisitor::new(&mut g, src);
    crate::visitor::walk(&mut v, tree.root_node());
    g
}

#[cfg(test)]
fn occurrence(g: &CodeGraph, text: &str, nth: usize) -> NodeIndex {
    g.tokens()
        .iter()
        .copied()
        .filter(|&t| g.node(t).name() == text)
        .nth(nth)
        .unwrap_or_else(|| panic!("no occurrence {nth} of `{text}`"))
}

#[cfg(test)]
fn has_edge(g: &CodeGraph, src: NodeIndex, dst: NodeIndex, label: EdgeLabel) -> bool {
    g.successors(src, Some(label)).any(|s| s == dst)
}

#[test]
fn declarator_write_reaches_the_next_read() {
    let g = dataflow_graph(b"class T { void m() { int x = 1; int y = x + 1; } }");
    let x_write = occurrence(&g, "x", 0);
    let x_read = occurrence(&g, "x", 1);

    assert!(has_edge(&g, x_write, x_read, EdgeLabel::LastMayWrite));

    let sym_of = |ix| {
        g.successors(ix, Some(EdgeLabel::OccurrenceOf))
            .next()
            .unwrap()
    };
    assert_eq!(sym_of(x_write), sym_of(x_read));
}

#[test]
fn parameters_flow_into_the_body() {
    let g = dataflow_graph(b"class T { int m(int a) { return a + 1; } }");
    let param = occurrence(&g, "a", 0);
    let read = occurrence(&g, "a", 1);

    assert!(has_edge(&g, param, read, EdgeLabel::LastMayWrite));
}

#[test]
fn update_expression_chains_reads_and_writes() {
    let g = dataflow_graph(b"class T { void m(int i) { i++; i++; } }");
    let param = occurrence(&g, "i", 0);
    let first = occurrence(&g, "i", 1);
    let second = occurrence(&g, "i", 2);

    assert!(has_edge(&g, param, first, EdgeLabel::LastMayWrite));
    assert!(has_edge(&g, first, second, EdgeLabel::LastMayWrite));
}

#[test]
fn branch_writes_both_reach_the_join_read() {
    // Unbraced arms keep all three writes in the same block scope.
    let g = dataflow_graph(
        b"class T { void m(boolean c) { int x = 0; if (c) x = 1; else x = 2; use(x); } }",
    );
    let decl_write = occurrence(&g, "x", 0);
    let then_write = occurrence(&g, "x", 1);
    let else_write = occurrence(&g, "x", 2);
    let read = occurrence(&g, "x", 3);

    assert!(has_edge(&g, then_write, read, EdgeLabel::LastMayWrite));
    assert!(has_edge(&g, else_write, read, EdgeLabel::LastMayWrite));
    // The initial declaration is overwritten on both paths.
    assert!(!has_edge(&g, decl_write, read, EdgeLabel::LastMayWrite));
}

#[test]
fn field_names_are_not_variables() {
    let g = dataflow_graph(b"class T { void m(A a) { int z = a.b; } }");
    let receiver = occurrence(&g, "a", 1);
    let member = occurrence(&g, "b", 0);

    assert_eq!(
        g.successors(receiver, Some(EdgeLabel::OccurrenceOf)).count(),
        1
    );
    assert_eq!(g.successors(member, Some(EdgeLabel::OccurrenceOf)).count(), 0);
}

#[test]
fn loop_body_write_reaches_its_own_read_on_the_second_unroll() {
    let g = dataflow_graph(b"class T { void m(int x) { while (c) { x = x + 1; } } }");
    // Occurrences: parameter, assignment target, right-hand-side read.
    let body_write = occurrence(&g, "x", 1);
    let body_read = occurrence(&g, "x", 2);

    assert!(has_edge(&g, body_write, body_read, EdgeLabel::LastMayWrite));
}
