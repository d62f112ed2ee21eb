//! Intraprocedural data flow for Python.
//!
//! Identifier occurrences are recorded as reads or writes depending on the
//! surrounding construct; the visitor keeps last-read and last-write
//! frontiers per qualified name, forks them at branches and joins them back
//! with a setwise union. Loops are unrolled exactly twice instead of running
//! to a fixpoint; that is enough for one `last_may_write` /` next_may_use`
//! hop across the back-edge.

use std::collections::HashSet;
use std::rc::Rc;

use petgraph::graph::NodeIndex;
use tracing::debug;
use tree_sitter::Node;

use crate::graph::{CodeGraph, EdgeLabel};
use crate::scope::{IdContext, RwState, ScopeTree, merge_flows};
use crate::token::text_of;
use crate::visitor::{Dispatch, Flow, Visitor, walk, walk_children, walk_field};

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
        table.on("comprehension", Self::visit_comprehension);
        table.on("list_comprehension", Self::visit_comprehension);
        table.on("dictionary_comprehension", Self::visit_comprehension);
        table.on("set_comprehension", Self::visit_comprehension);
        table.on("generator_expression", Self::visit_comprehension);
        table.on("for_in_clause", Self::visit_for_in_clause);
        table.on("if_clause", Self::visit_if_clause);
        table.on("parameters", Self::visit_parameters);
        table.on("default_parameter", Self::visit_default_parameter);
        table.on("typed_parameter", Self::visit_typed_parameter);
        table.on("assignment", Self::visit_assignment);
        table.on("annotated_assignment", Self::visit_assignment);
        table.on("augmented_assignment", Self::visit_augmented_assignment);
        table.on("attribute", Self::visit_attribute);
        table.on("if_statement", Self::visit_if_statement);
        table.on("conditional_expression", Self::visit_conditional_expression);
        table.on("continue_statement", Self::visit_continue_statement);
        table.on("break_statement", Self::visit_break_statement);
        table.on("while_statement", Self::visit_while_statement);
        table.on("for_statement", Self::visit_for_statement);
        table.on("return_statement", Self::visit_return_statement);
        table.on("function_definition", Self::visit_function_definition);
        table.on("named_expression", Self::visit_named_expression);
        table.on("subscript", Self::visit_subscript);
        table.on("with_item", Self::visit_with_item);
        table.on("lambda", Self::visit_lambda);
        table.on("string", Self::visit_string);
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

    fn visit_comprehension(&mut self, node: Node<'t>) -> Flow {
        self.current_scope.push("<comprehension>".to_owned());

        let mut cursor = node.walk();
        let clauses: Vec<Node<'t>> = node
            .children(&mut cursor)
            .filter(|c| c.kind().ends_with("clause"))
            .collect();
        drop(cursor);
        for clause in clauses {
            walk(self, clause);
        }
        walk_field(self, node, "body");

        self.current_scope.pop();
        Flow::Prune
    }

    fn visit_for_in_clause(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "left"));
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "right"));
        Flow::Prune
    }

    fn visit_if_clause(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_children(v, node));
        Flow::Prune
    }

    // Parameters ------------------------------------------------------------

    fn visit_parameters(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Write, |v| walk_children(v, node));
        Flow::Prune
    }

    fn visit_default_parameter(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "name");
        Flow::Prune
    }

    fn visit_typed_parameter(&mut self, node: Node<'t>) -> Flow {
        if let Some(first) = node.child(0) {
            walk(self, first);
        }
        Flow::Prune
    }

    // Assignments -----------------------------------------------------------

    fn visit_assignment(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "right"));
        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "left"));
        Flow::Prune
    }

    /// The target of `x += …` is read before it is rewritten.
    fn visit_augmented_assignment(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "left"));
        self.visit_assignment(node)
    }

    fn visit_attribute(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "object"));
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

    fn visit_conditional_expression(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| {
            let mut cursor = node.walk();
            let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
            drop(cursor);
            if children.len() != 5 {
                return Flow::Descend;
            }
            let (if_node, condition, else_node) = (children[0], children[2], children[4]);
            walk(v, condition);

            let reads_snapshot = v.rw.reads.clone();
            walk(v, if_node);

            let after_if = std::mem::replace(&mut v.rw.reads, reads_snapshot);
            walk(v, else_node);

            merge_flows(&mut v.rw.reads, &after_if);
            Flow::Prune
        })
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
        walk_field(self, node, "alternative");

        if let Some(breaks) = self.break_from_rw.pop() {
            self.rw.merge(&breaks);
        }
        Flow::Prune
    }

    fn visit_for_statement(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "right"));
        let after_zero = self.rw.clone();

        self.break_from_rw.push(RwState::default());
        self.continue_from_rw.push(RwState::default());

        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "left"));
        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }

        if let Some(top) = self.break_from_rw.last_mut() {
            *top = RwState::default();
        }
        self.continue_from_rw.push(RwState::default());

        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "left"));
        walk_field(self, node, "body");
        if let Some(continues) = self.continue_from_rw.pop() {
            self.rw.merge(&continues);
        }

        self.rw.merge(&after_zero);
        walk_field(self, node, "alternative");

        if let Some(breaks) = self.break_from_rw.pop() {
            self.rw.merge(&breaks);
        }
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

    fn visit_function_definition(&mut self, node: Node<'t>) -> Flow {
        self.returns_from_rw.push(RwState::default());
        let name = node
            .child_by_field_name("name")
            .map(|n| text_of(n, self.src))
            .unwrap_or_default();
        self.current_scope.push(name);

        walk_field(self, node, "parameters");
        walk_field(self, node, "body");

        self.current_scope.pop();
        if let Some(returns) = self.returns_from_rw.pop() {
            self.rw.merge(&returns);
        }
        Flow::Prune
    }

    // Misc ------------------------------------------------------------------

    fn visit_named_expression(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "value"));
        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "name"));
        Flow::Prune
    }

    fn visit_subscript(&mut self, node: Node<'t>) -> Flow {
        walk_field(self, node, "value");
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "subscript"));
        Flow::Prune
    }

    fn visit_with_item(&mut self, node: Node<'t>) -> Flow {
        self.with_ctx(IdContext::Read, |v| walk_field(v, node, "value"));
        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "alias"));
        Flow::Prune
    }

    /// A lambda body sees the surrounding frontier, but whatever it does to
    /// it is discarded on exit.
    fn visit_lambda(&mut self, node: Node<'t>) -> Flow {
        let snapshot = self.rw.clone();

        self.with_ctx(IdContext::Write, |v| walk_field(v, node, "parameters"));
        walk_field(self, node, "body");

        self.rw = snapshot;
        Flow::Prune
    }

    // f-string subexpressions are not analyzed.
    fn visit_string(&mut self, _node: Node<'t>) -> Flow {
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
        .set_language(&tree_sitter::Language::from(tree_sitter_python::LANGUAGE))
        .unwrap();
    let tree = parser.parse(src, None).unwrap();
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Python);
    let mut v = DataFlowVisitor::new(&mut g, src);
    walk(&mut v, tree.root_node());
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
fn straight_line_write_then_read() {
    let g = dataflow_graph(b"x = 1\ny = x + 1\n");
    let x_write = occurrence(&g, "x", 0);
    let x_read = occurrence(&g, "x", 1);

    assert!(has_edge(&g, x_write, x_read, EdgeLabel::LastMayWrite));

    // Both occurrences bind to the same symbol vertex.
    let sym_of = |ix| {
        g.successors(ix, Some(EdgeLabel::OccurrenceOf))
            .next()
            .unwrap()
    };
    assert_eq!(sym_of(x_write), sym_of(x_read));
}

#[test]
fn branch_writes_both_reach_the_join_read() {
    let g = dataflow_graph(b"if c:\n    x = 1\nelse:\n    x = 2\nprint(x)\n");
    let then_write = occurrence(&g, "x", 0);
    let else_write = occurrence(&g, "x", 1);
    let read = occurrence(&g, "x", 2);

    assert!(has_edge(&g, then_write, read, EdgeLabel::LastMayWrite));
    assert!(has_edge(&g, else_write, read, EdgeLabel::LastMayWrite));
}

#[test]
fn loop_body_write_reaches_its_own_read_on_the_second_unroll() {
    let g = dataflow_graph(b"while c:\n    x = x + 1\n");
    let x_write = occurrence(&g, "x", 0);
    let x_read = occurrence(&g, "x", 1);

    assert!(has_edge(&g, x_write, x_read, EdgeLabel::LastMayWrite));
    // The re-walked condition reads chain to themselves.
    let c = occurrence(&g, "c", 0);
    assert!(has_edge(&g, c, c, EdgeLabel::NextMayUse));
}

#[test]
fn comprehension_binds_its_own_variable() {
    let g = dataflow_graph(b"ys = [x for x in xs]\n");
    // Lexically the body `x` comes first, the clause target second.
    let body_read = occurrence(&g, "x", 0);
    let clause_write = occurrence(&g, "x", 1);

    assert!(has_edge(&g, clause_write, body_read, EdgeLabel::LastMayWrite));
}

#[test]
fn lambda_effects_are_discarded() {
    let g = dataflow_graph(b"f = lambda a: a + b\nc = a\n");
    let param = occurrence(&g, "a", 0);
    let body_read = occurrence(&g, "a", 1);
    let outer_read = occurrence(&g, "a", 2);

    assert!(has_edge(&g, param, body_read, EdgeLabel::LastMayWrite));
    // The parameter write was discarded with the lambda frontier.
    assert!(!has_edge(&g, param, outer_read, EdgeLabel::LastMayWrite));
}

#[test]
fn function_parameters_flow_into_the_body() {
    let g = dataflow_graph(b"def f(a):\n    b = a\n");
    let param = occurrence(&g, "a", 0);
    let read = occurrence(&g, "a", 1);

    assert!(has_edge(&g, param, read, EdgeLabel::LastMayWrite));
}

#[test]
fn augmented_assignment_reads_before_writing() {
    let g = dataflow_graph(b"x = 1\nx += 2\n");
    let first_write = occurrence(&g, "x", 0);
    let target = occurrence(&g, "x", 1);

    assert!(has_edge(&g, first_write, target, EdgeLabel::LastMayWrite));
}

#[test]
fn strings_are_skipped() {
    let g = dataflow_graph(b"x = \"a + b\"\n");
    // Only `x` binds a symbol; nothing inside the string literal does.
    let x = occurrence(&g, "x", 0);
    assert_eq!(g.successors(x, Some(EdgeLabel::OccurrenceOf)).count(), 1);
    let strings: Vec<_> = g
        .tokens()
        .iter()
        .copied()
        .filter(|&t| g.node(t).name().contains('a'))
        .collect();
    for t in strings {
        assert_eq!(g.successors(t, Some(EdgeLabel::OccurrenceOf)).count(), 0);
    }
}
