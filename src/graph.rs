//! The labeled multi-edge program graph all analyses write into.
//!
//! Vertices are interned: AST-backed nodes by their position key, symbol
//! nodes by name. Edges are a set under `(source, label, target)`, so
//! re-running an analysis never grows the graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io::{self, Write};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;
use tree_sitter::Node;

use crate::Lang;
use crate::token::text_of;

/// The fixed edge alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    Child,
    Sibling,
    NextToken,
    ControlFlow,
    ReturnFrom,
    YieldFrom,
    LastMayWrite,
    NextMayUse,
    OccurrenceOf,
    AssignedFrom,
}

impl EdgeLabel {
    pub const ALL: [EdgeLabel; 10] = [
        EdgeLabel::Child,
        EdgeLabel::Sibling,
        EdgeLabel::NextToken,
        EdgeLabel::ControlFlow,
        EdgeLabel::ReturnFrom,
        EdgeLabel::YieldFrom,
        EdgeLabel::LastMayWrite,
        EdgeLabel::NextMayUse,
        EdgeLabel::OccurrenceOf,
        EdgeLabel::AssignedFrom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Child => "child",
            EdgeLabel::Sibling => "sibling",
            EdgeLabel::NextToken => "next_token",
            EdgeLabel::ControlFlow => "controlflow",
            EdgeLabel::ReturnFrom => "return_from",
            EdgeLabel::YieldFrom => "yield_from",
            EdgeLabel::LastMayWrite => "last_may_write",
            EdgeLabel::NextMayUse => "next_may_use",
            EdgeLabel::OccurrenceOf => "occurrence_of",
            EdgeLabel::AssignedFrom => "assigned_from",
        }
    }

    /// `child` and `sibling` mirror the tree itself; everything else is
    /// semantic overlay.
    pub fn is_syntax(&self) -> bool {
        matches!(self, EdgeLabel::Child | EdgeLabel::Sibling)
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position identity of an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    kind: &'static str,
    child_count: usize,
    start: (usize, usize),
    end: (usize, usize),
}

impl NodeKey {
    pub fn of(node: Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        NodeKey {
            kind: node.kind(),
            child_count: node.child_count(),
            start: (start.row, start.column),
            end: (end.row, end.column),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxInfo {
    pub kind: &'static str,
    pub child_count: usize,
    pub start: (usize, usize),
    pub end: (usize, usize),
}

impl SyntaxInfo {
    fn of(node: Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        SyntaxInfo {
            kind: node.kind(),
            child_count: node.child_count(),
            start: (start.row, start.column),
            end: (end.row, end.column),
        }
    }

    fn key(&self) -> NodeKey {
        NodeKey {
            kind: self.kind,
            child_count: self.child_count,
            start: self.start,
            end: self.end,
        }
    }
}

/// Vertex payload: a syntax node, a token-bearing leaf, or a free-floating
/// symbol.
#[derive(Debug, Clone)]
pub enum GraphNode {
    Syntax(SyntaxInfo),
    Token {
        syntax: SyntaxInfo,
        text: String,
        index: usize,
    },
    Symbol {
        name: String,
    },
}

impl GraphNode {
    /// Display name: node type, token text or symbol name.
    pub fn name(&self) -> &str {
        match self {
            GraphNode::Syntax(info) => info.kind,
            GraphNode::Token { text, .. } => text,
            GraphNode::Symbol { name } => name,
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, GraphNode::Token { .. })
    }

    pub fn token_index(&self) -> Option<usize> {
        match self {
            GraphNode::Token { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn syntax(&self) -> Option<&SyntaxInfo> {
        match self {
            GraphNode::Syntax(info) => Some(info),
            GraphNode::Token { syntax, .. } => Some(syntax),
            GraphNode::Symbol { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct CodeGraph {
    graph: DiGraph<GraphNode, EdgeLabel>,
    ast_index: HashMap<NodeKey, NodeIndex>,
    symbol_index: HashMap<String, NodeIndex>,
    edge_set: HashSet<(NodeIndex, EdgeLabel, NodeIndex)>,
    tokens: Vec<NodeIndex>,
    root: NodeIndex,
    lang: Lang,
}

impl CodeGraph {
    /// Build the vertex skeleton: one token vertex per leaf, chained with
    /// `next_token`, plus the interned root.
    pub fn new(root: Node<'_>, tokens: &[Node<'_>], src: &[u8], lang: Lang) -> Self {
        let mut graph = CodeGraph {
            graph: DiGraph::new(),
            ast_index: HashMap::new(),
            symbol_index: HashMap::new(),
            edge_set: HashSet::new(),
            tokens: Vec::with_capacity(tokens.len()),
            root: NodeIndex::end(),
            lang,
        };

        let mut prev = None;
        for (index, &token) in tokens.iter().enumerate() {
            let ix = graph.intern_token(token, src, index);
            if let Some(prev) = prev {
                graph.add_relation(prev, ix, EdgeLabel::NextToken);
            }
            prev = Some(ix);
        }
        graph.root = graph.intern_ast(root);
        graph
    }

    fn intern_token(&mut self, node: Node<'_>, src: &[u8], index: usize) -> NodeIndex {
        let key = NodeKey::of(node);
        if let Some(&ix) = self.ast_index.get(&key) {
            return ix;
        }
        let ix = self.graph.add_node(GraphNode::Token {
            syntax: SyntaxInfo::of(node),
            text: text_of(node, src),
            index,
        });
        self.ast_index.insert(key, ix);
        self.tokens.push(ix);
        ix
    }

    /// Vertex for `node`, created on first reference.
    pub fn intern_ast(&mut self, node: Node<'_>) -> NodeIndex {
        let key = NodeKey::of(node);
        if let Some(&ix) = self.ast_index.get(&key) {
            return ix;
        }
        let ix = self.graph.add_node(GraphNode::Syntax(SyntaxInfo::of(node)));
        self.ast_index.insert(key, ix);
        ix
    }

    /// Symbol vertex for `name`, created on first reference.
    pub fn intern_symbol(&mut self, name: &str) -> NodeIndex {
        if let Some(&ix) = self.symbol_index.get(name) {
            return ix;
        }
        let ix = self.graph.add_node(GraphNode::Symbol {
            name: name.to_owned(),
        });
        self.symbol_index.insert(name.to_owned(), ix);
        ix
    }

    /// Idempotent labeled edge insertion.
    pub fn add_relation(&mut self, src: NodeIndex, dst: NodeIndex, label: EdgeLabel) {
        if self.edge_set.insert((src, label, dst)) {
            debug!(target: "graph", "edge {} -> {} ({})", src.index(), dst.index(), label);
            self.graph.add_edge(src, dst, label);
        }
    }

    /// Edge between two AST nodes, interning both endpoints.
    pub fn relate_ast(&mut self, src: Node<'_>, dst: Node<'_>, label: EdgeLabel) {
        let src = self.intern_ast(src);
        let dst = self.intern_ast(dst);
        self.add_relation(src, dst, label);
    }

    pub fn has_node(&self, node: Node<'_>) -> bool {
        self.ast_index.contains_key(&NodeKey::of(node))
    }

    pub fn node(&self, ix: NodeIndex) -> &GraphNode {
        &self.graph[ix]
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn lang(&self) -> Lang {
        self.lang
    }

    pub fn tokens(&self) -> &[NodeIndex] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn successors(
        &self,
        ix: NodeIndex,
        label: Option<EdgeLabel>,
    ) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .edges_directed(ix, Direction::Outgoing)
            .filter(move |e| label.is_none_or(|l| *e.weight() == l))
            .map(|e| e.target())
    }

    pub fn predecessors(
        &self,
        ix: NodeIndex,
        label: Option<EdgeLabel>,
    ) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .edges_directed(ix, Direction::Incoming)
            .filter(move |e| label.is_none_or(|l| *e.weight() == l))
            .map(|e| e.source())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode)> + '_ {
        self.graph
            .node_indices()
            .map(move |ix| (ix, &self.graph[ix]))
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, EdgeLabel, NodeIndex)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), *e.weight(), e.target()))
    }

    pub fn edge_counts(&self) -> HashMap<EdgeLabel, usize> {
        let mut counts = HashMap::new();
        for e in self.graph.edge_references() {
            *counts.entry(*e.weight()).or_default() += 1;
        }
        counts
    }

    // Tokens-only projection ------------------------------------------------

    /// Project the graph down to its token vertices.
    ///
    /// Each inner node is replaced by its representer, the lexically leftmost
    /// token below it along `child` edges. Semantic edges are re-emitted
    /// between representers; `child` and `sibling` edges are dropped and the
    /// `next_token` chain is rebuilt.
    pub fn tokens_only(&self) -> CodeGraph {
        let mut out = CodeGraph {
            graph: DiGraph::new(),
            ast_index: HashMap::new(),
            symbol_index: HashMap::new(),
            edge_set: HashSet::new(),
            tokens: Vec::with_capacity(self.tokens.len()),
            root: NodeIndex::end(),
            lang: self.lang,
        };

        let mut token_map: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut prev = None;
        for &token in &self.tokens {
            let data = self.graph[token].clone();
            let ix = out.graph.add_node(data);
            if let GraphNode::Token { syntax, .. } = &out.graph[ix] {
                out.ast_index.insert(syntax.key(), ix);
            }
            out.tokens.push(ix);
            token_map.insert(token, ix);
            if let Some(prev) = prev {
                out.add_relation(prev, ix, EdgeLabel::NextToken);
            }
            prev = Some(ix);
        }
        out.root = out.tokens.first().copied().unwrap_or(NodeIndex::end());

        let representers = self.representers();
        for (src, label, dst) in self.edges() {
            if label.is_syntax() || label == EdgeLabel::NextToken {
                continue;
            }
            let (Some(&src_rep), Some(&dst_rep)) = (representers.get(&src), representers.get(&dst))
            else {
                continue;
            };
            let (Some(&src_ix), Some(&dst_ix)) = (token_map.get(&src_rep), token_map.get(&dst_rep))
            else {
                continue;
            };
            out.add_relation(src_ix, dst_ix, label);
        }
        out
    }

    /// Representer of every vertex that has one: tokens map to themselves,
    /// inner nodes to their leftmost token descendant, symbols to nothing.
    fn representers(&self) -> HashMap<NodeIndex, NodeIndex> {
        let mut representers = HashMap::new();
        for ix in self.graph.node_indices() {
            match &self.graph[ix] {
                GraphNode::Token { .. } => {
                    representers.insert(ix, ix);
                }
                GraphNode::Syntax(_) => {
                    if let Some(token) = self.leftmost_token(ix) {
                        representers.insert(ix, token);
                    }
                }
                GraphNode::Symbol { .. } => {}
            }
        }
        representers
    }

    fn leftmost_token(&self, start: NodeIndex) -> Option<NodeIndex> {
        let mut best: Option<(usize, NodeIndex)> = None;
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::from([start]);
        while let Some(ix) = queue.pop_front() {
            if let Some(index) = self.graph[ix].token_index() {
                if best.is_none_or(|(b, _)| index < b) {
                    best = Some((index, ix));
                }
                continue;
            }
            for succ in self.successors(ix, Some(EdgeLabel::Child)) {
                if seen.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }
        best.map(|(_, ix)| ix)
    }

    // DOT rendering ---------------------------------------------------------

    /// Write the graph as GraphViz text. Tokens are grouped in one same-rank
    /// cluster with the `next_token` chain drawn inside it.
    pub fn write_dot<W: Write>(
        &self,
        w: &mut W,
        edge_colors: &HashMap<EdgeLabel, String>,
    ) -> io::Result<()> {
        writeln!(w, "digraph {{")?;
        writeln!(w, "\tcompound=true;")?;

        for ix in self.graph.node_indices() {
            let node = &self.graph[ix];
            if node.is_token() {
                continue;
            }
            writeln!(
                w,
                "\tnode{}[shape=\"rectangle\", label=\"{}\"];",
                ix.index(),
                escape_label(node.name())
            )?;
        }

        writeln!(w, "\tsubgraph clusterNextToken {{")?;
        writeln!(w, "\t\tlabel=\"Tokens\";")?;
        writeln!(w, "\t\trank=\"same\";")?;
        for &token in &self.tokens {
            writeln!(
                w,
                "\t\tnode{}[shape=\"rectangle\", label=\"{}\"];",
                token.index(),
                escape_label(self.graph[token].name())
            )?;
        }
        for (src, label, dst) in self.edges() {
            if label == EdgeLabel::NextToken {
                writeln!(w, "\t\t{}", dot_edge(src, label, dst, edge_colors))?;
            }
        }
        writeln!(w, "\t}}")?;

        for (src, label, dst) in self.edges() {
            if label != EdgeLabel::NextToken {
                writeln!(w, "\t{}", dot_edge(src, label, dst, edge_colors))?;
            }
        }
        writeln!(w, "}}")
    }

    pub fn to_dot_string(&self, edge_colors: &HashMap<EdgeLabel, String>) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_dot(&mut buf, edge_colors);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl fmt::Display for CodeGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lang = match self.lang {
            Lang::Python => "Python",
            Lang::Java => "Java",
        };
        write!(f, "{}CodeGraph({})", lang, self.len())
    }
}

fn dot_edge(
    src: NodeIndex,
    label: EdgeLabel,
    dst: NodeIndex,
    edge_colors: &HashMap<EdgeLabel, String>,
) -> String {
    let color = edge_colors.get(&label).map_or("black", String::as_str);
    format!(
        "node{} -> node{} [label=\"{}\" color={}];",
        src.index(),
        dst.index(),
        label,
        color
    )
}

fn escape_label(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
fn python_graph(src: &[u8]) -> (tree_sitter::Tree, Vec<u8>) {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_python::LANGUAGE))
        .unwrap();
    (parser.parse(src, None).unwrap(), src.to_vec())
}

#[test]
fn token_chain_is_a_total_order() {
    let (tree, src) = python_graph(b"x = 1\ny = 2\n");
    let tokens = crate::token::tokenize(tree.root_node());
    let g = CodeGraph::new(tree.root_node(), &tokens, &src, Lang::Python);

    let chain = g.tokens();
    assert_eq!(chain.len(), 6);
    for pair in chain.windows(2) {
        let next: Vec<_> = g.successors(pair[0], Some(EdgeLabel::NextToken)).collect();
        assert_eq!(next, vec![pair[1]]);
    }
    // The last token has no successor.
    let last = chain[chain.len() - 1];
    assert_eq!(g.successors(last, Some(EdgeLabel::NextToken)).count(), 0);
}

#[test]
fn interning_is_by_position_key() {
    let (tree, src) = python_graph(b"x = 1\n");
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, &src, Lang::Python);

    let a = g.intern_ast(tree.root_node());
    let b = g.intern_ast(tree.root_node());
    assert_eq!(a, b);
    assert_eq!(a, g.root());
}

#[test]
fn add_relation_is_idempotent() {
    let (tree, src) = python_graph(b"x = 1\n");
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, &src, Lang::Python);

    let root = g.root();
    let first = g.tokens()[0];
    let before = g.edge_count();
    g.add_relation(root, first, EdgeLabel::Child);
    g.add_relation(root, first, EdgeLabel::Child);
    assert_eq!(g.edge_count(), before + 1);
}

#[test]
fn symbols_are_interned_by_name() {
    let (tree, src) = python_graph(b"x = 1\n");
    let tokens = crate::token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, &src, Lang::Python);

    let a = g.intern_symbol("x");
    let b = g.intern_symbol("x");
    let c = g.intern_symbol("y");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn dot_output_clusters_tokens() {
    let (tree, src) = python_graph(b"x = 1\n");
    let tokens = crate::token::tokenize(tree.root_node());
    let g = CodeGraph::new(tree.root_node(), &tokens, &src, Lang::Python);

    let dot = g.to_dot_string(&HashMap::new());
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("subgraph clusterNextToken"));
    assert!(dot.contains("label=\"next_token\" color=black"));
}
