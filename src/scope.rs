//! Scoped read/write tracking shared by the data-flow visitors.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;

/// Polarity of the identifier occurrences in the current subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdContext {
    Read,
    Write,
}

pub(crate) type FlowMap = HashMap<String, HashSet<NodeIndex>>;

/// Last-read / last-write frontiers, forked and joined at branch points.
#[derive(Debug, Default, Clone)]
pub(crate) struct RwState {
    pub reads: FlowMap,
    pub writes: FlowMap,
}

impl RwState {
    pub fn merge(&mut self, other: &RwState) {
        merge_flows(&mut self.reads, &other.reads);
        merge_flows(&mut self.writes, &other.writes);
    }
}

pub(crate) fn merge_flows(into: &mut FlowMap, from: &FlowMap) {
    for (name, nodes) in from {
        into.entry(name.clone()).or_default().extend(nodes);
    }
}

/// Tree of declared names; the scope path is an explicit stack of segments
/// because scope entry and exit are driven by the walk, not by call frames.
#[derive(Debug, Default)]
pub(crate) struct ScopeTree {
    children: HashMap<String, ScopeTree>,
    vars: HashSet<String>,
}

impl ScopeTree {
    /// Declare `name` in the scope at `path` and return its qualified name.
    pub fn register(&mut self, path: &[String], name: &str) -> String {
        let mut scope = self;
        for segment in path {
            scope = scope.children.entry(segment.clone()).or_default();
        }
        scope.vars.insert(name.to_owned());
        let mut parts: Vec<&str> = path.iter().map(String::as_str).collect();
        parts.push(name);
        parts.join(".")
    }

    /// Resolve `name` against `path`, dropping inner segments until one
    /// declares it (or only the outermost remains).
    pub fn qualname(&self, path: &[String], name: &str) -> String {
        let mut candidates: Vec<&str> = Vec::new();
        let mut declared: Vec<&HashSet<String>> = Vec::new();
        let mut scope = self;
        for segment in path {
            match scope.children.get(segment) {
                Some(child) => {
                    candidates.push(segment);
                    declared.push(&child.vars);
                    scope = child;
                }
                None => break,
            }
        }
        while candidates.len() > 1 && !declared[candidates.len() - 1].contains(name) {
            candidates.pop();
            declared.pop();
        }
        candidates.push(name);
        candidates.join(".")
    }
}

#[cfg(test)]
fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

#[test]
fn qualname_resolves_to_the_declaring_scope() {
    let mut scopes = ScopeTree::default();
    let outer = path(&["G"]);
    let inner = path(&["G", "f", "<block>"]);

    assert_eq!(scopes.register(&outer, "x"), "G.x");
    assert_eq!(scopes.register(&inner, "y"), "G.f.<block>.y");

    // `y` is local, `x` falls through to the global scope.
    assert_eq!(scopes.qualname(&inner, "y"), "G.f.<block>.y");
    assert_eq!(scopes.qualname(&inner, "x"), "G.x");
}

#[test]
fn unknown_names_resolve_to_the_outermost_known_scope() {
    let mut scopes = ScopeTree::default();
    scopes.register(&path(&["G"]), "x");

    assert_eq!(scopes.qualname(&path(&["G", "f"]), "nope"), "G.nope");
}

#[test]
fn shadowing_prefers_the_innermost_declaration() {
    let mut scopes = ScopeTree::default();
    scopes.register(&path(&["G"]), "x");
    scopes.register(&path(&["G", "f"]), "x");

    assert_eq!(scopes.qualname(&path(&["G", "f"]), "x"), "G.f.x");
    assert_eq!(scopes.qualname(&path(&["G"]), "x"), "G.x");
}

#[test]
fn merge_unions_frontiers_pointwise() {
    let mut a = RwState::default();
    let mut b = RwState::default();
    a.reads
        .insert("G.x".into(), HashSet::from([NodeIndex::new(1)]));
    b.reads
        .insert("G.x".into(), HashSet::from([NodeIndex::new(2)]));
    b.writes
        .insert("G.y".into(), HashSet::from([NodeIndex::new(3)]));

    a.merge(&b);
    assert_eq!(a.reads["G.x"].len(), 2);
    assert_eq!(a.writes["G.y"].len(), 1);
}
