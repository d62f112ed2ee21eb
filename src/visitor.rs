//! Iterative AST walker with per-node-type and per-field dispatch.
//!
//! Analysis passes register handlers in a [`Dispatch`] table and drive it
//! through [`walk`]. A handler may return [`Flow::Prune`] to skip the subtree
//! below the current node; handlers are free to re-enter the walker on any
//! child, which is how the structured passes (control flow, data flow)
//! schedule their sub-walks.

use std::collections::HashMap;
#[cfg(test)]
use std::rc::Rc;

use tree_sitter::Node;

/// Verdict of a handler: keep descending or skip the subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Descend,
    Prune,
}

pub type Handler<'t, V> = fn(&mut V, Node<'t>) -> Flow;

/// A visitor is anything that can be entered at a node.
///
/// Most implementations delegate to a [`Dispatch`] table; `Compose` fans a
/// node out to several visitors at once.
pub trait Visitor<'t> {
    fn enter(&mut self, node: Node<'t>) -> Flow;
}

/// Two-level handler table keyed by node type and by (type, field) edge.
///
/// Registration under a name with an underscore is ambiguous: `foo_bar` can
/// mean the node type `foo_bar` or the field `bar` of a `foo` node. Both
/// interpretations are installed; tree-sitter grammars only ever realize one
/// of them, and a later registration under the same key wins.
pub struct Dispatch<'t, V> {
    types: HashMap<&'static str, Handler<'t, V>>,
    fields: HashMap<&'static str, Vec<(&'static str, Handler<'t, V>)>>,
    catch_all: Option<Handler<'t, V>>,
}

/// An ERROR subtree may not be a well-formed tree, so the walker must never
/// descend into one. Installed by default; visitors may re-register.
fn prune_subtree<V>(_: &mut V, _: Node<'_>) -> Flow {
    Flow::Prune
}

impl<'t, V> Dispatch<'t, V> {
    pub fn new() -> Self {
        let mut dispatch = Dispatch {
            types: HashMap::new(),
            fields: HashMap::new(),
            catch_all: None,
        };
        dispatch.types.insert("ERROR", prune_subtree::<V>);
        dispatch
    }

    /// Register `handler` under `name`, installing both readings of the name.
    pub fn on(&mut self, name: &'static str, handler: Handler<'t, V>) {
        self.types.insert(name, handler);
        match name.rsplit_once('_') {
            Some((ty, field)) => self.field_entry(ty, field, handler),
            None => self.field_entry("", name, handler),
        }
    }

    /// Register `handler` for the node type `name` only, skipping the
    /// field-edge reading of the name.
    pub fn on_type(&mut self, name: &'static str, handler: Handler<'t, V>) {
        self.types.insert(name, handler);
    }

    /// Register the catch-all handler, run at every node whose type handler
    /// did not prune.
    pub fn on_any(&mut self, handler: Handler<'t, V>) {
        self.catch_all = Some(handler);
    }

    fn field_entry(&mut self, ty: &'static str, field: &'static str, handler: Handler<'t, V>) {
        let entries = self.fields.entry(ty).or_default();
        match entries.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = handler,
            None => entries.push((field, handler)),
        }
    }

    /// Run the table at `node`: type handler, then catch-all, then field
    /// handlers on the resolved field children. The first prune wins.
    pub fn run(&self, visitor: &mut V, node: Node<'t>) -> Flow {
        if let Some(&handler) = self.types.get(node.kind()) {
            if handler(visitor, node) == Flow::Prune {
                return Flow::Prune;
            }
        }
        if let Some(handler) = self.catch_all {
            if handler(visitor, node) == Flow::Prune {
                return Flow::Prune;
            }
        }
        if let Some(entries) = self.fields.get(node.kind()) {
            for &(field, handler) in entries {
                if let Some(child) = node.child_by_field_name(field) {
                    if handler(visitor, child) == Flow::Prune {
                        return Flow::Prune;
                    }
                }
            }
        }
        Flow::Descend
    }

    #[cfg(test)]
    pub(crate) fn handles_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    #[cfg(test)]
    pub(crate) fn handles_field(&self, ty: &str, field: &str) -> bool {
        self.fields
            .get(ty)
            .is_some_and(|entries| entries.iter().any(|(f, _)| *f == field))
    }
}

impl<'t, V> Default for Dispatch<'t, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-order walk of the subtree rooted at `root`.
///
/// The walker is iterative and keeps only the current node: forward movement
/// is first child, else next sibling, else the nearest ancestor sibling, and
/// never above `root`.
pub fn walk<'t, V: Visitor<'t> + ?Sized>(visitor: &mut V, root: Node<'t>) {
    let mut current = root;
    loop {
        let flow = visitor.enter(current);

        let mut next = None;
        if flow == Flow::Descend {
            next = current.child(0);
        }
        if next.is_none() {
            next = forward(current, root);
        }
        match next {
            Some(node) => current = node,
            None => return,
        }
    }
}

pub fn walk_opt<'t, V: Visitor<'t> + ?Sized>(visitor: &mut V, node: Option<Node<'t>>) {
    if let Some(node) = node {
        walk(visitor, node);
    }
}

pub fn walk_field<'t, V: Visitor<'t> + ?Sized>(visitor: &mut V, node: Node<'t>, field: &str) {
    walk_opt(visitor, node.child_by_field_name(field));
}

pub fn walk_children<'t, V: Visitor<'t> + ?Sized>(visitor: &mut V, node: Node<'t>) {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    drop(cursor);
    for child in children {
        walk(visitor, child);
    }
}

fn fingerprint(node: Node<'_>) -> (&'static str, usize, usize) {
    (node.kind(), node.start_byte(), node.end_byte())
}

/// Next sibling of `node` or of the nearest ancestor below `root`.
///
/// A sibling with the same type and span as the node just visited would send
/// the walk in a circle; malformed subtrees can produce one, so it is treated
/// as absent.
fn forward<'t>(node: Node<'t>, root: Node<'t>) -> Option<Node<'t>> {
    let visited = fingerprint(node);
    let mut cursor = node;
    loop {
        if cursor == root {
            return None;
        }
        if let Some(sibling) = cursor.next_sibling() {
            if fingerprint(sibling) != visited {
                return Some(sibling);
            }
        }
        cursor = cursor.parent()?;
    }
}

/// Ordered bundle of visitors driven over one walk; the first prune wins.
pub struct Compose<'v, 't> {
    visitors: Vec<&'v mut dyn Visitor<'t>>,
}

impl<'v, 't> Compose<'v, 't> {
    pub fn new(visitors: Vec<&'v mut dyn Visitor<'t>>) -> Self {
        Compose { visitors }
    }
}

impl<'t> Visitor<'t> for Compose<'_, 't> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        for visitor in self.visitors.iter_mut() {
            if visitor.enter(node) == Flow::Prune {
                return Flow::Prune;
            }
        }
        Flow::Descend
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
struct KindCounter<'t> {
    counts: HashMap<&'static str, usize>,
    table: Rc<Dispatch<'t, Self>>,
}

#[cfg(test)]
impl<'t> KindCounter<'t> {
    fn new(pruned: &'static [&'static str]) -> Self {
        let mut table = Dispatch::new();
        table.on_any(Self::visit);
        for &kind in pruned {
            table.on_type(kind, |_, _| Flow::Prune);
        }
        KindCounter {
            counts: HashMap::new(),
            table: Rc::new(table),
        }
    }

    fn visit(&mut self, node: Node<'t>) -> Flow {
        *self.counts.entry(node.kind()).or_default() += 1;
        Flow::Descend
    }
}

#[cfg(test)]
impl<'t> Visitor<'t> for KindCounter<'t> {
    fn enter(&mut self, node: Node<'t>) -> Flow {
        let table = Rc::clone(&self.table);
        table.run(self, node)
    }
}

#[cfg(test)]
fn parse_python(src: &[u8]) -> tree_sitter::Tree {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter::Language::from(tree_sitter_python::LANGUAGE))
        .unwrap();
    parser.parse(src, None).unwrap()
}

#[test]
fn walk_visits_every_node_of_a_small_tree() {
    let tree = parse_python(b"x = 1\n");
    let mut counter = KindCounter::new(&[]);
    walk(&mut counter, tree.root_node());

    assert_eq!(counter.counts["module"], 1);
    assert_eq!(counter.counts["expression_statement"], 1);
    assert_eq!(counter.counts["assignment"], 1);
    assert_eq!(counter.counts["identifier"], 1);
    assert_eq!(counter.counts["integer"], 1);
}

#[test]
fn pruning_skips_the_subtree() {
    let tree = parse_python(b"def f():\n    return 1\nx = 2\n");
    let mut counter = KindCounter::new(&["function_definition"]);
    walk(&mut counter, tree.root_node());

    // Nothing below the function definition is visited; the module-level
    // assignment after it still is.
    assert!(!counter.counts.contains_key("return_statement"));
    assert_eq!(counter.counts["assignment"], 1);
}

#[test]
fn error_nodes_are_pruned_by_default() {
    let tree = parse_python(b"def f(:\n");
    assert!(tree.root_node().has_error());

    let mut counter = KindCounter::new(&[]);
    walk(&mut counter, tree.root_node());
    assert!(!counter.counts.contains_key("ERROR"));
}

#[test]
fn register_installs_both_readings() {
    let mut table: Dispatch<'_, KindCounter<'_>> = Dispatch::new();
    table.on("foo_bar", |_, _| Flow::Descend);

    assert!(table.handles_type("foo_bar"));
    assert!(table.handles_field("foo", "bar"));

    table.on("foo", |_, _| Flow::Descend);
    assert!(table.handles_type("foo"));
    assert!(table.handles_field("", "foo"));
}

#[test]
fn compose_short_circuits_on_first_prune() {
    let tree = parse_python(b"def f():\n    return 1\n");

    let mut pruner = KindCounter::new(&["function_definition"]);
    let mut counter = KindCounter::new(&[]);
    {
        let mut composed = Compose::new(vec![&mut pruner, &mut counter]);
        walk(&mut composed, tree.root_node());
    }

    // The pruner cut the composition short at the function definition, so the
    // second visitor saw neither it nor anything below it.
    assert!(!counter.counts.contains_key("function_definition"));
    assert!(!counter.counts.contains_key("return_statement"));
    assert!(counter.counts.contains_key("module"));
}
