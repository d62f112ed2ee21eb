use tree_sitter::Node;

/// Node kinds that never become tokens.
static COMMENT_KINDS: phf::Set<&'static str> = phf::phf_set! {
    "comment",
    "line_comment",
    "block_comment",
};

/// Return the source text of `node`.
pub(crate) fn text_of(node: Node<'_>, src: &[u8]) -> String {
    String::from_utf8_lossy(&src[node.byte_range()]).into_owned()
}

/// Collect the leaves of the tree rooted at `root` in lexical order.
///
/// Comments and zero-width (missing) leaves are dropped; everything else,
/// including punctuation and keywords, becomes a token.
pub fn tokenize<'t>(root: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    collect(root, &mut out);
    out
}

fn collect<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    if node.child_count() == 0 {
        if !COMMENT_KINDS.contains(node.kind()) && node.start_byte() < node.end_byte() {
            out.push(node);
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(child, out);
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
fn tokenizes_leaves_in_order() {
    let src = b"x = 1\n";
    let tree = parse_python(src);
    let tokens = tokenize(tree.root_node());

    let texts: Vec<String> = tokens.iter().map(|t| text_of(*t, src)).collect();
    assert_eq!(texts, vec!["x", "=", "1"]);
}

#[test]
fn comments_are_not_tokens() {
    let src = b"x = 1  # assign\ny = 2\n";
    let tree = parse_python(src);
    let tokens = tokenize(tree.root_node());

    let texts: Vec<String> = tokens.iter().map(|t| text_of(*t, src)).collect();
    assert_eq!(texts, vec!["x", "=", "1", "y", "=", "2"]);
}
