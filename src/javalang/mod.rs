//! Java analyses: statement-level control flow with labeled jumps and
//! intraprocedural data flow, plus the method-snippet preprocessor.

pub mod cfg;
pub mod dataflow;

pub use cfg::ControlFlowVisitor;
pub use dataflow::DataFlowVisitor;

use std::borrow::Cow;

use tracing::debug;
use tree_sitter::{Language, Node, Parser, Tree};

use crate::errors::{CodeGraphError, GraphResult};
use crate::{SyntaxErrorPolicy, check_syntax};

/// Number of leading tokens contributed by the `public class Test {` wrapper.
const WRAPPER_TOKENS: usize = 4;

/// Parse Java source; a bare method body that fails on its own is wrapped in
/// a dummy class and re-parsed under the caller's syntax-error policy.
///
/// Returns the tree, the source that was actually parsed, and whether the
/// wrapper was applied.
pub(crate) fn parse_or_wrap(
    source: &[u8],
    policy: SyntaxErrorPolicy,
) -> GraphResult<(Tree, Cow<'_, [u8]>, bool)> {
    let mut parser = Parser::new();
    parser.set_language(&Language::from(tree_sitter_java::LANGUAGE))?;

    let tree = parser
        .parse(source, None)
        .ok_or(CodeGraphError::ParseFailed)?;
    if !tree.root_node().has_error() {
        return Ok((tree, Cow::Borrowed(source), false));
    }

    debug!(target: "graph", "bare parse failed, wrapping as a method snippet");
    let mut wrapped = b"public class Test {".to_vec();
    wrapped.extend_from_slice(source);
    wrapped.push(b'}');

    let tree = parser
        .parse(&wrapped, None)
        .ok_or(CodeGraphError::ParseFailed)?;
    check_syntax(&tree, policy)?;
    Ok((tree, Cow::Owned(wrapped), true))
}

/// Drop the wrapper tokens (`public class Test {` and the trailing `}`) from
/// a wrapped snippet's token stream.
pub(crate) fn strip_wrapper<'a, 't>(tokens: &'a [Node<'t>]) -> &'a [Node<'t>] {
    if tokens.len() <= WRAPPER_TOKENS + 1 {
        return &[];
    }
    &tokens[WRAPPER_TOKENS..tokens.len() - 1]
}

/// Re-root a wrapped snippet at the method declaration enclosing its first
/// token.
pub(crate) fn method_root<'t>(token: Node<'t>) -> Node<'t> {
    let mut root = token;
    while let Some(parent) = root.parent() {
        root = parent;
        if root.kind() == "method_declaration" {
            break;
        }
    }
    root
}
