//! Program graphs over tree-sitter parses.
//!
//! [`codegraph`] turns Python or Java source into a labeled multi-edge
//! directed graph: the token stream and tree skeleton, statement-level
//! control flow, and intraprocedural data flow over named variables. The
//! result feeds representation-learning pipelines, so the analyses favor a
//! fixed, reproducible schedule over precision (loops are unrolled twice,
//! no fixpoints, no interprocedural reasoning).

pub mod config;
pub mod errors;
pub mod graph;
pub mod javalang;
pub mod pylang;
pub mod relations;
mod scope;
pub mod token;
pub mod visitor;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser, Tree};

pub use crate::errors::{CodeGraphError, GraphResult};
pub use crate::graph::{CodeGraph, EdgeLabel};
use crate::relations::AstRelationVisitor;
use crate::visitor::walk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Python,
    Java,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Python => "python",
            Lang::Java => "java",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Lang> {
        match ext {
            "py" => Some(Lang::Python),
            "java" => Some(Lang::Java),
            _ => None,
        }
    }

    fn language(&self) -> Language {
        match self {
            Lang::Python => Language::from(tree_sitter_python::LANGUAGE),
            Lang::Java => Language::from(tree_sitter_java::LANGUAGE),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = CodeGraphError;

    fn from_str(s: &str) -> GraphResult<Self> {
        match s {
            "python" | "py" => Ok(Lang::Python),
            "java" => Ok(Lang::Java),
            other => Err(CodeGraphError::UnsupportedLanguage(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Analysis {
    Ast,
    Cfg,
    Dataflow,
    SubCfg,
}

impl Analysis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Analysis::Ast => "ast",
            Analysis::Cfg => "cfg",
            Analysis::Dataflow => "dataflow",
            Analysis::SubCfg => "subcfg",
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Analysis {
    type Err = CodeGraphError;

    fn from_str(s: &str) -> GraphResult<Self> {
        match s {
            "ast" => Ok(Analysis::Ast),
            "cfg" => Ok(Analysis::Cfg),
            "dataflow" => Ok(Analysis::Dataflow),
            "subcfg" => Ok(Analysis::SubCfg),
            other => Err(CodeGraphError::UnknownAnalysis {
                lang: "any language".to_owned(),
                name: other.to_owned(),
            }),
        }
    }
}

/// What to do when the parser reports a syntax error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxErrorPolicy {
    #[default]
    Raise,
    Warn,
    Ignore,
}

impl FromStr for SyntaxErrorPolicy {
    type Err = CodeGraphError;

    fn from_str(s: &str) -> GraphResult<Self> {
        match s {
            "raise" => Ok(SyntaxErrorPolicy::Raise),
            "warn" => Ok(SyntaxErrorPolicy::Warn),
            "ignore" => Ok(SyntaxErrorPolicy::Ignore),
            other => Err(CodeGraphError::Msg(format!(
                "unknown syntax-error policy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Analyses to run, in order; `None` means ast, cfg and dataflow.
    pub analyses: Option<Vec<Analysis>>,
    pub syntax_error: SyntaxErrorPolicy,
}

const DEFAULT_ANALYSES: [Analysis; 3] = [Analysis::Ast, Analysis::Cfg, Analysis::Dataflow];

pub fn available_analyses(lang: Lang) -> &'static [Analysis] {
    match lang {
        Lang::Python => &[
            Analysis::Ast,
            Analysis::Cfg,
            Analysis::Dataflow,
            Analysis::SubCfg,
        ],
        Lang::Java => &[Analysis::Ast, Analysis::Cfg, Analysis::Dataflow],
    }
}

/// Build the program graph for `source`.
///
/// Parses, tokenizes, then runs the requested analyses in order over one
/// shared graph. Failure is all-or-nothing; a partial graph is never
/// returned.
pub fn codegraph(source: &[u8], lang: Lang, opts: &Options) -> GraphResult<CodeGraph> {
    let (tree, src, wrapped) = match lang {
        Lang::Python => {
            let mut parser = Parser::new();
            parser.set_language(&lang.language())?;
            let tree = parser
                .parse(source, None)
                .ok_or(CodeGraphError::ParseFailed)?;
            check_syntax(&tree, opts.syntax_error)?;
            (tree, Cow::Borrowed(source), false)
        }
        Lang::Java => javalang::parse_or_wrap(source, opts.syntax_error)?,
    };

    let all_tokens = token::tokenize(tree.root_node());
    let tokens: &[Node<'_>] = if wrapped {
        javalang::strip_wrapper(&all_tokens)
    } else {
        &all_tokens
    };
    if tokens.is_empty() {
        return Err(CodeGraphError::EmptyProgram);
    }

    let analyses = resolve_analyses(lang, opts.analyses.as_deref())?;

    let root = if wrapped {
        javalang::method_root(tokens[0])
    } else {
        default_root(&tree)
    };

    let mut graph = CodeGraph::new(root, tokens, &src, lang);
    for analysis in analyses {
        debug!(target: "graph", "running {analysis} for {lang}");
        run_analysis(analysis, lang, &mut graph, root, &src);
    }
    Ok(graph)
}

fn resolve_analyses(lang: Lang, requested: Option<&[Analysis]>) -> GraphResult<Vec<Analysis>> {
    let requested = requested.unwrap_or(&DEFAULT_ANALYSES);
    for analysis in requested {
        if !available_analyses(lang).contains(analysis) {
            return Err(CodeGraphError::UnknownAnalysis {
                lang: lang.to_string(),
                name: analysis.as_str().to_owned(),
            });
        }
    }
    Ok(requested.to_vec())
}

fn run_analysis(analysis: Analysis, lang: Lang, graph: &mut CodeGraph, root: Node<'_>, src: &[u8]) {
    match (analysis, lang) {
        (Analysis::Ast, _) => {
            let mut v = AstRelationVisitor::new(graph);
            walk(&mut v, root);
        }
        (Analysis::Cfg, Lang::Python) => {
            let mut v = pylang::ControlFlowVisitor::new(graph);
            walk(&mut v, root);
        }
        (Analysis::Dataflow, Lang::Python) => {
            let mut v = pylang::DataFlowVisitor::new(graph, src);
            walk(&mut v, root);
        }
        (Analysis::SubCfg, Lang::Python) => {
            let mut v = pylang::SubControlFlowVisitor::new(graph);
            walk(&mut v, root);
        }
        (Analysis::Cfg, Lang::Java) => {
            let mut v = javalang::ControlFlowVisitor::new(graph, src);
            walk(&mut v, root);
        }
        (Analysis::Dataflow, Lang::Java) => {
            let mut v = javalang::DataFlowVisitor::new(graph, src);
            walk(&mut v, root);
        }
        (Analysis::SubCfg, Lang::Java) => unreachable!("rejected by the analysis table"),
    }
}

/// The analysis root: the parse root, or its only child when there is
/// exactly one (a module wrapping a single statement).
fn default_root<'t>(tree: &'t Tree) -> Node<'t> {
    let root = tree.root_node();
    if root.child_count() == 1 {
        if let Some(child) = root.child(0) {
            return child;
        }
    }
    root
}

pub(crate) fn check_syntax(tree: &Tree, policy: SyntaxErrorPolicy) -> GraphResult<()> {
    if !tree.root_node().has_error() {
        return Ok(());
    }
    match policy {
        SyntaxErrorPolicy::Raise => {
            let (row, col) = first_error_position(tree.root_node());
            Err(CodeGraphError::Syntax { row, col })
        }
        SyntaxErrorPolicy::Warn => {
            let (row, col) = first_error_position(tree.root_node());
            warn!(target: "graph", "syntax error at line {row}, column {col}; graph may be partial");
            Ok(())
        }
        SyntaxErrorPolicy::Ignore => Ok(()),
    }
}

fn first_error_position(root: Node<'_>) -> (usize, usize) {
    if root.is_error() || root.is_missing() {
        let point = root.start_position();
        return (point.row, point.column);
    }
    let mut cursor = root.walk();
    let children: Vec<Node<'_>> = root.children(&mut cursor).collect();
    drop(cursor);
    for child in children {
        if child.has_error() {
            return first_error_position(child);
        }
    }
    let point = root.start_position();
    (point.row, point.column)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn rejects_unsupported_languages() {
    let err = "ruby".parse::<Lang>().unwrap_err();
    assert!(matches!(err, CodeGraphError::UnsupportedLanguage(l) if l == "ruby"));
}

#[test]
fn rejects_empty_programs() {
    let err = codegraph(b"", Lang::Python, &Options::default()).unwrap_err();
    assert!(matches!(err, CodeGraphError::EmptyProgram));

    // Comment-only programs have no tokens either.
    let err = codegraph(b"# nothing here\n", Lang::Python, &Options::default()).unwrap_err();
    assert!(matches!(err, CodeGraphError::EmptyProgram));
}

#[test]
fn rejects_subcfg_for_java() {
    let opts = Options {
        analyses: Some(vec![Analysis::SubCfg]),
        ..Options::default()
    };
    let err = codegraph(b"class T {}", Lang::Java, &opts).unwrap_err();
    assert!(matches!(err, CodeGraphError::UnknownAnalysis { .. }));
}

#[test]
fn syntax_error_policy_is_honored() {
    let bad = b"def f(:\n    pass\n";

    let err = codegraph(bad, Lang::Python, &Options::default()).unwrap_err();
    assert!(matches!(err, CodeGraphError::Syntax { .. }));

    let opts = Options {
        syntax_error: SyntaxErrorPolicy::Ignore,
        ..Options::default()
    };
    assert!(codegraph(bad, Lang::Python, &opts).is_ok());
}

#[test]
fn default_analyses_produce_all_three_layers() {
    let g = codegraph(
        b"def f(a):\n    return a + 1\n",
        Lang::Python,
        &Options::default(),
    )
    .unwrap();

    let counts = g.edge_counts();
    assert!(counts.contains_key(&EdgeLabel::Child));
    assert!(counts.contains_key(&EdgeLabel::ControlFlow));
    assert!(counts.contains_key(&EdgeLabel::LastMayWrite));
    assert!(counts.contains_key(&EdgeLabel::ReturnFrom));
}

#[test]
fn java_method_snippets_are_wrapped_and_rerooted() {
    let g = codegraph(
        b"int f(int x) { return x + 1; }",
        Lang::Java,
        &Options::default(),
    )
    .unwrap();

    assert_eq!(g.node(g.root()).name(), "method_declaration");
    // The wrapper tokens are gone.
    assert_eq!(g.node(g.tokens()[0]).name(), "int");
    assert!(g.tokens().iter().all(|&t| g.node(t).name() != "Test"));
    assert!(g.tokens().iter().all(|&t| g.node(t).name() != "class"));
}

#[test]
fn rerunning_a_visitor_adds_no_edges() {
    let mut parser = Parser::new();
    parser
        .set_language(&Language::from(tree_sitter_python::LANGUAGE))
        .unwrap();
    let src = b"x = 1\ny = x\n";
    let tree = parser.parse(src, None).unwrap();
    let tokens = token::tokenize(tree.root_node());
    let mut g = CodeGraph::new(tree.root_node(), &tokens, src, Lang::Python);

    for _ in 0..2 {
        let mut ast = AstRelationVisitor::new(&mut g);
        walk(&mut ast, tree.root_node());
        let mut cfg = pylang::ControlFlowVisitor::new(&mut g);
        walk(&mut cfg, tree.root_node());
    }
    let after_two = (g.len(), g.edge_count());

    let mut ast = AstRelationVisitor::new(&mut g);
    walk(&mut ast, tree.root_node());
    assert_eq!((g.len(), g.edge_count()), after_two);
}

#[test]
fn tokens_only_projection_drops_syntax_and_is_idempotent() {
    let opts = Options {
        analyses: Some(vec![
            Analysis::Ast,
            Analysis::Cfg,
            Analysis::Dataflow,
            Analysis::SubCfg,
        ]),
        ..Options::default()
    };
    let g = codegraph(b"x = 1\ny = x + 1\nprint(y)\n", Lang::Python, &opts).unwrap();

    let projected = g.tokens_only();
    let counts = projected.edge_counts();
    assert!(!counts.contains_key(&EdgeLabel::Child));
    assert!(!counts.contains_key(&EdgeLabel::Sibling));
    assert_eq!(counts[&EdgeLabel::NextToken], g.tokens().len() - 1);
    // Data flow between identifier tokens survives the projection.
    assert!(counts.contains_key(&EdgeLabel::LastMayWrite));

    let twice = projected.tokens_only();
    assert_eq!(twice.len(), projected.len());
    assert_eq!(twice.edge_count(), projected.edge_count());
}
