use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use codegraph::config::Config;
use codegraph::errors::{CodeGraphError, GraphResult};
use codegraph::{Analysis, CodeGraph, Lang, Options, codegraph};
use console::style;

use crate::cli::Commands;

pub fn handle_command(command: Commands, config: &Config) -> GraphResult<()> {
    match command {
        Commands::Dot {
            path,
            lang,
            analyses,
            tokens_only,
            output,
            syntax_error,
        } => dot(
            &path,
            lang,
            analyses,
            tokens_only,
            output,
            &syntax_error,
            config,
        ),
        Commands::Stats {
            path,
            lang,
            analyses,
            syntax_error,
        } => stats(&path, lang, analyses, &syntax_error, config),
    }
}

fn build_graph(
    path: &str,
    lang: Option<String>,
    analyses: Option<Vec<String>>,
    syntax_error: &str,
    config: &Config,
) -> GraphResult<CodeGraph> {
    let path = Path::new(path);
    let lang = match lang {
        Some(name) => name.parse()?,
        None => infer_lang(path)?,
    };

    let names = analyses.unwrap_or_else(|| config.analysis.defaults.clone());
    let analyses = names
        .iter()
        .map(|name| name.parse())
        .collect::<GraphResult<Vec<Analysis>>>()?;

    let source = fs::read(path)?;
    let opts = Options {
        analyses: Some(analyses),
        syntax_error: syntax_error.parse()?,
    };
    codegraph(&source, lang, &opts)
}

fn infer_lang(path: &Path) -> GraphResult<Lang> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Lang::from_extension)
        .ok_or_else(|| CodeGraphError::UnsupportedLanguage(path.display().to_string()))
}

fn dot(
    path: &str,
    lang: Option<String>,
    analyses: Option<Vec<String>>,
    tokens_only: bool,
    output: Option<String>,
    syntax_error: &str,
    config: &Config,
) -> GraphResult<()> {
    let mut graph = build_graph(path, lang, analyses, syntax_error, config)?;
    if tokens_only {
        graph = graph.tokens_only();
    }

    let colors = config.edge_color_map();
    match output {
        Some(file) => {
            let mut out = File::create(&file)?;
            graph.write_dot(&mut out, &colors)?;
            println!(
                "{} {} ({} nodes, {} edges) to {}",
                style("Wrote").green().bold(),
                graph,
                graph.len(),
                graph.edge_count(),
                style(&file).underlined()
            );
        }
        None => {
            let stdout = io::stdout();
            graph.write_dot(&mut stdout.lock(), &colors)?;
        }
    }
    Ok(())
}

fn stats(
    path: &str,
    lang: Option<String>,
    analyses: Option<Vec<String>>,
    syntax_error: &str,
    config: &Config,
) -> GraphResult<()> {
    let graph = build_graph(path, lang, analyses, syntax_error, config)?;

    println!(
        "{} {} — {} nodes ({} tokens), {} edges",
        style("Graph").green().bold(),
        graph,
        graph.len(),
        graph.tokens().len(),
        graph.edge_count()
    );

    let counts = graph.edge_counts();
    let mut rows: Vec<_> = counts.iter().collect();
    rows.sort_by_key(|(label, _)| label.as_str());
    let mut out = io::stdout().lock();
    for (label, count) in rows {
        writeln!(out, "  {:>6}  {label}", count)?;
    }
    Ok(())
}

#[test]
fn infer_lang_from_extension() {
    assert_eq!(infer_lang(Path::new("a.py")).unwrap(), Lang::Python);
    assert_eq!(infer_lang(Path::new("b.java")).unwrap(), Lang::Java);
    assert!(infer_lang(Path::new("c.rb")).is_err());
}

#[test]
fn dot_command_writes_a_digraph() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("sample.py");
    fs::write(&src, "x = 1\ny = x\n").unwrap();
    let out = dir.path().join("sample.dot");

    dot(
        src.to_str().unwrap(),
        None,
        None,
        false,
        Some(out.to_str().unwrap().to_owned()),
        "raise",
        &Config::default(),
    )
    .unwrap();

    let rendered = fs::read_to_string(&out).unwrap();
    assert!(rendered.starts_with("digraph {"));
    assert!(rendered.contains("clusterNextToken"));
    assert!(rendered.contains("last_may_write"));
}
