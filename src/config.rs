use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::EdgeLabel;
use crate::errors::GraphResult;

static DEFAULT_CONFIG_TOML: &str = include_str!("../default-codegraph.toml");

static DEFAULT_EDGE_COLORS: Lazy<HashMap<String, String>> = Lazy::new(|| {
    [
        ("controlflow", "red"),
        ("return_from", "blue"),
        ("yield_from", "cadetblue"),
        ("last_may_write", "orange"),
        ("next_may_use", "darkorange"),
        ("assigned_from", "purple"),
        ("occurrence_of", "gray"),
        ("child", "black"),
        ("sibling", "gray"),
        ("next_token", "black"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
});

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// DOT edge colors, keyed by edge label name.
    pub edge_colors: HashMap<String, String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            edge_colors: DEFAULT_EDGE_COLORS.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analyses to run when the command line does not name any.
    pub defaults: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            defaults: vec!["ast".into(), "cfg".into(), "dataflow".into()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Read `codegraph.toml` from `config_dir` and merge it over the
    /// defaults. On first run the example config is written there instead.
    pub fn load(config_dir: &Path) -> GraphResult<Self> {
        let path = config_dir.join("codegraph.toml");
        if !path.exists() {
            create_example_config(&path)?;
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)?;
        let user: Config = toml::from_str(&content)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(merge_configs(Config::default(), user))
    }

    /// Color map keyed by edge label, for DOT rendering.
    pub fn edge_color_map(&self) -> HashMap<EdgeLabel, String> {
        EdgeLabel::ALL
            .iter()
            .filter_map(|label| {
                self.output
                    .edge_colors
                    .get(label.as_str())
                    .map(|color| (*label, color.clone()))
            })
            .collect()
    }
}

fn create_example_config(path: &Path) -> GraphResult<()> {
    fs::write(path, DEFAULT_CONFIG_TOML)?;
    tracing::debug!("example config created at {}", path.display());
    Ok(())
}

/// Merge the user config into the defaults. Edge colors are overridden
/// key by key, so a partial `[output.edge_colors]` table keeps the rest of
/// the palette; the analysis list is replaced outright.
fn merge_configs(mut default: Config, user: Config) -> Config {
    for (label, color) in user.output.edge_colors {
        default.output.edge_colors.insert(label, color);
    }
    default.analysis.defaults = user.analysis.defaults;
    default
}

#[test]
fn default_colors_cover_the_semantic_labels() {
    let config = Config::default();
    let colors = config.edge_color_map();
    assert_eq!(colors[&EdgeLabel::ControlFlow], "red");
    assert_eq!(colors[&EdgeLabel::LastMayWrite], "orange");
}

#[test]
fn example_config_matches_the_defaults() {
    let example: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
    let default = Config::default();
    assert_eq!(example.output.edge_colors, default.output.edge_colors);
    assert_eq!(example.analysis.defaults, default.analysis.defaults);
}

#[test]
fn load_merges_user_overrides_over_the_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let toml = r#"
        [output.edge_colors]
        controlflow = "green"

        [analysis]
        defaults = ["ast"]
    "#;
    fs::write(dir.path().join("codegraph.toml"), toml).unwrap();

    let config = Config::load(dir.path()).unwrap();
    assert_eq!(config.output.edge_colors["controlflow"], "green");
    // A partial color table does not erase the rest of the palette.
    assert_eq!(config.output.edge_colors["last_may_write"], "orange");
    assert_eq!(config.output.edge_colors.len(), 10);
    assert_eq!(config.analysis.defaults, vec!["ast"]);
}

#[test]
fn load_writes_the_example_config_on_first_run() {
    let dir = tempfile::tempdir().unwrap();

    let config = Config::load(dir.path()).unwrap();
    assert_eq!(config.analysis.defaults, vec!["ast", "cfg", "dataflow"]);

    let path = dir.path().join("codegraph.toml");
    assert!(path.is_file());

    // The written example round-trips to the same configuration.
    let reloaded = Config::load(dir.path()).unwrap();
    assert_eq!(reloaded.output.edge_colors, config.output.edge_colors);
    assert_eq!(reloaded.analysis.defaults, config.analysis.defaults);
}
