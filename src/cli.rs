use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codegraph")]
#[command(about = "Build program graphs (syntax, control flow, data flow) from source code")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Emit the program graph as GraphViz DOT
    Dot {
        /// Source file to analyze
        path: String,

        /// Language (inferred from the file extension when omitted)
        #[arg(short, long)]
        lang: Option<String>,

        /// Comma-separated analyses to run (ast, cfg, dataflow, subcfg)
        #[arg(long, value_delimiter = ',')]
        analyses: Option<Vec<String>>,

        /// Project the graph down to tokens before rendering
        #[arg(long)]
        tokens_only: bool,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Syntax-error policy: raise, warn or ignore
        #[arg(long, default_value = "raise")]
        syntax_error: String,
    },

    /// Print node and edge counts per label
    Stats {
        /// Source file to analyze
        path: String,

        /// Language (inferred from the file extension when omitted)
        #[arg(short, long)]
        lang: Option<String>,

        /// Comma-separated analyses to run (ast, cfg, dataflow, subcfg)
        #[arg(long, value_delimiter = ',')]
        analyses: Option<Vec<String>>,

        /// Syntax-error policy: raise, warn or ignore
        #[arg(long, default_value = "raise")]
        syntax_error: String,
    },
}
