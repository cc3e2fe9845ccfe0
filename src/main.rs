use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "moneta")]
#[command(version)]
#[command(about = "Relevance-ranked personal memory")]
struct Cli {
    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .moneta directory
    Init {
        /// Directory to initialize .moneta in
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Remember something
    Remember {
        /// Content to remember
        content: String,

        /// Comma-separated tags
        #[arg(short, long, default_value = "")]
        tags: String,
    },

    /// Recall memories by search
    Recall {
        /// Search query (omit to browse by score)
        query: Option<String>,

        /// Search by tag instead
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Minimum relevance (defaults to the configured value)
        #[arg(short, long)]
        min_relevance: Option<f64>,
    },

    /// Forget a memory
    Forget {
        /// Memory ID to forget
        id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// List memories, newest first
    List {
        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// List all tags
    Tags,

    /// Show statistics
    Stats,

    /// Export memories to stdout
    Export {
        /// Output format
        #[arg(short, long, default_value = "json", value_parser = ["json", "md"])]
        format: String,
    },

    /// Show the similarity network between memories
    Network {
        /// Minimum similarity for an edge (defaults to the configured value)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Print nodes and edges as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the memory block to inject into a chat prompt
    Context {
        /// The message to find context for
        prompt: String,
    },

    /// View or set the similarity method
    Method {
        /// Method name
        name: Option<String>,

        /// List available methods
        #[arg(short, long)]
        list: bool,
    },

    /// View or set configuration
    Config {
        /// Config key
        key: Option<String>,

        /// Config value
        value: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "moneta=debug" } else { "moneta=warn" };
    let filter = EnvFilter::try_from_env("MONETA_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init { path } => cli::memory::run_init(&path),
        Commands::Remember { content, tags } => cli::memory::run_remember(&content, &tags),
        Commands::Recall {
            query,
            tag,
            limit,
            min_relevance,
        } => cli::memory::run_recall(query.as_deref(), tag.as_deref(), limit, min_relevance),
        Commands::Forget { id, force } => cli::memory::run_forget(&id, force),
        Commands::List { tag, limit } => cli::memory::run_list(tag.as_deref(), limit),
        Commands::Tags => cli::memory::run_tags(),
        Commands::Stats => cli::memory::run_stats(),
        Commands::Export { format } => cli::memory::run_export(&format),
        Commands::Network { threshold, json } => cli::network::run_network(threshold, json),
        Commands::Context { prompt } => cli::context::run_context(&prompt),
        Commands::Method { name, list } => cli::config::run_method(name.as_deref(), list),
        Commands::Config { key, value } => cli::config::run_config(key.as_deref(), value.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
