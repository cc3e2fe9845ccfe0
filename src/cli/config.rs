use moneta::config::{find_moneta_path, MonetaConfig, DEFAULT_METHOD, SIMILARITY_METHODS};
use moneta::embeddings::ServerEmbedder;
use moneta::similarity::SimilarityMethod;
use moneta::{MemoryError, Result};
use std::path::PathBuf;

fn open_config() -> Result<MonetaConfig> {
    let data_path = find_moneta_path().ok_or_else(|| {
        MemoryError::NotInitialized("No .moneta directory found. Run 'moneta init' first.".to_string())
    })?;
    Ok(MonetaConfig::new(data_path))
}

/// Run the config command
pub fn run_config(key: Option<&str>, value: Option<&str>) -> Result<()> {
    let mut config = open_config()?;

    match (key, value) {
        (None, None) => {
            println!("Current configuration:\n");
            println!("  similarity_method: {}", config.similarity_method());
            println!("  min_relevance: {}", config.min_relevance());
            println!("  network_threshold: {}", config.network_threshold());
            println!("  embedding_socket: {}", config.embedding_socket().display());

            let policy = config.score_policy();
            println!("  half_life_hours: {}", policy.half_life.as_secs_f64() / 3600.0);
            println!("  retrieval_bonus: {}", policy.retrieval_bonus);
            println!("  connection_bonus: {}", policy.connection_bonus);

            for k in config.keys() {
                if !KNOWN_KEYS.contains(&k.as_str()) {
                    println!("  {}: {}", k, config.get(&k).unwrap_or_default());
                }
            }
        }
        (Some(k), None) => {
            if let Some(v) = config.get(k) {
                println!("{}: {}", k, v);
            } else {
                println!("{}: (not set)", k);
            }
        }
        (Some(k), Some(v)) => {
            if k == "similarity_method" || k == "method" {
                let method: SimilarityMethod = v.parse()?;
                config.set_similarity_method(method.name())?;
            } else {
                config.set(k, v)?;
            }
            println!("Set {} = {}", k, v);
        }
        (None, Some(_)) => {
            return Err(MemoryError::InvalidInput(
                "Key required when setting a value".to_string(),
            ));
        }
    }

    Ok(())
}

const KNOWN_KEYS: &[&str] = &[
    "similarity_method",
    "min_relevance",
    "network_threshold",
    "embedding_socket",
    "half_life_hours",
    "retrieval_bonus",
    "connection_bonus",
];

/// Run the method command
pub fn run_method(name: Option<&str>, list: bool) -> Result<()> {
    if list {
        print_methods();
        return Ok(());
    }

    let mut config = open_config()?;

    match name {
        Some(n) => {
            let method: SimilarityMethod = n.parse()?;
            config.set_similarity_method(method.name())?;
            println!("Similarity method set to: {}", method);

            if method == SimilarityMethod::Server {
                report_server(config.embedding_socket());
            }
        }
        None => {
            let current = config.similarity_method();
            println!("Current similarity method: {}", current);
            if current == SimilarityMethod::Server.name() {
                report_server(config.embedding_socket());
            }
        }
    }

    Ok(())
}

fn report_server(socket: PathBuf) {
    let server = ServerEmbedder::new(socket);
    match server.ping() {
        Ok(model) => println!("  embedding server: running ({})", model),
        Err(_) => println!(
            "  embedding server: not reachable at {}; searches will find nothing until it is",
            server.socket().display()
        ),
    }
}

fn print_methods() {
    let current = find_moneta_path()
        .map(|p| MonetaConfig::new(p).similarity_method())
        .unwrap_or_else(|| DEFAULT_METHOD.to_string());

    println!("Available similarity methods:\n");
    println!("{:2} {:10} {}", "", "Name", "Description");
    println!("{}", "-".repeat(60));

    for method in SIMILARITY_METHODS {
        let marker = if method.name == current { " *" } else { "  " };
        println!("{} {:10} {}", marker, method.name, method.description);
    }

    println!("\n* = currently configured");
    println!("\nSet method with: moneta method <name>");
}
