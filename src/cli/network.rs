use moneta::{Memories, Result};
use std::collections::HashMap;

/// Run the network command
pub fn run_network(threshold: Option<f64>, json: bool) -> Result<()> {
    let mem = Memories::open()?;
    let threshold = threshold.unwrap_or_else(|| mem.network_threshold());
    let network = mem.memory_network(threshold);

    if json {
        println!("{}", serde_json::to_string_pretty(&network)?);
        return Ok(());
    }

    if network.nodes.is_empty() {
        println!("No memories yet.");
        return Ok(());
    }

    println!(
        "{} memories, {} connections above {:.2}\n",
        network.nodes.len(),
        network.edges.len(),
        threshold
    );

    let labels: HashMap<&str, &str> = network
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.label.as_str()))
        .collect();

    let mut edges = network.edges.clone();
    edges.sort_by(|a, b| b.value.total_cmp(&a.value));

    for edge in edges {
        println!(
            "{:.3}  {}  <->  {}",
            edge.value,
            preview(labels.get(edge.from.as_str()).copied().unwrap_or(&edge.from)),
            preview(labels.get(edge.to.as_str()).copied().unwrap_or(&edge.to)),
        );
    }

    Ok(())
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        format!("{}...", short)
    } else {
        short
    }
}
