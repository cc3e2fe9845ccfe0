use moneta::config::DATA_DIR;
use moneta::types::Memory;
use moneta::{Memories, MemoryError, Result};
use std::io::{self, Write};
use std::path::Path;

/// Run the init command
pub fn run_init(path: &str) -> Result<()> {
    let path = Path::new(path);
    let data_path = path.join(DATA_DIR);

    if data_path.exists() {
        return Err(MemoryError::InvalidInput(format!(
            ".moneta already exists at {}",
            data_path.display()
        )));
    }

    let mem = Memories::init(path)?;
    println!("Initialized .moneta at {}", mem.data_path().display());

    Ok(())
}

/// Run the remember command
pub fn run_remember(content: &str, tags: &str) -> Result<()> {
    let mem = Memories::open()?;

    let tags_vec = split_tags(tags);
    let memory = mem.add_memory(content, &tags_vec)?;

    println!("Remembered [{}]", memory.id);
    if !memory.tags.is_empty() {
        println!("  tags: {}", memory.tags.join(", "));
    }

    Ok(())
}

/// Run the recall command
pub fn run_recall(
    query: Option<&str>,
    tag: Option<&str>,
    limit: usize,
    min_relevance: Option<f64>,
) -> Result<()> {
    let mem = Memories::open()?;

    if let Some(t) = tag {
        let memories = mem.recall_by_tag(t, limit);

        if memories.is_empty() {
            println!("No memories with tag: {}", t);
            return Ok(());
        }

        println!("Memories tagged '{}':\n", t);
        for m in memories {
            print_memory(&m);
        }
        return Ok(());
    }

    let min_relevance = min_relevance.unwrap_or_else(|| mem.min_relevance());
    let results = mem.search_memories(query.unwrap_or(""), limit, min_relevance);

    if results.is_empty() {
        if mem.get_all_memories().is_empty() {
            println!("No memories yet. Add one with: moneta remember \"...\"");
        } else {
            println!("No matching memories.");
        }
        return Ok(());
    }

    for r in results {
        println!(
            "[{}] final: {:.3}, relevance: {:.3}, score: {:.2}",
            r.memory.id, r.final_score, r.relevance_score, r.memory.score
        );
        print_body(&r.memory);
    }

    Ok(())
}

/// Run the forget command
pub fn run_forget(id: &str, force: bool) -> Result<()> {
    let mem = Memories::open()?;

    let Some(memory) = mem.get(id) else {
        println!("Memory not found: {}", id);
        return Ok(());
    };

    if !force {
        println!("Forget [{}]:", id);
        let preview: String = memory.content.chars().take(100).collect();
        println!("  {}", preview);

        print!("Confirm? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if mem.delete_memory(id)? {
        println!("Forgotten [{}]", id);
    } else {
        println!("Memory not found: {}", id);
    }

    Ok(())
}

/// Run the list command
pub fn run_list(tag: Option<&str>, limit: usize) -> Result<()> {
    let mem = Memories::open()?;

    let memories = if let Some(t) = tag {
        mem.recall_by_tag(t, limit)
    } else {
        let mut all = mem.get_all_memories();
        all.reverse();
        all.truncate(limit);
        all
    };

    if memories.is_empty() {
        if tag.is_some() {
            println!("No memories with that tag.");
        } else {
            println!("No memories yet.");
        }
        return Ok(());
    }

    for m in memories {
        print_memory(&m);
    }

    Ok(())
}

/// Run the tags command
pub fn run_tags() -> Result<()> {
    let mem = Memories::open()?;
    let tags = mem.tags();

    if tags.is_empty() {
        println!("No tags yet.");
        return Ok(());
    }

    println!("Tags:\n");
    for (tag, count) in tags {
        println!("  {:20} ({})", tag, count);
    }

    Ok(())
}

/// Run the stats command
pub fn run_stats() -> Result<()> {
    let mem = Memories::open()?;
    let stats = mem.stats();

    println!("Memory Statistics");
    println!("=================\n");

    println!("Total memories: {}", stats.total_memories);
    println!("Total tags:     {}", stats.total_tags);
    println!("Avg score:      {:.2}", stats.avg_score);
    println!("Total recalls:  {}", stats.total_accesses);
    println!("Method:         {}", mem.current_method());

    if !stats.by_tag.is_empty() {
        println!("\nTop tags:");
        let mut tags: Vec<_> = stats.by_tag.iter().collect();
        tags.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (tag, count) in tags.iter().take(10) {
            println!("  {:20} {}", tag, count);
        }
    }

    Ok(())
}

/// Run the export command
pub fn run_export(format: &str) -> Result<()> {
    let mem = Memories::open()?;
    let memories = mem.get_all_memories();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&memories)?);
        }
        "md" => {
            for m in memories {
                println!("## [{}] {}", m.id, m.created.format("%Y-%m-%d %H:%M"));
                if !m.tags.is_empty() {
                    println!("*Tags: {}*\n", m.tags.join(", "));
                }
                println!("{}\n", m.content);
                println!("---\n");
            }
        }
        _ => {
            return Err(MemoryError::InvalidInput(format!("Unknown format: {}", format)));
        }
    }

    Ok(())
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Helper to print a memory
fn print_memory(m: &Memory) {
    println!("[{}] score: {:.2}, recalled: {}", m.id, m.score, m.access_count);
    print_body(m);
}

fn print_body(m: &Memory) {
    if !m.tags.is_empty() {
        println!("    tags: {}", m.tags.join(", "));
    }

    // Truncate content for display
    let preview: String = m.content.chars().take(200).collect();
    let preview = if m.content.chars().count() > 200 {
        format!("{}...", preview)
    } else {
        preview
    };
    println!("    {}\n", preview.replace('\n', " "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_tags("").is_empty());
    }
}
