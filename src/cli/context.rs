use moneta::{Memories, Result};

/// Run the context command - print the memory block for a chat prompt
pub fn run_context(prompt: &str) -> Result<()> {
    let mem = match Memories::open() {
        Ok(m) => m,
        Err(_) => {
            // Silent exit if no memory store
            return Ok(());
        }
    };

    if let Some(block) = mem.prompt_context(prompt) {
        println!("{}", block);
    }

    Ok(())
}
