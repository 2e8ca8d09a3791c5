//! # Simple Text Generation Example
//!
//! The most basic use of Stonechat: pull a checkpoint, send one prompt,
//! print the reply. Perfect for getting started.

use stonechat::{ChatEngine, EngineOptions, SamplerOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let prompt = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("Explain machine learning in simple terms");

    println!("Stonechat Simple Generation Example");
    println!("Prompt: \"{}\"", prompt);
    println!("{}", "=".repeat(50));

    // Download and load the default checkpoint
    println!("Loading model...");
    let engine = ChatEngine::boot(EngineOptions::default()).await?;

    let info = engine.info();
    println!("Model loaded successfully!");
    println!("   Model: {}", info.model_id);
    println!("   Vocabulary size: {}", info.vocab_size);
    println!("   Context window: {}", info.context_window);
    println!("   Device: {}", info.device);

    // Generate a reply
    println!("\nGenerating...\n");
    let options = SamplerOptions::default();
    let generated = engine.reply(prompt, &options).await?;

    println!("{}", generated.reply);
    println!();
    println!(
        "Generated {} tokens in {}ms ({:?})",
        generated.completion_tokens, generated.elapsed_ms, generated.finish_reason
    );

    Ok(())
}
