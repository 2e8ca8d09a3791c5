//! # Terminal Chat Example
//!
//! A minimal read-eval-print chat loop with streamed replies. The full
//! CLI (`stonechat chat`) adds slash commands and stats on top of this.

use std::io::{self, BufRead, Write};

use stonechat::history::ConversationLog;
use stonechat::{ChatEngine, EngineOptions, SamplerOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Stonechat Terminal Chat Example");
    println!("{}", "=".repeat(50));

    println!("Loading model...");
    let engine = ChatEngine::boot(EngineOptions::default()).await?;
    println!("Ready. Type a message, or 'quit' to leave.\n");

    let options = SamplerOptions::default();
    let mut log = ConversationLog::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("You: ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit" | "bye") {
            break;
        }

        log.push_user(input);
        print!("Bot: ");
        io::stdout().flush()?;

        // Stream chunks as they decode
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = {
            let engine = engine.clone();
            let message = input.to_string();
            let options = options.clone();
            tokio::spawn(async move { engine.reply_streaming(&message, &options, tx).await })
        };
        while let Some(chunk) = rx.recv().await {
            print!("{}", chunk);
            io::stdout().flush()?;
        }
        match task.await? {
            Ok(generated) => {
                log.push_assistant(&generated.reply);
                println!("\n");
            }
            Err(e) => {
                println!("❌ Error generating response: {}\n", e);
            }
        }
    }

    println!("Goodbye! ({} exchanges this session)", log.exchanges().len());
    Ok(())
}
