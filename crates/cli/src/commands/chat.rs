//! `websage chat` — Interactive or single-message chat mode.

use std::io::{BufRead, Write};
use std::sync::Arc;
use websage_agent::{AgentLoop, DEFAULT_SYSTEM_PROMPT};
use websage_core::message::{Conversation, Message};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config_or_die()?;

    let provider = websage_providers::build_from_config(&config);
    let tools = Arc::new(websage_tools::default_registry(config.search.max_results));
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into());

    let agent = AgentLoop::new(
        provider,
        &config.model,
        config.temperature,
        tools,
        system_prompt,
    )
    .with_max_tokens(config.max_tokens);

    if let Some(msg) = message {
        // Single message mode
        let mut conv = Conversation::new();
        conv.push(Message::user(&msg));

        eprint!("  Thinking...");
        let response = agent.process(&mut conv).await?;
        eprint!("\r              \r");
        println!("{response}");
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  websage — interactive mode");
    println!();
    println!("  Model:  {}", config.model);
    println!("  Tools:  web_search");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let stdin = std::io::stdin();
    let mut conv = Conversation::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }

        conv.push(Message::user(line));

        eprint!("  ...");
        match agent.process(&mut conv).await {
            Ok(response) => {
                eprint!("\r     \r");
                println!();
                for out_line in response.lines() {
                    println!("  Assistant > {out_line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
