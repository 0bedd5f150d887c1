//! jibu-cli - terminal chat client for the jibu gateway

use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use jibu_cli::client::ChatClient;
use jibu_cli::error::{CliError, CliResult};
use jibu_server::gateway::{ChatMessage, EventKind, Role};

#[derive(Parser)]
#[command(name = "jibu-cli")]
#[command(about = "Chat with a jibu gateway from the terminal")]
#[command(version)]
pub struct Cli {
    /// Gateway base URL
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub gateway: String,

    /// Bearer token (falls back to the JIBU_ACCESS_TOKEN env var)
    #[arg(long)]
    pub token: Option<String>,

    /// Provider to request: local, hosted, or auto
    #[arg(long)]
    pub provider: Option<String>,

    /// Custom system prompt for this session
    #[arg(long)]
    pub system_prompt: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let token = match cli.token.or_else(|| std::env::var("JIBU_ACCESS_TOKEN").ok()) {
        Some(token) if !token.trim().is_empty() => token,
        _ => {
            return Err(CliError::from(
                "No access token. Pass --token or set JIBU_ACCESS_TOKEN.",
            ));
        }
    };

    let client = ChatClient::new(cli.gateway, token, cli.provider, cli.system_prompt);

    println!("Connected. Type a message, or 'exit' to quit.");

    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        history.push(ChatMessage::new(Role::User, line));

        print!("jibu> ");
        std::io::stdout().flush()?;

        let outcome = client
            .send_turn(&history, |event| match event.kind {
                EventKind::Token => {
                    print!("{}", event.payload);
                    let _ = std::io::stdout().flush();
                }
                EventKind::Info => {
                    eprintln!("\n[{}]", event.payload);
                }
                _ => {}
            })
            .await?;

        // Partial answers are kept; the error is appended as visible text.
        if let Some(error) = &outcome.error {
            println!("\n[stream error: {error}]");
        } else {
            println!();
        }

        if !outcome.content.is_empty() {
            history.push(ChatMessage::new(Role::Assistant, outcome.content));
        }
    }

    Ok(())
}
