use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parlance::commands::{get_help_text, parse_slash_command, SlashCommand};
use parlance::{ChatSession, Config, ConversationStore, OpenAiTransport, ResponseClient};

#[derive(Parser)]
#[command(name = "parlance")]
#[command(version)]
#[command(about = "Chat with an OpenAI-compatible model from the terminal", long_about = None)]
struct Cli {
    /// Conversation id to use (random when omitted)
    #[arg(short, long)]
    conversation: Option<String>,

    /// Your name, remembered in the conversation context
    #[arg(short, long)]
    name: Option<String>,

    /// Wait for whole replies instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// Path to a config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_chunk(chunk: &str) {
    print!("{chunk}");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let transport = OpenAiTransport::from_config(&config).context("Failed to create HTTP client")?;
    let client = ResponseClient::new(Arc::new(transport), config.request_settings());
    let mut store = ConversationStore::new(config.store_config());

    let mut session = match cli.conversation {
        Some(id) => ChatSession::new(id),
        None => ChatSession::fresh(),
    }
    .with_user_name(cli.name)
    .with_streaming(!cli.no_stream);

    println!("💬 parlance ({}), conversation {}", config.model, session.conversation_id());
    println!("Type /help for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        if let Some(parsed) = parse_slash_command(&line) {
            match parsed.command {
                SlashCommand::Quit => break,
                SlashCommand::Help => println!("{}", get_help_text()),
                SlashCommand::Clear => {
                    session.on_clear_conversation(&mut store);
                    println!("🧹 Conversation cleared.");
                }
                SlashCommand::History => {
                    for message in store.history(session.conversation_id()) {
                        println!("[{}] {}", message.role, message.content);
                    }
                }
                SlashCommand::Name => match parsed.argument() {
                    Some(name) => {
                        session.set_user_name(name);
                        store.set_context(
                            session.conversation_id(),
                            parlance::ContextUpdate::user_name(name),
                        );
                        println!("👋 Hello, {name}.");
                    }
                    None => println!("Usage: /name <your name>"),
                },
                SlashCommand::Stream => {
                    let on = session.toggle_streaming();
                    println!("Streaming {}.", if on { "on" } else { "off" });
                }
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        session
            .on_send_message(&client, &mut store, &line, print_chunk)
            .await;
        println!("\n");
    }

    println!("👋 Bye!");
    Ok(())
}
