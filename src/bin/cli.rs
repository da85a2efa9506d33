use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::*;
use grid_sync::sync::remote::AnchorClient;
use grid_sync::{Anchor, ServerMessage};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "grid-cli")]
#[command(about = "Talk to a grid-sync server over WebSocket", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every message the server sends
    Watch {
        /// Server URL, e.g. ws://localhost:8080/ws
        url: String,
    },

    /// Ask for the full anchor set
    Fetch { url: String },

    /// Push one anchor and print the resulting broadcast
    Push {
        url: String,
        id: String,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { url } => {
            let mut client = AnchorClient::connect(&url).await?;
            println!("{} Watching {}", "👁".bright_yellow(), url.bright_blue());
            while let Some(message) = client.recv().await? {
                print_message(&message);
            }
            println!("{}", "Connection closed".bright_black());
        }

        Commands::Fetch { url } => {
            let mut client = AnchorClient::connect(&url).await?;
            client.fetch_updates(&[]).await?;
            let reply = client
                .recv_until(REPLY_TIMEOUT, |m| !is_status(m))
                .await?;
            print_message(&reply);
            client.close().await?;
        }

        Commands::Push {
            url,
            id,
            latitude,
            longitude,
            altitude,
        } => {
            if id.is_empty() {
                return Err(anyhow!("anchor id must not be empty"));
            }
            let mut client = AnchorClient::connect(&url).await?;
            client
                .update_anchors(vec![Anchor::new(id, latitude, longitude, altitude)])
                .await?;
            let broadcast = client
                .recv_until(REPLY_TIMEOUT, |m| !is_status(m))
                .await?;
            println!("{} Anchor pushed", "✓".green());
            print_message(&broadcast);
            client.close().await?;
        }
    }

    Ok(())
}

fn is_status(message: &ServerMessage) -> bool {
    matches!(message, ServerMessage::StatusUpdated { .. })
}

fn print_message(message: &ServerMessage) {
    match message {
        ServerMessage::StatusUpdated {
            status,
            client_count,
        } => {
            println!(
                "{} {} ({} clients)",
                "[status]".bright_black(),
                status.to_string().bright_cyan(),
                client_count
            );
        }
        ServerMessage::NoUpdates { message } => {
            println!("{} {}", "[noUpdates]".bright_black(), message.yellow());
        }
        ServerMessage::UpdateAnchor { anchor_data } => {
            println!(
                "{} {} anchors",
                "[updateAnchor]".bright_black(),
                anchor_data.len().to_string().bold()
            );
            for anchor in anchor_data {
                let stamp = anchor
                    .last_updated
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} lat={} lon={} alt={} {}",
                    anchor.id.bright_white(),
                    anchor.latitude,
                    anchor.longitude,
                    anchor.altitude,
                    format!("({stamp})").bright_black()
                );
            }
        }
    }
}
