use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{config::load_config, transport::HttpGateway, SessionClient, SessionEvent};
use shared::domain::Participant;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    /// Gateway base URL; overrides client.toml and environment.
    #[arg(long)]
    base_url: Option<String>,
}

fn name_of(participant: &Option<Participant>) -> String {
    participant
        .as_ref()
        .map(|p| {
            if p.remark.is_empty() {
                p.display_name.clone()
            } else {
                p.remark.clone()
            }
        })
        .unwrap_or_else(|| "<unknown>".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut config = load_config();
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    info!("connecting gateway base_url={}", config.base_url);

    let gateway = Arc::new(HttpGateway::new(&config)?);
    let client = SessionClient::new(gateway);
    let mut events = client.subscribe_events();
    client.startup();

    loop {
        match events.recv().await {
            Ok(SessionEvent::ChallengeReady { url }) => println!("scan to log in: {url}"),
            Ok(SessionEvent::AvatarPreview { image }) => {
                println!(
                    "challenge scanned, avatar preview received ({} bytes)",
                    image.len()
                );
            }
            Ok(SessionEvent::LoginSucceeded) => {
                if let Some(me) = client.me().await {
                    println!(
                        "logged in as {} ({} friends)",
                        me.display_name,
                        client.friends().await.len()
                    );
                }
            }
            Ok(SessionEvent::Text {
                container,
                sender,
                text,
                ..
            }) => println!("[{}] {}: {text}", name_of(&container), name_of(&sender)),
            Ok(SessionEvent::Image {
                container,
                sender,
                image,
                ..
            }) => {
                println!(
                    "[{}] {}: <image {} bytes>",
                    name_of(&container),
                    name_of(&sender),
                    image.len()
                );
            }
            Ok(SessionEvent::Voice {
                container,
                sender,
                audio,
                ..
            }) => {
                println!(
                    "[{}] {}: <voice {} bytes>",
                    name_of(&container),
                    name_of(&sender),
                    audio.len()
                );
            }
            Ok(SessionEvent::Video {
                container,
                sender,
                video,
                ..
            }) => {
                println!(
                    "[{}] {}: <video {} bytes>",
                    name_of(&container),
                    name_of(&sender),
                    video.len()
                );
            }
            Ok(SessionEvent::Card {
                container,
                display_name,
                recommended_id,
                ..
            }) => println!(
                "[{}] contact card: {display_name} ({recommended_id})",
                name_of(&container)
            ),
            Ok(SessionEvent::Other {
                container, sender, ..
            }) => {
                println!(
                    "[{}] {}: <unsupported message>",
                    name_of(&container),
                    name_of(&sender)
                );
            }
            Ok(SessionEvent::Notify { .. } | SessionEvent::System { .. }) => {}
            Ok(SessionEvent::Failure { reason }) => {
                eprintln!("session failed: {reason}");
                break;
            }
            Ok(SessionEvent::Logout) => {
                println!("logged out");
                break;
            }
            Err(_) => break,
        }
    }
    Ok(())
}
