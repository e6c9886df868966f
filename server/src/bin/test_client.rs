use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use rand::Rng;
use serde_json::json;
use shared::{ClientPacket, PlayerState, ServerPacket};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser, Debug)]
#[command(author, version, about = "Joins a relay, moves around, says hi, and leaves")]
struct Args {
    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Number of position updates to send
    #[arg(short = 'n', long, default_value = "5")]
    updates: u32,
}

fn player_state(value: serde_json::Value) -> PlayerState {
    match value {
        serde_json::Value::Object(map) => map,
        _ => PlayerState::new(),
    }
}

fn describe(packet: &ServerPacket) -> String {
    match packet {
        ServerPacket::Init {
            players,
            chat_history,
        } => format!(
            "init: {} players, {} chat lines",
            players.len(),
            chat_history.len()
        ),
        ServerPacket::PlayerJoined { id, player } => format!("{} joined: {:?}", id, player),
        ServerPacket::PlayerUpdate { id, player } => format!("{} updated: {:?}", id, player),
        ServerPacket::PlayerLeft { id } => format!("{} left", id),
        ServerPacket::Chat {
            author,
            message,
            timestamp,
            ..
        } => format!(
            "[{}] {}: {}",
            timestamp,
            author.as_str().unwrap_or("?"),
            message.as_str().map(str::to_string).unwrap_or_else(|| message.to_string())
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let (id, color) = {
        let mut rng = rand::thread_rng();
        let id = format!("player-{:04}", rng.gen_range(0..10_000));
        let color = format!("#{:06x}", rng.gen_range(0..0x100_0000));
        (id, color)
    };

    info!("Connecting to {} as {}", args.url, id);
    let (ws, _) = connect_async(args.url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerPacket>(&text) {
                    Ok(packet) => info!("{}", describe(&packet)),
                    Err(e) => warn!("Unrecognised frame {}: {}", text, e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection error: {}", e);
                    break;
                }
            }
        }
    });

    let join = ClientPacket::Join {
        id: id.clone(),
        player: player_state(json!({"x": 0, "y": 0, "color": color.clone()})),
    };
    sink.send(Message::Text(serde_json::to_string(&join)?)).await?;

    for step in 1..=args.updates {
        sleep(Duration::from_millis(200)).await;
        let update = ClientPacket::Update {
            player: player_state(json!({"x": step * 10})),
        };
        sink.send(Message::Text(serde_json::to_string(&update)?))
            .await?;
    }

    let chat = ClientPacket::Chat {
        author: json!(id),
        message: json!("hello from the test client"),
        color: json!(color),
    };
    sink.send(Message::Text(serde_json::to_string(&chat)?)).await?;

    sleep(Duration::from_millis(500)).await;
    sink.close().await?;
    let _ = timeout(Duration::from_secs(2), reader).await;

    info!("Test client finished");
    Ok(())
}
