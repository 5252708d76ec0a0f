use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use clipwatch_core::{ChatLineMetadata, ClipwatchError, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::transport::{ChatTransport, RawChatLine};

const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv:6667";

type Writer = Arc<Mutex<tokio::io::WriteHalf<TcpStream>>>;

/// Minimal Twitch IRC client: plain-text TCP, no TLS, no library beyond
/// tokio — Twitch's chat interface is still the legacy IRC protocol
/// (`PASS`/`NICK`/`JOIN`/`PART`, `PRIVMSG` for lines, `PING`/`PONG` keepalive).
pub struct IrcChatTransport {
    writer: Writer,
}

impl IrcChatTransport {
    /// Connects, authenticates with an OAuth token, and spawns a background
    /// reader task that forwards parsed `PRIVMSG` lines to `tx`.
    pub async fn connect(nick: &str, oauth_token: &str, tx: mpsc::Sender<RawChatLine>) -> Result<Self> {
        let stream = TcpStream::connect(TWITCH_IRC_HOST)
            .await
            .map_err(|e| ClipwatchError::Fatal(format!("cannot connect to chat transport: {e}")))?;
        let (read_half, write_half) = tokio::io::split(stream);
        let writer: Writer = Arc::new(Mutex::new(write_half));

        {
            let mut w = writer.lock().await;
            w.write_all(format!("PASS oauth:{oauth_token}\r\n").as_bytes())
                .await
                .map_err(|e| ClipwatchError::Fatal(format!("chat auth failed: {e}")))?;
            w.write_all(format!("NICK {nick}\r\n").as_bytes())
                .await
                .map_err(|e| ClipwatchError::Fatal(format!("chat auth failed: {e}")))?;
            w.write_all(b"CAP REQ :twitch.tv/tags twitch.tv/commands\r\n")
                .await
                .map_err(|e| ClipwatchError::Fatal(format!("chat capability request failed: {e}")))?;
        }

        tokio::spawn(read_loop(read_half, writer.clone(), tx));

        Ok(Self { writer })
    }
}

async fn read_loop(read_half: tokio::io::ReadHalf<TcpStream>, writer: Writer, tx: mpsc::Sender<RawChatLine>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.starts_with("PING") {
                    debug!("received PING, replying PONG");
                    let pong = line.replacen("PING", "PONG", 1);
                    if writer
                        .lock()
                        .await
                        .write_all(format!("{pong}\r\n").as_bytes())
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }
                if let Some(parsed) = parse_privmsg(&line) {
                    if tx.send(parsed).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {
                warn!("chat transport connection closed by remote");
                return;
            }
            Err(e) => {
                warn!(error = %e, "chat transport read error");
                return;
            }
        }
    }
}

/// Parses a single IRC line of the shape
/// `@tags :nick!nick@nick.tmi.twitch.tv PRIVMSG #room :text` into a [`RawChatLine`].
/// Lines that aren't `PRIVMSG` return `None`.
fn parse_privmsg(line: &str) -> Option<RawChatLine> {
    let (tags, rest) = if let Some(stripped) = line.strip_prefix('@') {
        stripped.split_once(' ')?
    } else {
        ("", line)
    };

    let rest = rest.strip_prefix(':')?;
    let (prefix, rest) = rest.split_once(' ')?;
    if !rest.starts_with("PRIVMSG") {
        return None;
    }
    let rest = rest.strip_prefix("PRIVMSG ")?;
    let (room, text) = rest.split_once(" :")?;

    let user_name = prefix.split('!').next().unwrap_or(prefix).to_string();
    let tag_map = parse_tags(tags);
    let user_id = tag_map.get("user-id").and_then(|v| v.parse().ok()).unwrap_or(0);
    let is_subscriber = tag_map.get("subscriber").map(|v| v == "1").unwrap_or(false);
    let is_mod = tag_map.get("mod").map(|v| v == "1").unwrap_or(false);
    let badges = tag_map
        .get("badges")
        .map(|v| parse_badges(v))
        .unwrap_or_default();

    Some(RawChatLine {
        room_login: room.trim_start_matches('#').to_string(),
        text: text.to_string(),
        user_id,
        user_name,
        metadata: ChatLineMetadata {
            emotes: HashMap::new(),
            badges,
            is_subscriber,
            is_mod,
        },
    })
}

fn parse_tags(tags: &str) -> HashMap<String, String> {
    tags.split(';')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_badges(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|kv| kv.split_once('/'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl ChatTransport for IrcChatTransport {
    async fn join(&self, login: &str) -> Result<()> {
        self.writer
            .lock()
            .await
            .write_all(format!("JOIN #{login}\r\n").as_bytes())
            .await
            .map_err(|e| ClipwatchError::Transient(format!("join {login} failed: {e}")))
    }

    async fn leave(&self, login: &str) -> Result<()> {
        self.writer
            .lock()
            .await
            .write_all(format!("PART #{login}\r\n").as_bytes())
            .await
            .map_err(|e| ClipwatchError::Transient(format!("leave {login} failed: {e}")))
    }

    async fn close(&self) -> Result<()> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| ClipwatchError::Transient(format!("chat transport close failed: {e}")))
    }
}
