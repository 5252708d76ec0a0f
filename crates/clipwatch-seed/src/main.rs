//! One-time CLI to run Twitch's OAuth authorization-code flow and write the
//! resulting credential to disk via `clipwatch-credentials`.

use std::io::Write as _;

use clap::Parser;
use clipwatch_core::{ClipwatchError, Credential};
use clipwatch_credentials::{CredentialStore, FileCredentialStore};
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;

const AUTH_BASE: &str = "https://id.twitch.tv/oauth2";
const REQUIRED_SCOPES: &[&str] = &["chat:read", "clips:edit"];

#[derive(Parser)]
#[command(name = "clipwatch-seed")]
#[command(about = "Seed clipwatch's Twitch user credential via the OAuth authorization-code flow")]
struct Cli {
    /// Where the credential file will be written.
    #[arg(long, default_value = "secrets/twitch_user_tokens.json")]
    token_file: String,

    /// Local port the OAuth redirect listener binds to.
    #[arg(long, default_value_t = 17563)]
    redirect_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "clipwatch_seed=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client_id = std::env::var("TWITCH_CLIENT_ID")
        .map_err(|_| anyhow::anyhow!("TWITCH_CLIENT_ID must be set"))?;
    let client_secret = std::env::var("TWITCH_CLIENT_SECRET")
        .map_err(|_| anyhow::anyhow!("TWITCH_CLIENT_SECRET must be set"))?;

    let redirect_uri = format!("http://localhost:{}/callback", cli.redirect_port);
    let state: String = {
        let mut rng = rand::thread_rng();
        (0..24).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect()
    };

    let scope = REQUIRED_SCOPES.join(" ");
    let authorize_url = format!(
        "{AUTH_BASE}/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        urlencoding::encode(&client_id),
        urlencoding::encode(&redirect_uri),
        urlencoding::encode(&scope),
        urlencoding::encode(&state),
    );

    println!("{}", "=".repeat(60));
    println!("Twitch OAuth Token Seeding Tool");
    println!("{}", "=".repeat(60));
    println!("\nOpen this URL in your browser:\n\n  {authorize_url}\n");
    println!("Waiting for authorization to complete...");

    let code = wait_for_redirect(cli.redirect_port, &state).await?;
    info!("authorization code received, exchanging for tokens");

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{AUTH_BASE}/token"))
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("token exchange failed: {status} {body}");
    }

    let token_resp: TokenResponse = resp.json().await?;

    let credential = Credential {
        access_token: token_resp.access_token,
        refresh_token: token_resp.refresh_token,
        scopes: REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect(),
        updated_at: chrono::Utc::now(),
    };

    let store = FileCredentialStore::new(cli.token_file.clone());
    store.save(&credential).await?;

    println!("\n{}", "=".repeat(60));
    println!("Tokens saved to: {}", cli.token_file);
    println!("You can now start the fleet monitor.");

    Ok(())
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

/// Accepts exactly one HTTP connection carrying Twitch's redirect and
/// extracts `code` from the query string. Rejects a `state` mismatch.
async fn wait_for_redirect(port: u16, expected_state: &str) -> Result<String, ClipwatchError> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| ClipwatchError::Fatal(format!("cannot bind redirect listener on :{port}: {e}")))?;

    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| ClipwatchError::Fatal(format!("redirect listener accept failed: {e}")))?;

    let mut buf = vec![0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| ClipwatchError::Fatal(format!("redirect read failed: {e}")))?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let request_line = request.lines().next().unwrap_or("");
    let path = request_line.split_whitespace().nth(1).unwrap_or("");
    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");

    let mut code = None;
    let mut state = None;
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            match k {
                "code" => code = Some(urlencoding::decode(v).unwrap_or_default().into_owned()),
                "state" => state = Some(urlencoding::decode(v).unwrap_or_default().into_owned()),
                _ => {}
            }
        }
    }

    let body = "Authorization complete. You can close this tab and return to the terminal.";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;

    if state.as_deref() != Some(expected_state) {
        return Err(ClipwatchError::Permanent("OAuth state mismatch on redirect".into()));
    }

    code.ok_or_else(|| ClipwatchError::Permanent("redirect did not carry an authorization code".into()))
}
