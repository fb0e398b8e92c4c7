use anyhow::Context;
use clap::{Parser, Subcommand};
use lib::relay::{RelayClient, RelayKind, RelayRequest};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hookchat")]
#[command(about = "Hookchat: chat with any webhook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: HOOKCHAT_CONFIG_PATH or ~/.hookchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the server: relay API, conversation store and browser UI on one port.
    Serve {
        /// Config file path (default: HOOKCHAT_CONFIG_PATH or ~/.hookchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from HOOKCHAT_PORT, then config, then 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with a webhook through a running server (interactive).
    Chat {
        /// Config file path, used to find the server port
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Webhook URL to talk to
        #[arg(long, short)]
        url: String,

        /// HTTP method used for the webhook (GET, POST, PUT, PATCH)
        #[arg(long, short, default_value = "POST")]
        method: String,

        /// Extra webhook header, "Name: value" (repeatable)
        #[arg(long = "header", short = 'H', value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Send the connection-test payload straight to a webhook and print the result.
    Check {
        /// Webhook URL to test
        url: String,

        /// HTTP method used for the webhook (GET, POST, PUT, PATCH)
        #[arg(long, short, default_value = "POST")]
        method: String,

        /// Extra webhook header, "Name: value" (repeatable)
        #[arg(long = "header", short = 'H', value_name = "HEADER")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Some(Commands::Serve { .. }) => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Some(Commands::Version) => {
            println!("hookchat {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("server failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            url,
            method,
            headers,
        }) => {
            if let Err(e) = run_chat(config, url, method, headers).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check {
            url,
            method,
            headers,
        }) => {
            if let Err(e) = run_check(url, method, headers).await {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    config.server.port = port.unwrap_or_else(|| lib::config::resolve_port(&config));
    log::info!(
        "starting hookchat on {}:{}",
        config.server.bind,
        config.server.port
    );
    lib::gateway::run_gateway(config).await
}

/// Parse a `Name: value` header argument.
fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header must look like \"Name: value\": {}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("header name is empty: {}", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn headers_object(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    raw.iter()
        .map(|h| parse_header(h).map(|(k, v)| (k, Value::String(v))))
        .collect()
}

/// Relay request body shared by chat and check.
/// The method is upper-cased here; the relay API only accepts exact tokens.
fn webhook_body(url: &str, method: &str, headers: &[String]) -> anyhow::Result<Value> {
    Ok(json!({
        "url": url,
        "method": method.trim().to_ascii_uppercase(),
        "headers": headers_object(headers)?,
    }))
}

/// Send one message through the server's /relay/send; returns the reply text.
async fn relay_send(
    client: &reqwest::Client,
    server: &str,
    webhook: &Value,
    message: &str,
    conversation_id: &str,
) -> anyhow::Result<String> {
    let mut body = webhook.clone();
    body["payload"] = json!({
        "message": message,
        "conversationId": conversation_id,
    });
    let resp = client
        .post(format!("{}/relay/send", server))
        .json(&body)
        .send()
        .await
        .with_context(|| format!("connecting to hookchat server at {}", server))?;
    let reply: Value = resp.json().await.context("reading server response")?;
    if reply["success"].as_bool() == Some(true) {
        return Ok(reply["content"].as_str().unwrap_or_default().to_string());
    }
    let error = reply["error"].as_str().unwrap_or("request failed");
    match reply["code"].as_str() {
        Some(code) => anyhow::bail!("{} ({})", error, code),
        None => anyhow::bail!("{}: {}", error, reply["details"]),
    }
}

async fn run_chat(
    config_path: Option<PathBuf>,
    url: String,
    method: String,
    headers: Vec<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = lib::config::load_config(config_path)?;
    let port = lib::config::resolve_port(&config);
    let server = format!("http://127.0.0.1:{}", port);
    let webhook = webhook_body(&url, &method, &headers)?;
    let conversation_id = uuid::Uuid::new_v4().to_string();
    let client = reqwest::Client::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        match relay_send(&client, &server, &webhook, input, &conversation_id).await {
            Ok(reply) => println!("< {}", reply),
            Err(e) => eprintln!("chat error: {:#}", e),
        }
    }
    Ok(())
}

async fn run_check(url: String, method: String, headers: Vec<String>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(None)?;
    let body = webhook_body(&url, &method, &headers)?;
    let request = RelayRequest::from_json(RelayKind::Test, &body)?;
    let client = RelayClient::new(&config.relay);
    match client.test(&request).await {
        Ok(outcome) => {
            println!(
                "{} {} in {}ms",
                outcome.status, outcome.status_text, outcome.response_time
            );
            println!("{}", serde_json::to_string_pretty(&outcome.data)?);
            Ok(())
        }
        Err(e) => anyhow::bail!("{} [{}]: {}", e.message(), e.kind(), e.details()),
    }
}
