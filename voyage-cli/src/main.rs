//! voyage-cli: operator client for the Voyage travel-planner gateway
//!
//! Talks to `voyage-server` over HTTP and prints the `data` of each reply.
//!
//! # Subcommands
//! - `chat <message> [--session ID] [--stream]`: one agent turn
//! - `trips | params | all <user> [-n N]`: list stored records
//! - `trip | delete <user> <conversation>`: single record
//! - `search <user> [--destination D] [--budget-tier T]`
//! - `enrich <name>...`: geocode place names
//! - `status`: server health

use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "voyage-cli", version, about = "Voyage travel-planner gateway client")]
struct Cli {
    /// Gateway URL (overrides VOYAGE_HTTP_URL env var)
    #[arg(long, env = "VOYAGE_HTTP_URL", default_value = DEFAULT_SERVER, global = true)]
    server: String,

    /// Print the raw `data` of the reply as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a message to the travel agent
    Chat {
        message: String,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,

        /// Print the reply as it streams in
        #[arg(long)]
        stream: bool,
    },

    /// List a user's itineraries, newest first
    Trips {
        user: String,
        #[arg(short = 'n', long)]
        limit: Option<i64>,
    },

    /// Show one trip record
    Trip { user: String, conversation: String },

    /// Search itineraries by destination and budget tier
    Search {
        user: String,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        budget_tier: Option<String>,
    },

    /// List a user's trip parameter records
    Params {
        user: String,
        #[arg(short = 'n', long)]
        limit: Option<i64>,
    },

    /// List every record of a user
    All {
        user: String,
        #[arg(short = 'n', long)]
        limit: Option<i64>,
    },

    /// Delete one trip record
    Delete { user: String, conversation: String },

    /// Geocode place names
    Enrich {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show gateway health
    Status,
}

// ============================================================================
// Wire types
// ============================================================================

/// Reply envelope shared by every `/api` endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Decode one SSE line into its JSON frame; comments and blank lines are `None`.
pub fn parse_sse_line(line: &str) -> Option<Value> {
    let payload = line.strip_prefix("data:")?.trim_start();
    serde_json::from_str(payload).ok()
}

/// One-line summary of a trip record.
pub fn format_trip(record: &Value) -> String {
    let field = |name: &str| record.get(name).and_then(Value::as_str).unwrap_or("-");
    let mut line = format!(
        "{}  [{}]  {}",
        field("conversationId"),
        field("dataType"),
        field("destination")
    );
    if let Some(tier) = record.get("budget_tier").and_then(Value::as_str) {
        line.push_str(&format!(" ({tier})"));
    }
    if let Some(days) = record.get("itinerary").and_then(Value::as_array) {
        line.push_str(&format!(", {} days", days.len()));
    }
    line
}

/// `name: lat, lng` or `name: not found`.
pub fn format_location(name: &str, point: &Value) -> String {
    match (point.get("lat").and_then(Value::as_f64), point.get("lng").and_then(Value::as_f64)) {
        (Some(lat), Some(lng)) => {
            let address = point
                .get("formatted_address")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("{name}: {lat:.5}, {lng:.5}  {address}")
        }
        _ => format!("{name}: not found"),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Gateway {
    client: Client,
    server: String,
}

impl Gateway {
    /// `None` disables the whole-request timeout; the blocking client
    /// otherwise defaults to 30 seconds.
    fn new(server: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    /// Send the request and unwrap the envelope; a failed envelope becomes an error.
    fn call(&self, request: RequestBuilder) -> anyhow::Result<Envelope> {
        let resp = request
            .send()
            .with_context(|| format!("cannot reach {}", self.server))?;
        let status = resp.status();
        let envelope: Envelope = resp
            .json()
            .with_context(|| format!("server returned {status} without an envelope"))?;
        if !envelope.success {
            return Err(anyhow!(envelope.message));
        }
        Ok(envelope)
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Envelope> {
        self.call(self.client.get(self.url(path)).query(query))
    }

    fn post(&self, path: &str, body: &Value) -> anyhow::Result<Envelope> {
        self.call(self.client.post(self.url(path)).json(body))
    }

    fn delete(&self, path: &str) -> anyhow::Result<Envelope> {
        self.call(self.client.delete(self.url(path)))
    }
}

fn limit_query(limit: Option<i64>) -> Vec<(&'static str, String)> {
    limit.map(|n| vec![("limit", n.to_string())]).unwrap_or_default()
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_records(envelope: Envelope, json_output: bool) -> anyhow::Result<()> {
    let data = envelope.data.unwrap_or(Value::Null);
    if json_output {
        return print_json(&data);
    }
    eprintln!("{}", envelope.message);
    for record in data.as_array().into_iter().flatten() {
        println!("{}", format_trip(record));
    }
    Ok(())
}

fn do_chat(
    gateway: &Gateway,
    message: &str,
    session: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let envelope = gateway.post(
        "/api/chat/send",
        &json!({ "message": message, "sessionId": session }),
    )?;
    let data = envelope.data.unwrap_or(Value::Null);
    if json_output {
        return print_json(&data);
    }
    println!("{}", data["response"].as_str().unwrap_or_default());
    if let Some(session_id) = data["sessionId"].as_str() {
        eprintln!("session: {session_id}");
    }
    Ok(())
}

/// Read SSE frames until `done` or `error`, printing content as it arrives.
fn do_chat_stream(
    gateway: &Gateway,
    message: &str,
    session: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let resp = gateway
        .client
        .post(gateway.url("/api/chat/stream"))
        .json(&json!({ "message": message, "sessionId": session }))
        .send()
        .with_context(|| format!("cannot reach {}", gateway.server))?;

    if !resp.status().is_success() {
        let envelope: Envelope = resp.json()?;
        return Err(anyhow!(envelope.message));
    }

    let mut stdout = std::io::stdout();
    for line in BufReader::new(resp).lines() {
        let Some(frame) = parse_sse_line(&line?) else {
            continue;
        };
        if json_output {
            println!("{frame}");
        }
        match frame["type"].as_str() {
            Some("session") if !json_output => {
                eprintln!("session: {}", frame["sessionId"].as_str().unwrap_or("?"));
            }
            Some("content") if !json_output => {
                write!(stdout, "{}", frame["text"].as_str().unwrap_or_default())?;
                stdout.flush()?;
            }
            Some("done") => {
                if !json_output {
                    writeln!(stdout)?;
                }
                return Ok(());
            }
            Some("error") => {
                return Err(anyhow!(frame["message"]
                    .as_str()
                    .unwrap_or("stream failed")
                    .to_string()));
            }
            _ => {}
        }
    }
    Err(anyhow!("stream ended without a done frame"))
}

fn do_enrich(gateway: &Gateway, names: &[String], json_output: bool) -> anyhow::Result<()> {
    let envelope = gateway.post("/api/locations/enrich", &json!({ "locations": names }))?;
    let data = envelope.data.unwrap_or(Value::Null);
    if json_output {
        return print_json(&data);
    }
    eprintln!("{}", envelope.message);
    for name in names {
        println!("{}", format_location(name, &data["locations"][name]));
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(gateway: &Gateway, json_output: bool) -> anyhow::Result<()> {
    let resp = gateway
        .client
        .get(gateway.url("/health"))
        .send()
        .with_context(|| format!("cannot reach {}", gateway.server))?;
    let status = resp.status();
    let body: Value = resp.json().unwrap_or_default();

    if json_output {
        print_json(&body)?;
    } else {
        println!("Voyage gateway: {}", body["status"].as_str().unwrap_or("unknown"));
        println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
        println!("Storage:        {}", body["storage"].as_str().unwrap_or("?"));
    }
    if !status.is_success() {
        return Err(anyhow!("server unhealthy (HTTP {status})"));
    }
    Ok(())
}

/// Agent turns can run for minutes; everything else gets a fixed timeout.
fn request_timeout(command: &Commands) -> Option<Duration> {
    match command {
        Commands::Chat { .. } => None,
        _ => Some(Duration::from_secs(30)),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let gateway = Gateway::new(&cli.server, request_timeout(&cli.command))?;
    let json_output = cli.json;

    match cli.command {
        Commands::Chat {
            message,
            session,
            stream,
        } => {
            if stream {
                do_chat_stream(&gateway, &message, session, json_output)
            } else {
                do_chat(&gateway, &message, session, json_output)
            }
        }
        Commands::Trips { user, limit } => print_records(
            gateway.get(&format!("/api/trips/{user}"), &limit_query(limit))?,
            json_output,
        ),
        Commands::Trip { user, conversation } => {
            let envelope = gateway.get(&format!("/api/trips/{user}/{conversation}"), &[])?;
            print_json(&envelope.data.unwrap_or(Value::Null))
        }
        Commands::Search {
            user,
            destination,
            budget_tier,
        } => {
            let mut query = Vec::new();
            if let Some(destination) = destination {
                query.push(("destination", destination));
            }
            if let Some(tier) = budget_tier {
                query.push(("budget_tier", tier));
            }
            print_records(
                gateway.get(&format!("/api/trips/{user}/search"), &query)?,
                json_output,
            )
        }
        Commands::Params { user, limit } => print_records(
            gateway.get(&format!("/api/trips/{user}/parameters"), &limit_query(limit))?,
            json_output,
        ),
        Commands::All { user, limit } => print_records(
            gateway.get(&format!("/api/trips/{user}/all"), &limit_query(limit))?,
            json_output,
        ),
        Commands::Delete { user, conversation } => {
            let envelope = gateway.delete(&format!("/api/trips/{user}/{conversation}"))?;
            println!("{}", envelope.message);
            Ok(())
        }
        Commands::Enrich { names } => do_enrich(&gateway, &names, json_output),
        Commands::Status => do_status(&gateway, json_output),
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("voyage-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
