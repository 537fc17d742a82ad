use clap::Parser;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "trace-probe")]
#[command(about = "Send a request with trace propagation headers and show the correlation response", long_about = None)]
struct Cli {
    /// Target URL
    #[arg(default_value = "http://localhost:8080/")]
    url: String,

    /// Correlation id sent as x-request-id
    #[arg(short, long)]
    request_id: Option<String>,

    /// Caller service key sent as x-parent
    #[arg(short, long)]
    parent: Option<u64>,

    /// Caller span id sent as x-span-id
    #[arg(short, long)]
    span_id: Option<String>,

    /// Force escalated severity
    #[arg(short, long)]
    must_collect: bool,

    /// Client send time in µs (defaults to now)
    #[arg(long)]
    client_send: Option<u64>,

    /// Omit x-client-send entirely
    #[arg(long, conflicts_with = "client_send")]
    no_client_send: bool,
}

const CORRELATION_HEADERS: [&str; 4] = ["x-parent", "x-server-send", "x-must-collect", "x-request-id"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(id) = &cli.request_id {
        headers.insert("x-request-id", HeaderValue::from_str(id)?);
    }
    if let Some(parent) = cli.parent {
        headers.insert("x-parent", HeaderValue::from(parent));
    }
    if let Some(span_id) = &cli.span_id {
        headers.insert("x-span-id", HeaderValue::from_str(span_id)?);
    }
    if cli.must_collect {
        headers.insert("x-must-collect", HeaderValue::from_static("1"));
    }
    if !cli.no_client_send {
        let sent = match cli.client_send {
            Some(ts) => ts,
            None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_micros() as u64,
        };
        headers.insert("x-client-send", HeaderValue::from(sent));
    }

    let res = client.get(&cli.url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();

    let mut correlation = Map::new();
    for name in CORRELATION_HEADERS {
        if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
            correlation.insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    let text = res.text().await.unwrap_or_default();
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    let out = json!({
        "status": status.as_u16(),
        "headers": correlation,
        "body": body,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    if !status.is_success() {
        eprintln!("Error: target returned status {}", status);
    }
    Ok(())
}
