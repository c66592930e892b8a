use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Management CLI for the resilience layer admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081", env = "RESILIENCE_ADMIN_URL")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION", env = "RESILIENCE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall status and breaker counts
    Status,
    /// Health summary of every circuit breaker
    Breakers,
    /// Detailed stats for one circuit breaker
    Breaker { name: String },
    /// Force a circuit breaker open
    Open { name: String },
    /// Force a circuit breaker closed
    Close { name: String },
    /// Force every circuit breaker closed
    Reset,
    /// Rate limiter stats
    Limiters,
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".into()),
            Commands::Breakers => (Method::GET, "/admin/breakers".into()),
            Commands::Breaker { name } => (Method::GET, format!("/admin/breakers/{}", name)),
            Commands::Open { name } => (Method::POST, format!("/admin/breakers/{}/open", name)),
            Commands::Close { name } => (Method::POST, format!("/admin/breakers/{}/close", name)),
            Commands::Reset => (Method::POST, "/admin/breakers/reset".into()),
            Commands::Limiters => (Method::GET, "/admin/limiters".into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.request();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
