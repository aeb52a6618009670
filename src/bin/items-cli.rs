use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "items-cli")]
#[command(about = "Command-line client for the items service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an item
    Create { value: String },
    /// Fetch an item by id
    Get { id: String },
    /// Replace the value of an item
    Update { id: String, value: String },
    /// Delete an item
    Delete { id: String },
    /// List all items
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Create { value } => {
            client
                .post(format!("{}/items", base))
                .json(&json!({ "item": value }))
                .send()
                .await?
        }
        Commands::Get { id } => client.get(format!("{}/items/{}", base, id)).send().await?,
        Commands::Update { id, value } => {
            client
                .put(format!("{}/items/{}", base, id))
                .json(&json!({ "item": value }))
                .send()
                .await?
        }
        Commands::Delete { id } => client.delete(format!("{}/items/{}", base, id)).send().await?,
        Commands::List => client.get(format!("{}/items", base)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let trace_id = res
        .headers()
        .get("trace-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(trace_id) = &trace_id {
        eprintln!("Trace-Id: {}", trace_id);
    }

    if !status.is_success() {
        eprintln!("Error: items API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
