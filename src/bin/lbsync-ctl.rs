use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "lbsync-ctl")]
#[command(about = "Query a running kube-lb-sync status endpoint", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Controller state and readiness
    Health,
    /// Reconcile counters, last applied hash and last violations
    Status,
    /// Only the violations that blocked the last reconcile
    Violations,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/healthz")).send().await?;
            let ready = res.status().is_success();
            print_json(res.json().await?)?;
            if !ready {
                std::process::exit(1);
            }
        }
        Commands::Status => {
            let res = client.get(format!("{base}/status")).send().await?;
            print_response(res).await?;
        }
        Commands::Violations => {
            let res = client.get(format!("{base}/status")).send().await?;
            let status: Value = res.error_for_status()?.json().await?;
            print_json(status["last_violations"].clone())?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: status endpoint returned {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    print_json(res.json().await?)
}

fn print_json(json: Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
