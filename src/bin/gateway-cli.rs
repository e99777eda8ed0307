use clap::{Parser, Subcommand};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::io::Write;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client for the orchestrator streaming gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8090")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness
    Health,
    /// Open a chat stream and print chunks as they arrive
    Stream {
        /// Session to stream messages for
        session_id: String,

        /// JSON request body
        #[arg(short, long, default_value = "{}")]
        body: String,

        /// Bearer token
        #[arg(short, long, env = "GATEWAY_TOKEN")]
        token: Option<String>,

        /// Print arrival time of every chunk to stderr
        #[arg(long)]
        timings: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client
                .get(format!("{base}/orchestrator/v1/healthz"))
                .send()
                .await?;
            let status = res.status();
            let text = res.text().await?;
            if status.is_success() {
                println!("{text}");
            } else {
                eprintln!("Error: gateway returned status {status}");
                eprintln!("Response: {text}");
                std::process::exit(1);
            }
        }
        Commands::Stream {
            session_id,
            body,
            token,
            timings,
        } => {
            let mut req = client
                .post(format!(
                    "{base}/orchestrator/v1/sessions/{session_id}/messages/stream"
                ))
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "text/event-stream")
                .body(body);
            if let Some(token) = token {
                req = req.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let started = Instant::now();
            let mut res = req.send().await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: gateway returned status {status}");
                eprintln!("Response: {}", res.text().await?);
                std::process::exit(1);
            }

            let mut stdout = std::io::stdout();
            while let Some(chunk) = res.chunk().await? {
                if timings {
                    eprintln!(
                        "[{:>8.1} ms] {} bytes",
                        started.elapsed().as_secs_f64() * 1000.0,
                        chunk.len()
                    );
                }
                stdout.write_all(&chunk)?;
                stdout.flush()?;
            }
        }
    }

    Ok(())
}
