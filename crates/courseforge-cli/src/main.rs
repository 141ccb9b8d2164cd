//! Courseforge CLI - command line interface for the orchestration server.

use clap::{Parser, Subcommand};
use serde_json::json;

use courseforge_client::ApiClient;
use courseforge_core::Run;

/// Courseforge CLI - orchestration management tool
#[derive(Parser)]
#[command(name = "courseforge")]
#[command(about = "CLI for the Courseforge orchestration server", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run
    Start {
        /// Topic to generate content for
        #[arg(short, long)]
        topic: String,

        /// Use fixture results instead of the live model
        #[arg(long)]
        simulate: bool,
    },

    /// Get a run's status
    Get {
        /// Run ID
        id: String,
    },

    /// List all runs
    #[command(name = "list-runs")]
    ListRuns,

    /// List a run's tasks
    Tasks {
        /// Run ID
        id: String,
    },

    /// Print a run's event log
    Logs {
        /// Run ID
        id: String,
    },

    /// Cancel a run
    Cancel {
        /// Run ID to cancel
        id: String,
    },

    /// Record feedback for a run
    Feedback {
        /// Run ID
        id: String,

        /// accept, edit, or reject
        #[arg(short, long)]
        decision: String,

        /// 1-5 rating
        #[arg(short, long)]
        rating: Option<u8>,

        /// Free-form comment
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Show queue counters
    Queue,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.addr);

    match cli.command {
        Commands::Start { topic, simulate } => {
            let run_id = client
                .start_run(json!({ "topic": topic, "simulation": simulate }))
                .await?;
            println!("Run started: {}", run_id);
        }
        Commands::Get { id } => {
            let run = client.get_run(&id).await?;
            print_run_header();
            print_run_row(&run);
            if let Some(error) = &run.error {
                println!("  Error: {}", error);
            }
            if let Some(output) = &run.output {
                println!("{}", serde_json::to_string_pretty(output)?);
            }
        }
        Commands::ListRuns => {
            let runs = client.list_runs().await?;
            println!("Runs ({}):", runs.len());
            print_run_header();
            for run in &runs {
                print_run_row(run);
            }
        }
        Commands::Tasks { id } => {
            let tasks = client.list_tasks(&id).await?;
            println!("Tasks ({}):", tasks.len());
            println!("{:<36}  {:<20}  {:<10}", "ID", "AGENT", "STATUS");
            println!("{}", "-".repeat(70));
            for task in tasks {
                println!(
                    "{:<36}  {:<20}  {:<10}",
                    task.id.to_string(),
                    task.agent.to_string(),
                    task.status.to_string(),
                );
            }
        }
        Commands::Logs { id } => {
            for line in client.list_logs_compact(&id).await? {
                println!("{}", line);
            }
        }
        Commands::Cancel { id } => {
            let run = client.cancel_run(&id).await?;
            println!("Run cancelled:");
            print_run_header();
            print_run_row(&run);
        }
        Commands::Feedback {
            id,
            decision,
            rating,
            comment,
        } => {
            let feedback = client
                .post_feedback(
                    &id,
                    json!({ "decision": decision, "rating": rating, "comment": comment }),
                )
                .await?;
            println!("Feedback recorded: {}", feedback.id);
        }
        Commands::Queue => {
            let state = client.queue_state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

fn print_run_header() {
    println!("{:<36}  {:<14}  {}", "ID", "STATUS", "CREATED");
    println!("{}", "-".repeat(72));
}

fn print_run_row(run: &Run) {
    println!(
        "{:<36}  {:<14}  {}",
        run.id.to_string(),
        run.status.to_string(),
        run.created_at.format("%Y-%m-%d %H:%M:%S"),
    );
}
