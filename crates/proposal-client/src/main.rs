use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use proposal_client::{HttpProposalService, ProposalSession, ResponseView, SubmitOutcome};
use proposal_types::{Decision, Proposal};

#[derive(Debug, Parser)]
#[command(name = "proposal", version, about = "Answer and inspect proposals")]
struct Cli {
    /// Root URL of the proposal service.
    #[arg(
        long,
        env = "PROPOSAL_API_URL",
        default_value = "http://localhost:8001",
        global = true
    )]
    base_url: String,

    /// Per-request timeout in seconds. 0 waits forever.
    #[arg(
        long,
        env = "PROPOSAL_REQUEST_TIMEOUT_SECS",
        default_value_t = 15,
        global = true
    )]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the proposal and record a decision against it.
    Respond {
        /// `yes`, or `no` for "I need some time".
        decision: Decision,
        /// JSON file holding the proposal payload.
        #[arg(long, env = "PROPOSAL_FILE")]
        proposal_file: PathBuf,
    },
    /// Print a stored proposal.
    Show { proposal_id: String },
    /// Print a proposal's response status.
    Status { proposal_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proposal=info,proposal_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = (cli.timeout_secs > 0).then(|| Duration::from_secs(cli.timeout_secs));
    let service = HttpProposalService::new(&cli.base_url, timeout)?;

    match cli.command {
        Command::Respond {
            decision,
            proposal_file,
        } => respond(service, timeout, decision, &proposal_file).await,
        Command::Show { proposal_id } => {
            let record = service.fetch_proposal(&proposal_id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Status { proposal_id } => {
            let status = service.fetch_status(&proposal_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn respond(
    service: HttpProposalService,
    timeout: Option<Duration>,
    decision: Decision,
    proposal_file: &Path,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(proposal_file)
        .await
        .with_context(|| format!("reading {}", proposal_file.display()))?;
    let proposal: Proposal = serde_json::from_str(&raw)
        .with_context(|| format!("parsing proposal in {}", proposal_file.display()))?;

    let session = ProposalSession::new(service, proposal).with_request_timeout(timeout);
    info!(
        base_url = %session.service().base_url(),
        partner = %session.proposal().partner_name,
        "Submitting decision"
    );
    let outcome = session.submit_decision(decision).await;

    println!("{}", ResponseView::for_snapshot(&session.snapshot()));

    match outcome {
        SubmitOutcome::Responded { proposal_id, .. } => {
            println!("proposal id: {proposal_id}");
            Ok(())
        }
        SubmitOutcome::Failed(e) => bail!("decision was not recorded: {e}"),
        SubmitOutcome::AlreadyResponded | SubmitOutcome::Busy => Ok(()),
    }
}
