use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tal_types::{Amount, EntryKind};

#[derive(Parser)]
#[command(
    name = "tal",
    about = "Ticket Audit Ledger: tamper-evident transaction log",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "tal.toml")]
    pub config: PathBuf,

    /// Journal file, overriding `ledger.journal_path`.
    #[arg(long, global = true)]
    pub journal: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Append a transaction to the ledger
    Append(AppendArgs),
    /// List entries, newest first
    Log(LogArgs),
    /// Show a single entry
    Show(ShowArgs),
    /// Verify hash chain integrity (exit status 2 on failure)
    Verify(VerifyArgs),
    /// Totals per transaction kind
    Summary,
    /// Corrupt one stored entry without rehashing (demo only)
    #[cfg(feature = "tamper")]
    Tamper(TamperArgs),
    /// Run the ticket simulator for a number of ticks
    Simulate(SimulateArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct AppendArgs {
    #[arg(value_parser = parse_kind)]
    pub kind: EntryKind,
    #[arg(value_parser = parse_amount)]
    pub amount: Amount,
    /// Business record, e.g. a ticket id
    pub subject: String,
    /// Responsible agent
    pub actor: String,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long)]
    pub oneline: bool,
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<EntryKind>,
    #[arg(long)]
    pub actor: Option<String>,
    #[arg(long)]
    pub subject: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub id: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Verify in batches of this many entries instead of one pass
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[cfg(feature = "tamper")]
#[derive(Args)]
pub struct TamperArgs {
    /// Append position to corrupt; defaults to the middle entry
    #[arg(long)]
    pub index: Option<usize>,
    /// Replacement amount (requires --index)
    #[arg(long, value_parser = parse_amount, requires = "index")]
    pub amount: Option<Amount>,
    /// Replacement subject (requires --index)
    #[arg(long, requires = "index", conflicts_with = "amount")]
    pub subject: Option<String>,
}

#[derive(Args)]
pub struct SimulateArgs {
    #[arg(long, default_value = "10")]
    pub ticks: u64,
    /// Seed overriding `simulation.seed`
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address overriding `server.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Feed simulated ticket sales into the ledger while serving
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the defaults to the config path if it does not exist
    #[arg(long)]
    pub init: bool,
}

fn parse_kind(s: &str) -> Result<EntryKind, String> {
    s.parse().map_err(|e: tal_types::TypeError| e.to_string())
}

fn parse_amount(s: &str) -> Result<Amount, String> {
    s.parse().map_err(|e: tal_types::TypeError| e.to_string())
}
