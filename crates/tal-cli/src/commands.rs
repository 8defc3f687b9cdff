use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tal_crypto::VerificationReport;
use tal_ledger::{
    AnomalyNotifier, AppendPipeline, ChannelSink, DiscrepancyMonitor, EntryFactory, EntryFilter,
    JournalLedger, LedgerReader, LedgerSummary, LedgerValidator, LedgerWriter, Notification,
    NotificationKind, TicketSimulator,
};
use tal_server::{TalConfig, TalServer};
use tal_types::{EntryId, LedgerEntry, TransactionEvent};
use tokio::sync::watch;

use crate::cli::*;

/// Exit status of `tal verify` when the chain is broken.
const EXIT_VERIFY_FAILED: u8 = 2;

struct Session {
    config: TalConfig,
    format: OutputFormat,
}

impl Session {
    fn open_ledger(&self) -> anyhow::Result<JournalLedger> {
        let path = &self.config.ledger.journal_path;
        JournalLedger::open(path, EntryFactory::with_hasher(self.config.hasher()))
            .with_context(|| format!("opening journal {}", path.display()))
    }

    fn json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = TalConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(journal) = cli.journal {
        config.ledger.journal_path = journal;
    }
    let ctx = Session {
        config,
        format: cli.format,
    };

    match cli.command {
        Command::Append(args) => cmd_append(&ctx, args),
        Command::Log(args) => cmd_log(&ctx, args),
        Command::Show(args) => cmd_show(&ctx, args),
        Command::Verify(args) => cmd_verify(&ctx, args),
        Command::Summary => cmd_summary(&ctx),
        #[cfg(feature = "tamper")]
        Command::Tamper(args) => cmd_tamper(&ctx, args),
        Command::Simulate(args) => cmd_simulate(&ctx, args),
        Command::Serve(args) => cmd_serve(ctx, args),
        Command::Config(args) => cmd_config(&ctx, &cli.config, args),
    }
}

fn print_entry(entry: &LedgerEntry, oneline: bool) {
    if oneline {
        println!(
            "{} {} {:>10} {} {}",
            entry.hash.short_hex().yellow(),
            entry.id.as_str().dimmed(),
            entry.amount.to_string().bold(),
            entry.kind,
            entry.subject_id
        );
        return;
    }
    println!("{} {}", "entry".yellow().bold(), entry.id.as_str().yellow());
    println!("  Kind:     {}", entry.kind.to_string().cyan());
    println!("  Amount:   {}", entry.amount.to_string().bold());
    println!("  Created:  {}", tal_types::canonical_timestamp(&entry.created_at));
    println!("  Subject:  {}", entry.subject_id);
    println!("  Actor:    {}", entry.actor_id);
    println!("  Hash:     {}", entry.hash.to_hex().dimmed());
    println!("  Previous: {}", entry.previous_hash.to_hex().dimmed());
    if let Some(score) = &entry.fraud_score {
        let reason = score.reason.as_deref().unwrap_or("-");
        println!("  Fraud:    {} ({reason})", score.score());
    }
}

fn print_report(report: &VerificationReport) {
    if report.ok {
        println!("{} Hash chain integrity verified", "✓".green().bold());
    } else {
        println!("{} Verification {}", "✗".red().bold(), report.to_string().red());
    }
}

fn print_notification(notification: &Notification) {
    let kind = match notification.kind {
        NotificationKind::TransactionAnomaly => "Transaction Anomaly".yellow(),
        NotificationKind::HighFraudRisk => "High Fraud Risk".red(),
        NotificationKind::Discrepancy => "Discrepancy".magenta(),
    };
    println!("  {} {} ({})", kind.bold(), notification.message, notification.link.dimmed());
}

fn cmd_append(ctx: &Session, args: AppendArgs) -> anyhow::Result<ExitCode> {
    let ledger = ctx.open_ledger()?;
    let event = TransactionEvent::new(args.kind, args.amount, args.subject, args.actor);
    let entry = ledger.append_event(&event)?;

    let notifications = ctx.config.notify.evaluate(&entry);

    match ctx.format {
        OutputFormat::Json => ctx.json(&entry)?,
        OutputFormat::Text => {
            println!("{} Appended {}", "✓".green().bold(), entry.id.as_str().yellow());
            println!("  Hash: {}", entry.hash.to_hex().dimmed());
            for notification in &notifications {
                print_notification(notification);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_log(ctx: &Session, args: LogArgs) -> anyhow::Result<ExitCode> {
    let ledger = ctx.open_ledger()?;
    let filter = EntryFilter {
        kind: args.kind,
        actor_id: args.actor,
        subject_id: args.subject,
        ..EntryFilter::default()
    };
    let entries: Vec<LedgerEntry> = filter.apply(&ledger)?.into_iter().take(args.limit).collect();

    match ctx.format {
        OutputFormat::Json => ctx.json(&entries)?,
        OutputFormat::Text if entries.is_empty() => println!("No entries."),
        OutputFormat::Text => {
            for entry in &entries {
                print_entry(entry, args.oneline);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(ctx: &Session, args: ShowArgs) -> anyhow::Result<ExitCode> {
    let ledger = ctx.open_ledger()?;
    let entry = ledger
        .get(&EntryId::new(args.id.clone()))?
        .with_context(|| format!("entry {} not found", args.id))?;
    match ctx.format {
        OutputFormat::Json => ctx.json(&entry)?,
        OutputFormat::Text => print_entry(&entry, false),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify(ctx: &Session, args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let ledger = ctx.open_ledger()?;
    let validator = LedgerValidator::new(ctx.config.hasher());
    let report = match args.batch_size {
        Some(size) => validator.with_batch_size(size).verify_batched(&ledger)?,
        None => validator.verify(&ledger)?,
    };

    match ctx.format {
        OutputFormat::Json => ctx.json(&report)?,
        OutputFormat::Text => {
            print_report(&report);
            println!("  Entries: {}", ledger.len()?);
        }
    }
    Ok(if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_VERIFY_FAILED)
    })
}

fn cmd_summary(ctx: &Session) -> anyhow::Result<ExitCode> {
    let summary = LedgerSummary::of(&ctx.open_ledger()?)?;
    match ctx.format {
        OutputFormat::Json => ctx.json(&summary)?,
        OutputFormat::Text => {
            println!("Entries: {}", summary.entry_count.to_string().bold());
            for (kind, total) in &summary.total_by_kind {
                println!("  {:<15} {:>12}", kind.to_string(), total.to_string());
            }
            if let Some(head) = summary.head_hash {
                println!("Head: {}", head.to_hex().dimmed());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "tamper")]
fn cmd_tamper(ctx: &Session, args: TamperArgs) -> anyhow::Result<ExitCode> {
    use tal_ledger::{tamper, tamper_at, TamperMutation};

    let ledger = ctx.open_ledger()?;
    let id = match (args.index, args.amount, args.subject) {
        (Some(index), Some(amount), _) => tamper_at(&ledger, index, TamperMutation::Amount(amount))?,
        (Some(index), None, Some(subject)) => tamper_at(&ledger, index, TamperMutation::Subject(subject))?,
        (Some(index), None, None) => {
            tamper_at(&ledger, index, TamperMutation::Raise(tal_ledger::tamper::TAMPER_DELTA))?
        }
        (None, _, _) => tamper(&ledger)?,
    };

    match ctx.format {
        OutputFormat::Json => ctx.json(&serde_json::json!({ "tampered": id }))?,
        OutputFormat::Text => {
            println!("{} Tampered with entry {}", "!".red().bold(), id.as_str().yellow());
            println!("  Run {} to see the failure.", "tal verify".bold());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_simulate(ctx: &Session, args: SimulateArgs) -> anyhow::Result<ExitCode> {
    let sim = &ctx.config.simulation;
    let mut simulator = TicketSimulator::new(sim.agents.clone(), sim.fee_every, args.seed.or(sim.seed))?;
    let ledger = Arc::new(ctx.open_ledger()?);
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    let monitor = Arc::new(DiscrepancyMonitor::new(sim.discrepancy_percent, args.seed.or(sim.seed)));

    let (appended, notifications) = runtime.block_on(async {
        let (sink, mut rx) = ChannelSink::new();
        let notifier = AnomalyNotifier::new(ctx.config.notify, Arc::new(sink));
        let pipeline = AppendPipeline::new(Arc::clone(&ledger), notifier)
            .with_discrepancies(Arc::clone(&monitor));

        let mut appended = Vec::new();
        for _ in 0..args.ticks {
            for event in simulator.tick() {
                appended.push(pipeline.submit(&event)?.entry);
            }
        }
        // Dropping the pipeline releases the last sink handle once the
        // spawned deliveries finish, which closes the channel.
        drop(pipeline);
        let mut notifications = Vec::new();
        while let Some(notification) = rx.recv().await {
            notifications.push(notification);
        }
        anyhow::Ok((appended, notifications))
    })?;
    let discrepancies = monitor.all()?;

    match ctx.format {
        OutputFormat::Json => ctx.json(&serde_json::json!({
            "entries": appended,
            "discrepancies": discrepancies,
            "notifications": notifications,
        }))?,
        OutputFormat::Text => {
            for entry in &appended {
                print_entry(entry, true);
            }
            println!(
                "{} Simulated {} ticks, {} entries appended",
                "✓".green().bold(),
                args.ticks,
                appended.len()
            );
            for d in &discrepancies {
                println!(
                    "  {} {} {} on {}",
                    d.id.magenta(),
                    d.kind,
                    format!("${}", d.amount.canonical()).bold(),
                    d.associated_entry_id.as_str().yellow()
                );
            }
            for notification in &notifications {
                print_notification(notification);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_serve(ctx: Session, args: ServeArgs) -> anyhow::Result<ExitCode> {
    let mut config = ctx.config;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    let ledger = JournalLedger::open(
        &config.ledger.journal_path,
        EntryFactory::with_hasher(config.hasher()),
    )?;
    let server = TalServer::new(config.clone(), Arc::new(ledger));

    println!(
        "TAL server on {} (journal: {})",
        config.server.bind_addr.to_string().bold(),
        config.ledger.journal_path.display()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(true);
            }
        });
        server.serve(args.simulate, stop_rx).await
    })?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(ctx: &Session, path: &std::path::Path, args: ConfigArgs) -> anyhow::Result<ExitCode> {
    if args.init {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        std::fs::write(path, TalConfig::default().to_toml()?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("{} Wrote {}", "✓".green().bold(), path.display().to_string().bold());
        return Ok(ExitCode::SUCCESS);
    }

    match ctx.format {
        OutputFormat::Json => ctx.json(&ctx.config)?,
        OutputFormat::Text => print!("{}", ctx.config.to_toml()?),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn run(dir: &std::path::Path, args: &[&str]) -> ExitCode {
        let config = dir.join("tal.toml");
        let journal = dir.join("ledger.journal");
        let mut argv = vec![
            "tal",
            "--config",
            config.to_str().unwrap(),
            "--journal",
            journal.to_str().unwrap(),
            "--format",
            "json",
        ];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn append_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run(dir.path(), &["append", "sale", "100.00", "TKT-1", "UA-AG-001"]), ExitCode::SUCCESS);
        assert_eq!(run(dir.path(), &["append", "fee", "5.00", "TKT-1", "UA-AG-001"]), ExitCode::SUCCESS);
        assert_eq!(run(dir.path(), &["verify"]), ExitCode::SUCCESS);
        assert_eq!(run(dir.path(), &["verify", "--batch-size", "1"]), ExitCode::SUCCESS);
        assert_eq!(run(dir.path(), &["summary"]), ExitCode::SUCCESS);
    }

    #[cfg(feature = "tamper")]
    #[test]
    fn verify_fails_after_tamper() {
        let dir = tempfile::tempdir().unwrap();
        for subject in ["TKT-1", "TKT-2", "TKT-3"] {
            run(dir.path(), &["append", "sale", "250.00", subject, "UA-AG-001"]);
        }
        assert_eq!(run(dir.path(), &["tamper", "--index", "1", "--amount", "400.00"]), ExitCode::SUCCESS);
        assert_eq!(run(dir.path(), &["verify"]), ExitCode::from(EXIT_VERIFY_FAILED));
    }

    #[test]
    fn simulate_appends_to_journal() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run(dir.path(), &["simulate", "--ticks", "4", "--seed", "7"]), ExitCode::SUCCESS);

        let ledger = JournalLedger::open(
            &dir.path().join("ledger.journal"),
            EntryFactory::with_hasher(tal_crypto::EntryHasher::SHA256),
        )
        .unwrap();
        // Four sales plus one fee on the fourth tick.
        assert_eq!(ledger.len().unwrap(), 5);
        assert_eq!(run(dir.path(), &["verify"]), ExitCode::SUCCESS);
    }

    #[test]
    fn simulate_flags_discrepancies_without_touching_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tal.toml"), "[simulation]\ndiscrepancy_percent = 100\n").unwrap();
        assert_eq!(run(dir.path(), &["simulate", "--ticks", "3", "--seed", "7"]), ExitCode::SUCCESS);
        assert_eq!(run(dir.path(), &["verify"]), ExitCode::SUCCESS);
    }

    #[test]
    fn append_over_threshold_succeeds_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run(dir.path(), &["append", "sale", "5000.00", "TKT-9", "UA-AG-001"]), ExitCode::SUCCESS);
        let ledger = JournalLedger::open(
            &dir.path().join("ledger.journal"),
            EntryFactory::with_hasher(tal_crypto::EntryHasher::SHA256),
        )
        .unwrap();
        let entry = ledger.head().unwrap().unwrap();
        let config = TalConfig::default();
        assert_eq!(config.notify.evaluate(&entry).len(), 1);
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run(dir.path(), &["config", "--init"]), ExitCode::SUCCESS);
        let written = std::fs::read_to_string(dir.path().join("tal.toml")).unwrap();
        assert_eq!(TalConfig::from_toml(&written).unwrap(), TalConfig::default());

        let config = dir.path().join("tal.toml");
        let cli = Cli::try_parse_from(["tal", "--config", config.to_str().unwrap(), "config", "--init"]).unwrap();
        assert!(run_command(cli).is_err());
    }

    #[test]
    fn show_unknown_entry_errors() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("ledger.journal");
        let cli = Cli::try_parse_from(["tal", "--journal", journal.to_str().unwrap(), "show", "TXN-404"]).unwrap();
        assert!(run_command(cli).is_err());
    }
}
