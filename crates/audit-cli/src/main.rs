use anyhow::{Context, Result};
use audit_cli::{load_changes, load_version, merge, parse_events, replay, MergeReport, ReplayReport};
use audit_draft::{DraftStatus, SessionConfig};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("auditctl")
        .version(audit_cli::VERSION)
        .about("Analysis version status and draft tooling")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Session config (TOML)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity"),
        )
        .subcommand(
            Command::new("replay")
                .about("Fold a recorded status stream into a version status")
                .arg(
                    Arg::new("version")
                        .long("version")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Version record (JSON)"),
                )
                .arg(
                    Arg::new("events")
                        .long("events")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Status events, one JSON object per line"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("merge")
                .about("Preview a draft over a version, optionally committing it")
                .arg(
                    Arg::new("version")
                        .long("version")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Base version record (JSON)"),
                )
                .arg(
                    Arg::new("draft")
                        .long("draft")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Staged changes (JSON array)"),
                )
                .arg(
                    Arg::new("commit")
                        .long("commit")
                        .action(ArgAction::SetTrue)
                        .help("Commit through an in-memory store and print the new version"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_tracing(json: bool, verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn path_arg(args: &ArgMatches, name: &str) -> Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

fn load_config(matches: &ArgMatches) -> Result<SessionConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => SessionConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

fn print_replay(report: &ReplayReport) {
    let snapshot = &report.snapshot;
    println!("Version {}: {}", snapshot.version_id, snapshot.status);
    for scope in &snapshot.scopes {
        match scope.finding_count {
            Some(count) => println!("  {:<24} {:<10} {count} findings", scope.scope_id, scope.status),
            None => println!("  {:<24} {}", scope.scope_id, scope.status),
        }
    }
    println!();
    println!("Events: {}  Faults: {}  Findings reported: {}", report.events, report.faults, snapshot.finding_total);
    if !snapshot.connected {
        println!("Stream ended on a fault; status is the last known value");
    }
}

fn print_merge(report: &MergeReport) {
    let view = &report.view;
    println!("Draft over {}", view.base_version_id);
    for scope in &view.scopes {
        println!("  {} ({})", scope.scope.name, scope.scope.id);
        for decorated in &scope.findings {
            let marker = match decorated.draft_status {
                DraftStatus::Committed => " ",
                DraftStatus::Modified => "~",
                DraftStatus::New => "+",
            };
            println!(
                "    {marker} {:<28} {:<8} {}",
                decorated.finding.name(),
                decorated.finding.level(),
                decorated.finding.id
            );
        }
    }
    for deleted in &view.pending_deletions {
        println!("    - {:<28} {:<8} {}", deleted.name(), deleted.level(), deleted.id);
    }

    let summary = view.summary();
    println!();
    println!(
        "Committed: {}  Modified: {}  Added: {}  Deleted: {}",
        summary.committed, summary.modified, summary.added, summary.deleted
    );
    if let Some(version) = &report.committed {
        println!(
            "Committed as {} (parent {})",
            version.id(),
            version.parent_version_id().map_or("-", |p| p.as_str())
        );
    }
}

async fn run(matches: ArgMatches) -> Result<()> {
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("replay", args)) => {
            let version = load_version(&path_arg(args, "version")?)?;
            let events_path = path_arg(args, "events")?;
            let raw = std::fs::read_to_string(&events_path)
                .with_context(|| format!("reading {}", events_path.display()))?;

            let report = replay(&version, parse_events(&raw), config.event_buffer).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_replay(&report);
            }
        }
        Some(("merge", args)) => {
            let version = load_version(&path_arg(args, "version")?)?;
            let changes = load_changes(&path_arg(args, "draft")?)?;

            let report = merge(version, changes, &config, args.get_flag("commit")).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_merge(&report);
            }
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"), matches.get_count("verbose"));

    if let Err(err) = run(matches).await {
        tracing::error!(error = %err, "auditctl failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
