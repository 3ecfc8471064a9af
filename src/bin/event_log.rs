use loopdeck_lib::config::CoreConfig;
use loopdeck_lib::{init_tracing, LoopdeckCore};

const DEFAULT_LIMIT: i64 = 500;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("event log failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let mut project_id: Option<String> = None;
    let mut after_seq = -1i64;
    let mut limit = DEFAULT_LIMIT;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(());
        }
        if let Some(value) = arg.strip_prefix("--after=") {
            after_seq = parse_number("--after", value)?;
            continue;
        }
        if arg == "--after" {
            let value = args.next().ok_or_else(|| "--after requires a value".to_string())?;
            after_seq = parse_number("--after", &value)?;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--limit=") {
            limit = parse_number("--limit", value)?;
            continue;
        }
        if arg == "--limit" {
            let value = args.next().ok_or_else(|| "--limit requires a value".to_string())?;
            limit = parse_number("--limit", &value)?;
            continue;
        }
        if arg.starts_with('-') {
            return Err(format!("unknown flag '{arg}'. Use --help for usage"));
        }
        if project_id.replace(arg).is_some() {
            return Err("only one project id may be given".to_string());
        }
    }

    let project_id = project_id.ok_or_else(|| "missing project id. Use --help for usage".to_string())?;
    if limit <= 0 {
        return Err("--limit must be positive".to_string());
    }

    let config = CoreConfig::from_env();
    init_tracing(&config);
    let core = LoopdeckCore::open(config).map_err(|e| e.to_string())?;

    let project = core
        .lifecycle()
        .get(&project_id)
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!(project_id = %project.id, status = %project.status, "replaying event log");

    let events = core
        .events_after(&project_id, after_seq, limit)
        .map_err(|e| e.to_string())?;
    for event in &events {
        let line = serde_json::to_string(event).map_err(|e| e.to_string())?;
        println!("{line}");
    }
    eprintln!("{} event(s) for {} ({})", events.len(), project.name, project.status);
    Ok(())
}

fn parse_number(flag: &str, value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("{flag} expects an integer, got '{value}'"))
}

fn print_help() {
    println!(
        "Print a project's stored events as JSON lines.\n\n\
         Usage: event_log <project-id> [--after <seq>] [--limit <n>]\n\n\
         Options:\n  \
           --after <seq>   only events with a greater sequence number (default: all)\n  \
           --limit <n>     maximum number of events (default: {DEFAULT_LIMIT})\n\n\
         The database location follows LOOPDECK_DATA_DIR (see .env)."
    );
}
