use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use ledger_glcode::{
    backend_for, import_ledgers, load_ledger_csv, GlCodeJob, JobConfig, LedgerStore, RangeTable,
    SqliteStore,
};

const USAGE: &str = "usage: glcode [setup|import <file.csv>|assign|reconcile|run|ranges|show] [userId=<id>]";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (user_id, args) = split_args(env::args().skip(1));
    let command = args.first().map(String::as_str).unwrap_or("run");

    // Usage never depends on a valid environment
    if is_help(command) {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = JobConfig::from_env(user_id.as_deref()).context("Failed to load configuration")?;

    match command {
        "setup" => run_setup(&config),
        "import" => match args.get(1) {
            Some(path) => run_import(&config, Path::new(path)),
            None => bail!("import needs a CSV file\n{}", USAGE),
        },
        "assign" => run_jobs(&config, true, false),
        "reconcile" => run_jobs(&config, false, true),
        "run" => run_jobs(&config, true, true),
        "ranges" => show_ranges(&config),
        "show" => show_classified(&config),
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }
}

/// `userId=<id>` may appear anywhere; everything else is positional
fn split_args(raw: impl Iterator<Item = String>) -> (Option<String>, Vec<String>) {
    let mut user_id = None;
    let mut args = Vec::new();
    for arg in raw {
        match arg.strip_prefix("userId=") {
            Some(id) => user_id = Some(id.to_string()),
            None => args.push(arg),
        }
    }
    (user_id, args)
}

fn is_help(command: &str) -> bool {
    matches!(command, "help" | "--help" | "-h")
}

fn open_store(config: &JobConfig) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    store.setup().context("Failed to set up database")?;
    Ok(store)
}

fn run_setup(config: &JobConfig) -> Result<()> {
    println!("🔧 Setting up {}", config.database_path.display());
    let store = open_store(config)?;
    let groups = store.load_ranges()?.len();
    println!("✓ Database ready with WAL mode ({} account groups)", groups);
    Ok(())
}

fn run_import(config: &JobConfig, csv_path: &Path) -> Result<()> {
    println!("📂 Loading {}", csv_path.display());
    let ledgers = load_ledger_csv(csv_path)
        .with_context(|| format!("Failed to read ledger file {}", csv_path.display()))?;
    println!("✓ Loaded {} ledgers", ledgers.len());

    let store = open_store(config)?;
    let summary = import_ledgers(&store, &ledgers)?;

    println!("\n💾 Import summary");
    println!("   New:       {}", summary.inserted);
    println!("   Flagged:   {}", summary.flagged);
    println!("   Unchanged: {}", summary.unchanged);
    println!("   Skipped:   {}", summary.skipped);
    Ok(())
}

fn run_jobs(config: &JobConfig, assign: bool, reconcile: bool) -> Result<()> {
    let store = open_store(config)?;
    let backend = backend_for(config)?;
    if config.openai.is_none() {
        println!("⚠️  OPENAI_API_KEY not set, classifying with fallback rules only");
    }

    let mut job = GlCodeJob::start(&store, backend, config.job_options()?)
        .context("Failed to start GL code run")?;
    println!("🏁 Run {}", job.run_id());

    if assign {
        let report = job.run_initial_assignment().context("Initial assignment failed")?;
        println!("\n🔢 Initial assignment");
        println!("   Ledgers:  {}", report.total);
        println!("   Assigned: {}", report.assigned);
        println!("   Skipped:  {}", report.skipped);
        println!("   Batches:  {}", report.batches);
    }

    if reconcile {
        let report = job.run_reconciliation().context("Reconciliation failed")?;
        println!("\n⚖️  Reconciliation");
        println!("   {}", report.summary());
    }

    println!("\n✓ {} classifier calls, {} cached group pairs", job.classifier().remote_calls(), job.classifier().cache_len());
    Ok(())
}

fn show_ranges(config: &JobConfig) -> Result<()> {
    let store = open_store(config)?;
    let table = RangeTable::from_ranges(store.load_ranges()?)?;

    println!("{:<8} {:<62} {:<26} {:>6}  {:>6}", "Code", "Account group", "Category", "Start", "End");
    for range in table.iter() {
        println!(
            "{:<8} {:<62} {:<26} {:06}  {:06}",
            range.code, range.group_name, range.category_name, range.range_start, range.range_end
        );
    }
    Ok(())
}

fn show_classified(config: &JobConfig) -> Result<()> {
    let store = open_store(config)?;
    let rows = store.list_classified()?;

    if rows.is_empty() {
        println!("No classified ledgers yet. Run: glcode import <file.csv> && glcode run");
        return Ok(());
    }

    for row in &rows {
        println!(
            "{}  {:<8} {:<40} {}",
            row.gl_code, row.account_group_code, row.ledger_name, row.account_group_name
        );
    }
    println!("\n{} ledgers", rows.len());
    Ok(())
}
