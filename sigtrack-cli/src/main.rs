//! SigTrack CLI: record signals, resolve outcomes, report stats, optimize.
//!
//! Commands:
//! - `record` adds one signal
//! - `import` adds a batch from a CSV or JSON file
//! - `resolve` fills outcomes for due signals
//! - `stats` prints per-scan-type win rates and average returns
//! - `optimize` runs both sweeps and writes the recommendation artifact

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use sigtrack_core::data::{CircuitBreaker, CsvDirProvider, YahooProvider};
use sigtrack_core::resolver::StdoutProgress;
use sigtrack_core::{
    resolve_due_outcomes, HistoryProvider, Horizon, ResolverRun, ScanStats, SignalStore,
};
use sigtrack_runner::export::{t1_grid_csv, t2_grid_csv, write_csv};
use sigtrack_runner::{
    run_t1_sweep, run_t2_sweep, MomentumRotation, Recommendation, SigtrackConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigtrack", about = "SigTrack: scanner signal tracking and strategy optimization")]
struct Cli {
    /// TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "sigtrack.toml")]
    config: PathBuf,

    /// SQLite database path, overriding `store.db_path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one signal.
    Record {
        ticker: String,
        scan_type: String,
        /// Quality score; non-numeric input is stored as 0.
        score: String,

        /// Price at signal time (e.g. 101.5 or "$1,234.50").
        #[arg(long)]
        price: Option<String>,

        /// Signal date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// Import a batch of signals from a CSV file or a JSON array.
    Import {
        file: PathBuf,

        /// Scan type applied to every row.
        #[arg(long)]
        scan_type: String,

        /// Date for rows without one (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// Resolve outcomes for every due signal.
    Resolve {
        /// Reference date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        today: Option<String>,

        /// Read history from `<dir>/<TICKER>.csv` instead of Yahoo Finance.
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
    /// Print win rate and average return per horizon.
    Stats {
        /// Only this scan type. Defaults to all scan types.
        #[arg(long)]
        scan_type: Option<String>,

        /// Minimum resolved signals for a scan type to be reported.
        #[arg(long, default_value_t = 10)]
        min_signals: usize,
    },
    /// Run the swing and rotation sweeps and write recommendations.
    Optimize {
        /// Recommendation JSON output path.
        #[arg(long, default_value = "data/recommendation.json")]
        output: PathBuf,

        /// Also write the evaluated swing grid as CSV.
        #[arg(long)]
        grid_csv: Option<PathBuf>,

        /// Also write the rotation stop grid as CSV.
        #[arg(long)]
        t1_grid_csv: Option<PathBuf>,

        /// Skip the rotation stop sweep.
        #[arg(long, default_value_t = false)]
        skip_t1: bool,

        /// Read history from `<dir>/<TICKER>.csv` instead of Yahoo Finance.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Reference date for the rotation window (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        today: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SigtrackConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.store.db_path.clone());

    match cli.command {
        Commands::Record {
            ticker,
            scan_type,
            score,
            price,
            date,
        } => run_record(&db_path, &ticker, &scan_type, &score, price, date),
        Commands::Import {
            file,
            scan_type,
            date,
        } => run_import(&db_path, &file, &scan_type, date),
        Commands::Resolve { today, csv_dir } => run_resolve(&db_path, &config, today, csv_dir),
        Commands::Stats {
            scan_type,
            min_signals,
        } => run_stats(&db_path, scan_type, min_signals),
        Commands::Optimize {
            output,
            grid_csv,
            t1_grid_csv,
            skip_t1,
            csv_dir,
            today,
        } => run_optimize(
            &db_path,
            &config,
            OptimizeArgs {
                output,
                grid_csv,
                t1_grid_csv,
                skip_t1,
                csv_dir,
                today,
            },
        ),
    }
}

fn parse_date(s: Option<&str>) -> Result<NaiveDate> {
    match s {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD")),
        None => Ok(Local::now().date_naive()),
    }
}

fn open_store(db_path: &Path) -> Result<SignalStore> {
    SignalStore::open(db_path).with_context(|| format!("opening {}", db_path.display()))
}

fn history_provider(csv_dir: Option<PathBuf>) -> Result<Box<dyn HistoryProvider>> {
    Ok(match csv_dir {
        Some(dir) => Box::new(CsvDirProvider::new(dir)),
        None => Box::new(YahooProvider::new(Arc::new(CircuitBreaker::default()))?),
    })
}

fn run_record(
    db_path: &Path,
    ticker: &str,
    scan_type: &str,
    score: &str,
    price: Option<String>,
    date: Option<String>,
) -> Result<()> {
    let store = open_store(db_path)?;
    let date = parse_date(date.as_deref())?;
    let price = price.map(Value::String).unwrap_or(Value::Null);

    match store.record_signal_on(date, ticker, scan_type, score, price)? {
        Some(id) => println!(
            "Recorded signal {id}: {} {} on {date}",
            ticker.trim().to_uppercase(),
            scan_type.trim()
        ),
        None => bail!("ticker is blank, nothing recorded"),
    }
    Ok(())
}

/// Parse an import file into loose JSON rows.
///
/// `.json` files (or any file starting with `[`) are read as a JSON array;
/// everything else as CSV with a header row. CSV cells stay strings and are
/// coerced by the store.
fn read_rows(path: &Path) -> Result<Vec<Value>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
        || content.trim_start().starts_with('[');

    if is_json {
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {} as JSON", path.display()))?;
        return match value {
            Value::Array(rows) => Ok(rows),
            _ => bail!("{} must contain a JSON array of objects", path.display()),
        };
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(rows)
}

fn run_import(db_path: &Path, file: &Path, scan_type: &str, date: Option<String>) -> Result<()> {
    let rows = read_rows(file)?;
    let store = open_store(db_path)?;
    let date = parse_date(date.as_deref())?;
    let inserted = store.record_signals_batch_on(date, &rows, scan_type)?;
    println!(
        "Imported {inserted}/{} row(s) from {} as '{}'",
        rows.len(),
        file.display(),
        scan_type.trim()
    );
    Ok(())
}

fn run_resolve(
    db_path: &Path,
    config: &SigtrackConfig,
    today: Option<String>,
    csv_dir: Option<PathBuf>,
) -> Result<()> {
    let store = open_store(db_path)?;
    let provider = history_provider(csv_dir)?;
    let mut run = ResolverRun::new(parse_date(today.as_deref())?)
        .with_due_after_days(config.resolver.due_after_days)
        .with_fetch_window_days(config.resolver.fetch_window_days);

    let resolved =
        resolve_due_outcomes(&store, provider.as_ref(), &mut run, Some(&StdoutProgress))?;
    if !run.skipped().is_empty() {
        println!("{} signal(s) left pending", run.skipped().len());
    }
    info!(resolved, "resolve command finished");
    Ok(())
}

fn print_stats(stats: &ScanStats) {
    println!("\n{} ({} resolved)", stats.scan_type, stats.sample_size);
    println!("  {:<6} {:>6} {:>10} {:>10}", "", "n", "win rate", "avg ret");
    for horizon in Horizon::ALL {
        let Some(h) = stats.horizon(horizon) else {
            continue;
        };
        let fmt = |v: Option<f64>, suffix: &str| {
            v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}{suffix}"))
        };
        println!(
            "  {:<6} {:>6} {:>10} {:>10}",
            horizon.label(),
            h.observations,
            fmt(h.win_rate, "%"),
            fmt(h.avg_return, "%")
        );
    }
}

fn run_stats(db_path: &Path, scan_type: Option<String>, min_signals: usize) -> Result<()> {
    let store = open_store(db_path)?;
    match scan_type {
        Some(scan_type) => match store.stats_for_scan_type(&scan_type, min_signals)? {
            Some(stats) => print_stats(&stats),
            None => println!(
                "'{}' has fewer than {min_signals} resolved signal(s)",
                scan_type.trim()
            ),
        },
        None => {
            let all = store.stats_all_scan_types(min_signals)?;
            if all.is_empty() {
                println!("No scan type has {min_signals} or more resolved signals");
            }
            for stats in &all {
                print_stats(stats);
            }
        }
    }
    Ok(())
}

struct OptimizeArgs {
    output: PathBuf,
    grid_csv: Option<PathBuf>,
    t1_grid_csv: Option<PathBuf>,
    skip_t1: bool,
    csv_dir: Option<PathBuf>,
    today: Option<String>,
}

fn run_optimize(db_path: &Path, config: &SigtrackConfig, args: OptimizeArgs) -> Result<()> {
    let store = open_store(db_path)?;

    let t2 = run_t2_sweep(&store, &config.t2.scan_types, &config.t2.grid())?;
    println!(
        "Swing sweep: {} signal(s), {} of {} combination(s) evaluated",
        t2.corpus_size,
        t2.grid.len(),
        config.t2.grid().len()
    );
    match &t2.best {
        Some(b) => println!(
            "  best: min_score {} stop {}% target {}% hold {}d -> avg {:.2}% win {:.2}% (n={})",
            b.min_score,
            b.stop_pct,
            b.target_pct,
            b.max_hold_days,
            b.avg_return,
            b.win_rate,
            b.n_signals
        ),
        None => println!("  not enough resolved swing signals for a recommendation"),
    }
    if let Some(path) = &args.grid_csv {
        write_csv(path, &t2_grid_csv(&t2.grid)?)?;
        println!("  grid written to {}", path.display());
    }

    let t1 = if args.skip_t1 {
        None
    } else {
        let provider = history_provider(args.csv_dir)?;
        let engine = MomentumRotation::new(config.t1.universe(), config.t1.momentum_lookback);
        let outcome = run_t1_sweep(
            provider.as_ref(),
            &engine,
            &config.t1.universe(),
            &config.t1.params(),
            parse_date(args.today.as_deref())?,
        )?;
        println!("Rotation sweep: {} to {}", outcome.start, outcome.end);
        match (&outcome.best, &outcome.abort_reason) {
            (Some(b), _) => println!(
                "  best: stop {}% -> {:.2}% (equity {:.2})",
                b.stop_pct, b.total_return_pct, b.final_equity
            ),
            (None, Some(reason)) => println!("  aborted: {reason}"),
            (None, None) => println!("  no result"),
        }
        if let Some(path) = &args.t1_grid_csv {
            write_csv(path, &t1_grid_csv(&outcome.grid)?)?;
            println!("  grid written to {}", path.display());
        }
        Some(outcome)
    };

    let rec = Recommendation::build(Some(&t2), t1.as_ref(), Utc::now());
    rec.save(&args.output)?;
    println!("Recommendations saved to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_keep_original_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");
        std::fs::write(&path, "Symbol, SCORE ,Price\nAAPL,82,$187.20\nMSFT,n/a,\n").unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Symbol"], "AAPL");
        assert_eq!(rows[0]["SCORE"], "82");
        assert_eq!(rows[1]["Price"], "");
    }

    #[test]
    fn json_rows_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, r#"[{"ticker":"nvda","score":91.7,"close":120.5},{"score":50}]"#)
            .unwrap();
        let db = dir.path().join("signals.sqlite");

        run_import(&db, &path, "Swing", Some("2024-06-03".into())).unwrap();

        let store = SignalStore::open(&db).unwrap();
        let signals = store.signals().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].ticker, "NVDA");
        assert_eq!(signals[0].score, 91);
        assert_eq!(signals[0].price_at_signal, Some(120.5));
    }

    #[test]
    fn non_array_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, r#"{"ticker":"AAPL"}"#).unwrap();
        assert!(read_rows(&path).is_err());
    }

    #[test]
    fn dates_parse_or_default() {
        assert_eq!(
            parse_date(Some("2024-02-29")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date(Some("02/29/2024")).is_err());
        assert_eq!(parse_date(None).unwrap(), Local::now().date_naive());
    }
}
