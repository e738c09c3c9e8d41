// ============================================================================
// connstat - TCP Connection Statistics Viewer
// ============================================================================
//
// Reads the published per-connection report (default /proc/net/stats_tcp,
// overridable with --file or STATS_FILENAME), filters it and prints it as
// CSV, JSON or an aligned table.
//
// Flow per snapshot:
//   read file -> parse_report -> ConnectionFilter::apply -> print
//
// With -i/-c the snapshot repeats. Ctrl-C stops the loop after the snapshot
// in progress; nothing is printed half-way.
//
// ============================================================================

use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use core::time::Duration;
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::{LevelFilter, Metadata, Record, debug, info};

use connstat::{
    COLUMNS, ConnectionFilter, ConnectionRecord, DEFAULT_STATS_PATH, HEADER, ReportConfig,
    RowFraming, STATS_FILENAME_ENV, TcpState, read_report_file,
};

// ============================================================================
// COMMAND LINE
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "connstat",
    version,
    about = "Show per-connection TCP statistics from the stats_tcp report"
)]
struct Cli {
    /// Report file to read
    #[arg(short, long, env = STATS_FILENAME_ENV, default_value = DEFAULT_STATS_PATH)]
    file: PathBuf,

    /// JSON report configuration (line framing for csv output)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only connections with this local address
    #[arg(long)]
    laddr: Option<Ipv4Addr>,

    /// Only connections with this local port
    #[arg(long)]
    lport: Option<u16>,

    /// Only connections with this remote address
    #[arg(long)]
    raddr: Option<Ipv4Addr>,

    /// Only connections with this remote port
    #[arg(long)]
    rport: Option<u16>,

    /// Only connections in these states (e.g. ESTABLISHED,LISTEN)
    #[arg(long, value_delimiter = ',', value_parser = parse_state)]
    state: Vec<TcpState>,

    /// Only ESTABLISHED connections (same as --state ESTABLISHED)
    #[arg(short, long)]
    established: bool,

    /// Print at most this many connections per snapshot
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Output format
    #[arg(short = 'F', long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Fields to print, comma separated (csv and table output)
    #[arg(short = 'o', long = "fields", value_delimiter = ',', value_parser = parse_field)]
    fields: Vec<usize>,

    /// Print a timestamp before each snapshot: u = epoch seconds, d = local date
    #[arg(short = 'T', long, value_enum)]
    timestamp: Option<TimestampFormat>,

    /// Seconds between snapshots
    #[arg(short, long)]
    interval: Option<u64>,

    /// Number of snapshots (default: 1, or unlimited with --interval)
    #[arg(short, long)]
    count: Option<u64>,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TimestampFormat {
    /// Seconds since the epoch
    #[value(name = "u")]
    Unix,
    /// Local time, YYYY-MM-DDTHH:MM:SS
    #[value(name = "d")]
    Date,
}

fn parse_state(value: &str) -> Result<TcpState, String> {
    TcpState::from_name(&value.to_ascii_uppercase())
        .ok_or_else(|| format!("unknown TCP state '{value}'"))
}

/// Column name -> column index
fn parse_field(value: &str) -> Result<usize, String> {
    COLUMNS
        .iter()
        .position(|c| c.eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown field '{value}' (expected one of {HEADER})"))
}

impl Cli {
    fn filter(&self) -> ConnectionFilter {
        let mut states = self.state.clone();
        if self.established && !states.contains(&TcpState::Established) {
            states.push(TcpState::Established);
        }
        ConnectionFilter {
            local_ip: self.laddr,
            local_port: self.lport,
            remote_ip: self.raddr,
            remote_port: self.rport,
            states,
            limit: self.limit,
        }
    }

    /// Selected column indices, all columns when none were given
    fn columns(&self) -> Vec<usize> {
        if self.fields.is_empty() {
            (0..COLUMNS.len()).collect()
        } else {
            self.fields.clone()
        }
    }

    const fn snapshots(&self) -> Option<u64> {
        match (self.count, self.interval) {
            (Some(count), _) => Some(count),
            (None, Some(_)) => None,
            (None, None) => Some(1),
        }
    }
}

// ============================================================================
// STDERR LOGGER
// ============================================================================

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // Only fails if a logger is already installed
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

fn write_timestamp(out: &mut impl Write, format: TimestampFormat) -> io::Result<()> {
    match format {
        TimestampFormat::Unix => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            writeln!(out, "= {secs}")
        }
        TimestampFormat::Date => {
            writeln!(out, "= {}", chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"))
        }
    }
}

/// Row values for the selected columns
fn select(row: &str, columns: &[usize]) -> Vec<String> {
    let values: Vec<&str> = row.split(',').collect();
    columns
        .iter()
        .map(|&idx| values.get(idx).copied().unwrap_or_default().to_string())
        .collect()
}

fn write_csv(
    out: &mut impl Write,
    records: &[ConnectionRecord],
    columns: &[usize],
    framing: RowFraming,
) -> io::Result<()> {
    let mut line = String::with_capacity(256);

    line.push_str(
        &columns
            .iter()
            .map(|&idx| COLUMNS[idx])
            .collect::<Vec<_>>()
            .join(","),
    );
    framing.finish_line(&mut line, 0);
    out.write_all(line.as_bytes())?;

    for rec in records {
        line.clear();
        line.push_str(&select(&rec.to_row(), columns).join(","));
        framing.finish_line(&mut line, 0);
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

fn write_json(out: &mut impl Write, records: &[ConnectionRecord]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, records).context("serialize records")?;
    writeln!(out)?;
    Ok(())
}

fn write_table(out: &mut impl Write, records: &[ConnectionRecord], columns: &[usize]) -> io::Result<()> {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|rec| select(&rec.to_row(), columns))
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(pos, &idx)| {
            rows.iter()
                .map(|row| row[pos].len())
                .fold(COLUMNS[idx].len(), usize::max)
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(&idx, &w)| format!("{:<w$}", COLUMNS[idx].to_ascii_uppercase()))
        .collect();
    writeln!(out, "{}", header.join("  ").trim_end())?;

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(value, &w)| format!("{value:<w$}"))
            .collect();
        writeln!(out, "{}", cells.join("  ").trim_end())?;
    }
    Ok(())
}

fn snapshot(cli: &Cli, config: &ReportConfig, out: &mut impl Write) -> Result<()> {
    let records = read_report_file(&cli.file)
        .with_context(|| format!("read report {}", cli.file.display()))?;
    let selected = cli.filter().apply(&records);
    debug!("{} of {} connections selected", selected.len(), records.len());

    if let Some(format) = cli.timestamp {
        write_timestamp(out, format)?;
    }

    let columns = cli.columns();
    match cli.format {
        OutputFormat::Csv => write_csv(out, &selected, &columns, config.framing)?,
        OutputFormat::Json => write_json(out, &selected)?,
        OutputFormat::Table => write_table(out, &selected, &columns)?,
    }
    out.flush()?;
    Ok(())
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ReportConfig::from_path(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => ReportConfig::default(),
    };

    if cli.interval == Some(0) {
        bail!("--interval must be at least 1 second");
    }
    let interval = Duration::from_secs(cli.interval.unwrap_or(1));
    let snapshots = cli.snapshots();

    // Cleared by Ctrl-C; checked between snapshots
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, AtomicOrdering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    info!("reading {}", cli.file.display());

    let stdout = io::stdout();
    let mut taken = 0u64;
    while running.load(AtomicOrdering::SeqCst) {
        {
            let mut out = stdout.lock();
            snapshot(&cli, &config, &mut out)?;
        }
        taken += 1;
        if snapshots.is_some_and(|n| taken >= n) {
            break;
        }

        // Sleep in short steps so Ctrl-C is noticed promptly
        let started = Instant::now();
        while running.load(AtomicOrdering::SeqCst) && started.elapsed() < interval {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    debug!("{taken} snapshots written");
    Ok(())
}
