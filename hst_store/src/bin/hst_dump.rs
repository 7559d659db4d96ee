use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hst_format::{Bar, point_scale};
use hst_store::{HistoryFile, StoreOptions};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Inspect MetaTrader .hst history files")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the decoded header and series range
    Info {
        /// Path of the .hst file
        file: PathBuf,
    },
    /// Print bar records
    Bars {
        /// Path of the .hst file
        file: PathBuf,
        /// First offset to print
        #[arg(long, default_value_t = 0)]
        from: i64,
        /// Number of bars to print
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct BarRow {
    offset: i64,
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    ticks: u64,
    spread: u32,
    volume: u64,
}

impl BarRow {
    fn new(offset: i64, bar: &Bar, digits: u32) -> BarRow {
        let scale = point_scale(digits);
        BarRow {
            offset,
            time: bar.time,
            open: bar.open as f64 / scale,
            high: bar.high as f64 / scale,
            low: bar.low as f64 / scale,
            close: bar.close as f64 / scale,
            ticks: bar.ticks,
            spread: bar.spread,
            volume: bar.volume,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Info { file } => {
            let mut hf = HistoryFile::open(&file, &StoreOptions::default())
                .with_context(|| format!("opening {}", file.display()))?;
            let stored = hf.stored();
            println!("file:      {}", file.display());
            println!("symbol:    {}", hf.symbol());
            println!("timeframe: {}", hf.timeframe());
            println!("format:    {}", hf.format().as_u32());
            println!("digits:    {}", hf.digits());
            println!("bars:      {}", stored.bars);
            if stored.bars > 0 {
                println!("from:      {}", stored.from_open_time);
                println!("to:        {}", stored.to_open_time);
            }
            println!("synced to: {}", stored.last_sync_time);
            hf.close()?;
        }
        Cmd::Bars {
            file,
            from,
            count,
            json,
        } => {
            let mut hf = HistoryFile::open(&file, &StoreOptions::default())
                .with_context(|| format!("opening {}", file.display()))?;
            let digits = hf.digits();
            let mut rows = Vec::new();
            for offset in from..from + count as i64 {
                match hf.get_bar(offset)? {
                    Some(bar) => rows.push(BarRow::new(offset, &bar, digits)),
                    None => break,
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for r in &rows {
                    println!(
                        "{:>8}  {:>12}  O {:<12} H {:<12} L {:<12} C {:<12} ticks {}",
                        r.offset, r.time, r.open, r.high, r.low, r.close, r.ticks
                    );
                }
            }
            hf.close()?;
        }
    }

    Ok(())
}
