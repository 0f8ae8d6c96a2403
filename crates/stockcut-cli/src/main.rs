use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use stockcut_core::history::DEFAULT_HISTORY_FILE;
use stockcut_core::report::{self, DEFAULT_BAR_WIDTH};
use stockcut_core::{
    order, Algorithm, Demand, HistoryStore, JsonFileStore, MemoryStore, OptimizationRequest,
    Optimizer, OrderLine, PackingResult, ReportOptions, DEFAULT_CAPACITY,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stockcut")]
#[command(about = "Linear cutting-stock optimizer - pack piece widths onto standard sheets", long_about = None)]
struct Cli {
    /// Print diagnostic logs (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a piece order
    Optimize(OptimizeArgs),

    /// Render the cutting plan of a saved result
    Report {
        /// Result file written by `optimize --json`
        #[arg(short, long)]
        input: PathBuf,

        /// Sheet width in mm the result was computed for
        #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
        capacity: u32,

        /// Characters in each usage bar
        #[arg(long, default_value_t = DEFAULT_BAR_WIDTH)]
        bar_width: usize,
    },

    /// List stored solutions
    History {
        /// History file
        #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
        history: PathBuf,
    },
}

#[derive(clap::Args)]
struct OptimizeArgs {
    /// Request or order file (YAML or JSON)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Piece as WIDTHxQTY, e.g. 500x4 (repeatable)
    #[arg(short, long = "piece", value_parser = parse_piece)]
    pieces: Vec<OrderLine>,

    /// Sheet width in mm
    #[arg(short, long)]
    capacity: Option<u32>,

    /// Utilization target in percent
    #[arg(short, long)]
    target: Option<f64>,

    /// best-fit or ffd
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Seed for the shuffled orderings
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate orderings in parallel
    #[arg(long)]
    parallel: bool,

    /// History file
    #[arg(long, default_value = DEFAULT_HISTORY_FILE)]
    history: PathBuf,

    /// Do not read or write the history file
    #[arg(long)]
    no_history: bool,

    /// Characters in each usage bar
    #[arg(long, default_value_t = DEFAULT_BAR_WIDTH)]
    bar_width: usize,

    /// Write the report text to this file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Write the packing result as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Save the assembled piece order to this file
    #[arg(long)]
    save_order: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Optimize(args) => {
            optimize_command(args)?;
        }
        Commands::Report {
            input,
            capacity,
            bar_width,
        } => {
            report_command(input, capacity, bar_width)?;
        }
        Commands::History { history } => {
            history_command(history)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_piece(s: &str) -> std::result::Result<OrderLine, String> {
    let (width, quantity) = s
        .split_once(&['x', 'X', ':'][..])
        .ok_or_else(|| format!("invalid piece '{}', expected WIDTHxQTY", s))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let quantity = quantity
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    if width == 0 || quantity == 0 {
        return Err(format!("width and quantity must be non-zero in '{}'", s));
    }
    Ok(OrderLine { width, quantity })
}

fn read_input(path: &Path) -> Result<OptimizationRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );
    parse_input(&content, yaml).with_context(|| format!("invalid input {}", path.display()))
}

/// Input files hold either a full request object or just an order list.
fn parse_input(content: &str, yaml: bool) -> Result<OptimizationRequest> {
    let order: Vec<OrderLine> = if yaml {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if !value.is_sequence() {
            return Ok(serde_yaml::from_value(value)?);
        }
        serde_yaml::from_value(value)?
    } else {
        let value: serde_json::Value = serde_json::from_str(content)?;
        if !value.is_array() {
            return Ok(serde_json::from_value(value)?);
        }
        serde_json::from_value(value)?
    };

    Ok(OptimizationRequest {
        demand: Demand::from_lines(&order),
        ..OptimizationRequest::default()
    })
}

/// Merges the input file and command-line flags into one request.
fn build_request(args: &OptimizeArgs) -> Result<OptimizationRequest> {
    let mut request = match &args.input {
        Some(path) => read_input(path)?,
        None => OptimizationRequest::default(),
    };

    for line in &args.pieces {
        request.demand.add(line.width, line.quantity);
    }
    if let Some(capacity) = args.capacity {
        request.capacity = capacity;
    }
    if let Some(target) = args.target {
        request.target = target;
    }
    if let Some(algorithm) = args.algorithm {
        request.algorithm = algorithm;
    }
    if args.seed.is_some() {
        request.seed = args.seed;
    }
    request.parallel |= args.parallel;

    if request.demand.is_empty() {
        bail!("no pieces given; use --input or --piece WIDTHxQTY");
    }

    debug!(
        widths = request.demand.len(),
        capacity = request.capacity,
        target = request.target,
        algorithm = %request.algorithm,
        "assembled request"
    );

    Ok(request)
}

fn optimize_command(args: OptimizeArgs) -> Result<()> {
    println!("{}", "🔍 Loading order...".bright_blue());

    let request = build_request(&args)?;
    let options = ReportOptions::with_bar_width(args.bar_width)?;

    println!(
        "  {} pieces in {} widths",
        request.demand.total_pieces().to_string().bright_white().bold(),
        request.demand.len().to_string().bright_white().bold()
    );
    println!(
        "  Sheet width {}mm, target {}%, algorithm {}",
        request.capacity.to_string().bright_white(),
        request.target.to_string().bright_white(),
        request.algorithm.to_string().bright_white()
    );
    println!();

    if let Some(path) = &args.save_order {
        order::save_order(path, &request.demand.to_lines())?;
        println!(
            "💾 Saved order to {}",
            path.display().to_string().bright_white()
        );
    }

    println!("{}", "🚀 Running optimization...".bright_blue());

    let optimizer = Optimizer::new(request)?;
    let mut store: Box<dyn HistoryStore> = if args.no_history {
        Box::new(MemoryStore::new())
    } else {
        Box::new(JsonFileStore::open(&args.history))
    };
    let outcome = optimizer.run(store.as_mut())?;

    println!();
    if outcome.target_met {
        println!("{}", "✅ Optimization complete!".bright_green().bold());
    } else {
        println!(
            "{}",
            "⚠️  Optimization complete, target not reached".bright_yellow().bold()
        );
    }
    println!();

    let text = report::format_outcome(&outcome, &options);
    println!("{}", text);
    println!();

    if let Some(path) = &args.export {
        std::fs::write(path, &text)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!(
            "💾 Exported cutting plan to {}",
            path.display().to_string().bright_white()
        );
    }

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&outcome.result)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
        println!(
            "💾 Saved result to {}",
            path.display().to_string().bright_white()
        );
    }

    Ok(())
}

fn report_command(input: PathBuf, capacity: u32, bar_width: usize) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let result: PackingResult = serde_json::from_str(&content)?;
    let options = ReportOptions::with_bar_width(bar_width)?;

    if capacity == 0 {
        bail!("sheet width must be positive");
    }

    println!(
        "{}",
        report::format_result(&result, capacity, &options)
    );

    Ok(())
}

fn history_command(path: PathBuf) -> Result<()> {
    let store = JsonFileStore::open(&path);

    if store.records().is_empty() {
        println!("No stored solutions in {}", path.display());
        return Ok(());
    }

    println!(
        "{}",
        format!("📚 {} stored solutions", store.records().len())
            .bright_yellow()
            .bold()
    );
    for (signature, record) in store.records() {
        println!(
            "  • {}  {} sheets, {:.2}%  ({})",
            signature.bright_white(),
            record.result.sheet_count,
            record.result.utilization_percent,
            record.timestamp.to_rfc3339()
        );
    }

    Ok(())
}
