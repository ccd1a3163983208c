//! stampcheck CLI: inspect part images, run synthetic demos, show order totals.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
#[cfg(not(feature = "tracing"))]
use stampcheck::core;
use stampcheck::{
    InspectionConfig, InspectionResult, Inspector, Session, SyntheticCamera, SyntheticPart,
};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "stampcheck")]
#[command(about = "Inspect stamped metal parts: holes, weld seams, spatter, OK/NOK")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace). Defaults to
    /// STAMPCHECK_LOG, then info.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect one image and record it under an order.
    Inspect(InspectArgs),

    /// Inspect a series of synthetic parts covering each defect.
    Demo(DemoArgs),

    /// Print OK/NOK totals of an order.
    Stats {
        /// Order number.
        #[arg(long)]
        order: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write the effective configuration as JSON.
    Config {
        /// Destination file.
        #[arg(long)]
        out: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// JSON configuration file; defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output root; overrides the configuration and STAMPCHECK_OUTPUT_DIR.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct InspectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Order number.
    #[arg(long)]
    order: String,

    /// Part identifier used in the artifact name.
    #[arg(long)]
    part: String,

    /// Camera id used in the artifact name.
    #[arg(long, default_value_t = 1)]
    cam: u32,

    /// Operator name written to the log.
    #[arg(long, default_value = "operator")]
    user: String,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Clone, Args)]
struct DemoArgs {
    /// Order number.
    #[arg(long, default_value = "demo")]
    order: String,

    /// Operator name written to the log.
    #[arg(long, default_value = "demo")]
    user: String,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Commands::Inspect(args) => run_inspect(&args),
        Commands::Demo(args) => run_demo(&args),
        Commands::Stats { order, common } => run_stats(&order, &common),
        Commands::Config { out, common } => run_config(&out, &common),
    }
}

fn init_logging(level: Option<&str>) {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        stampcheck::core::init_tracing(level.unwrap_or("info"), false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let default = log::LevelFilter::Info;
        let installed = match level {
            Some(name) => core::init_with_level(core::parse_level(name, default)),
            None => core::init_from_env(default),
        };
        if let Err(e) = installed {
            eprintln!("logger already installed: {e}");
        }
    }
}

fn load_config(common: &CommonArgs) -> CliResult<InspectionConfig> {
    let mut config = match &common.config {
        Some(path) => {
            log::info!("loading config {}", path.display());
            InspectionConfig::load_json(path)?
        }
        None => InspectionConfig::default(),
    };
    config.apply_env()?;
    if let Some(dir) = &common.output {
        config.output.dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_inspector(config: InspectionConfig, order: &str, user: &str) -> CliResult<Inspector> {
    let session = Session::open(&config.output.dir, order, user, config.session_options())?;
    Ok(Inspector::new(config, Arc::new(session))?)
}

fn print_result(r: &InspectionResult) {
    match &r.reason {
        None => println!(
            "{:<4} {:<12} #{:<5} {}",
            r.verdict,
            r.part,
            r.counter,
            r.artifact.display()
        ),
        Some(reason) => println!(
            "{:<4} {:<12} #{:<5} {} ({reason})",
            r.verdict,
            r.part,
            r.counter,
            r.artifact.display()
        ),
    }
}

// ── inspect ────────────────────────────────────────────────────────────

fn run_inspect(args: &InspectArgs) -> CliResult<()> {
    let config = load_config(&args.common)?;
    log::info!("loading image {}", args.image.display());
    let img = image::open(&args.image)?.to_luma8();
    log::info!("image size {}x{}", img.width(), img.height());

    let inspector = open_inspector(config, &args.order, &args.user)?;
    let result = inspector.process_image(&img, &args.part, args.cam)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    inspector.session().close()?;
    Ok(())
}

// ── demo ───────────────────────────────────────────────────────────────

fn demo_parts() -> Vec<(&'static str, SyntheticPart)> {
    let base = SyntheticPart::default();
    vec![
        ("normal", base.clone()),
        (
            "missing",
            SyntheticPart {
                part_missing: true,
                ..base.clone()
            },
        ),
        (
            "unwelded",
            SyntheticPart {
                no_welding: true,
                ..base.clone()
            },
        ),
        (
            "spatter",
            SyntheticPart {
                spatter: true,
                ..base.clone()
            },
        ),
        (
            "oversize",
            SyntheticPart {
                hole_diameters: [40.0, 50.0, 40.0, 40.0],
                ..base.clone()
            },
        ),
        (
            "everything",
            SyntheticPart {
                no_welding: true,
                spatter: true,
                seed: 11,
                ..base
            },
        ),
    ]
}

fn run_demo(args: &DemoArgs) -> CliResult<()> {
    let config = load_config(&args.common)?;
    let inspector = open_inspector(config, &args.order, &args.user)?;

    for (name, part) in demo_parts() {
        let camera = SyntheticCamera::new(part);
        let result = inspector.capture_and_process(&camera, name, 1)?;
        print_result(&result);
    }

    let stats = inspector.statistics()?;
    println!(
        "order {}: {} OK, {} NOK ({:.1}% OK)",
        args.order,
        stats.ok,
        stats.nok,
        100.0 * stats.ok_rate
    );
    inspector.session().close()?;
    Ok(())
}

// ── stats ──────────────────────────────────────────────────────────────

fn run_stats(order: &str, common: &CommonArgs) -> CliResult<()> {
    let config = load_config(common)?;
    let log_path = config.output.dir.join(order).join(format!("{order}.csv"));
    if !log_path.exists() {
        return Err(format!("no log for order {order} at {}", log_path.display()).into());
    }
    let session = Session::open(&config.output.dir, order, "", config.session_options())?;
    let stats = session.statistics()?;
    println!("order:   {order}");
    println!("total:   {}", stats.total);
    println!("ok:      {} ({:.1}%)", stats.ok, 100.0 * stats.ok_rate);
    println!("nok:     {} ({:.1}%)", stats.nok, 100.0 * stats.nok_rate);
    session.close()?;
    Ok(())
}

// ── config ─────────────────────────────────────────────────────────────

fn run_config(out: &Path, common: &CommonArgs) -> CliResult<()> {
    let config = load_config(common)?;
    config.write_json(out)?;
    log::info!("config written to {}", out.display());
    Ok(())
}
