use anyhow::{Context, Result};
use clap::Parser;
use kernscope_cli::{run, Command, OutputFormat};
use kernscope_core::{open_session, IntrospectorConfig, KernelLayout, ProbeChannel, SymbolTable};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target chip name as known to probe-rs
    #[arg(long)]
    chip: String,

    /// Firmware image the target is running
    #[arg(long)]
    elf: PathBuf,

    /// Index of probe to use (default: 0)
    #[arg(long, default_value_t = 0)]
    probe: usize,

    /// Kernel struct layout (JSON); defaults to ChibiOS/RT 2.x on Cortex-M
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Introspector settings (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the maximum number of list nodes walked
    #[arg(long)]
    max_nodes: Option<usize>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn load_config(cli: &Cli) -> Result<IntrospectorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            IntrospectorConfig::from_json(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => IntrospectorConfig::default(),
    };
    if let Some(max_nodes) = cli.max_nodes {
        config.max_list_nodes = max_nodes;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(&cli)?;
    let symbols = SymbolTable::load_elf(&cli.elf)?;
    let layout = match &cli.layout {
        Some(path) => KernelLayout::from_json_file(path)?,
        None => KernelLayout::default(),
    };

    let mut session = open_session(cli.probe, &cli.chip)?;
    let core = session.core(0).context("Failed to access core 0")?;
    info!("Reading {} from {}", cli.command.name(), cli.chip);

    let output = run(ProbeChannel::new(core, &symbols, &layout), cli.command, cli.format, config)?;
    println!("{output}");
    Ok(())
}
