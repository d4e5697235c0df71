use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use hearth_config::HearthConfig;
use hearth_engine::{Application, HeadlessWindow, LoopError};
use hearth_plugins::{inspect_library, DynamicLoader, SymbolNames};
use hearth_telemetry::{EventLogger, MetricsRecorder};

#[derive(Parser, Debug)]
#[command(name = "hearth", version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/hearth.yaml and HEARTH_* variables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a headless application host
    Run(RunArgs),
    /// Report which plugin ABI symbols a library exports
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Plugin library to install on start (repeatable)
    #[arg(short, long = "plugin")]
    pub plugins: Vec<PathBuf>,

    /// Stop after this many frames (overrides the configuration)
    #[arg(short, long)]
    pub frames: Option<u64>,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    pub path: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<HearthConfig> {
    match path {
        Some(path) => HearthConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display())),
        None => HearthConfig::load().context("loading configuration"),
    }
}

/// Runs the command and returns the process exit code.
pub fn run_command(cli: Cli) -> anyhow::Result<i32> {
    let mut config = load_config(cli.config.as_ref())?;
    if let Err(e) = EventLogger::init(&config.telemetry.log_level) {
        eprintln!("logging already initialized: {e}");
    }

    match cli.command {
        Commands::Run(args) => {
            if let Some(frames) = args.frames {
                config.engine.max_frames = frames;
            }
            run(config, args)
        }
        Commands::Inspect(args) => inspect(&config, &args),
    }
}

fn run(config: HearthConfig, args: RunArgs) -> anyhow::Result<i32> {
    let want_metrics = args.metrics || config.telemetry.metrics;
    if config.engine.max_frames == 0 {
        info!("no frame limit: running until interrupted");
    }

    let mut builder = Application::builder(config);
    if want_metrics {
        builder = builder.metrics(MetricsRecorder::new().context("registering metrics")?);
    }
    for plugin in args.plugins {
        builder = builder.plugin(plugin);
    }
    let app = builder.build(HeadlessWindow::new());

    let result = app.run();
    let code = LoopError::code_of(&result);
    info!(frames = app.frames(), code, "run finished");

    if let Some(metrics) = app.metrics().filter(|_| args.metrics) {
        print!("{}", metrics.gather_metrics().context("encoding metrics")?);
    }
    Ok(code)
}

fn inspect(config: &HearthConfig, args: &InspectArgs) -> anyhow::Result<i32> {
    let symbols = SymbolNames::new(
        config.plugins.create_symbol.clone(),
        config.plugins.destroy_symbol.clone(),
    );
    let report = inspect_library(&DynamicLoader, &args.path, &symbols)
        .with_context(|| format!("inspecting {}", args.path.display()))?;

    println!("{}", report.path.display());
    println!("  {:<24} {}", symbols.create, found(report.create));
    println!("  {:<24} {}", symbols.destroy, found(report.destroy));
    Ok(if report.is_loadable() { 0 } else { 1 })
}

fn found(present: bool) -> &'static str {
    if present {
        "found"
    } else {
        "missing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_repeated_plugins() {
        let cli = Cli::try_parse_from([
            "hearth", "run", "-p", "a.so", "--plugin", "b.so", "--frames", "10", "--metrics",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.plugins, vec![PathBuf::from("a.so"), PathBuf::from("b.so")]);
        assert_eq!(args.frames, Some(10));
        assert!(args.metrics);
    }

    #[test]
    fn parses_inspect_with_global_config() {
        let cli = Cli::try_parse_from(["hearth", "inspect", "lib.so", "--config", "c.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        assert!(matches!(cli.command, Commands::Inspect(InspectArgs { ref path }) if path == &PathBuf::from("lib.so")));
    }
}
