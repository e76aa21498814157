use std::path::PathBuf;

use anyhow::{bail, Context};
use log::{info, warn};
use tokio::io::BufReader;

use policyd::app::dry_run::{
    DryRunEcUtil, LoggingDeviceHandler, LoggingDiscoveryEngine, LoggingNotifier,
};
use policyd::config::{default_config_path, AppConfig};
use policyd::logging::{configure_logging, set_debug_flags, DebugFlags};
use policyd::typec::{EcUtil, EctoolEcUtil};
use policyd::Daemon;

/// Command line options
#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    sysfs: Option<PathBuf>,
    ectool: bool,
    debug: Option<String>,
    script: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<Options>> {
    let mut options = Options::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => options.config = Some(args.next().context("--config needs a path")?.into()),
            "--sysfs" => options.sysfs = Some(args.next().context("--sysfs needs a path")?.into()),
            "--debug" => options.debug = Some(args.next().context("--debug needs categories")?),
            "--ectool" => options.ectool = true,
            "-h" | "--help" => return Ok(None),
            other if other.starts_with("--") => bail!("unknown option {}", other),
            other => {
                if options.script.is_some() {
                    bail!("only one event script can be given");
                }
                options.script = Some(other.into());
            }
        }
    }
    Ok(Some(options))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(options) = parse_args(std::env::args().skip(1))? else {
        print_usage();
        return Ok(());
    };

    let config_path = options.config.clone().unwrap_or_else(default_config_path);
    let config = if config_path.exists() {
        AppConfig::load_from_path(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        AppConfig::default()
    };

    configure_logging(
        config.system.log_level,
        config.system.log_file.clone(),
        config.system.console_log,
    )
    .map_err(anyhow::Error::msg)?;
    if let Some(categories) = &options.debug {
        set_debug_flags(DebugFlags::from_categories(categories).map_err(anyhow::Error::msg)?);
    }
    info!("policyd starting, config {}", config_path.display());

    let ec_util: Box<dyn EcUtil> = if options.ectool {
        Box::new(EctoolEcUtil::default())
    } else {
        Box::new(DryRunEcUtil::new(true))
    };

    let mut daemon = Daemon::from_config(
        &config,
        Box::new(LoggingDiscoveryEngine::new()),
        Box::new(LoggingDeviceHandler::new()),
        ec_util,
        Some(Box::new(LoggingNotifier)),
    );
    daemon.initialize(&config);

    let sysfs_root = options.sysfs.unwrap_or_else(|| config.typec.sysfs_root.clone());
    if let Err(e) = daemon.coldplug(&sysfs_root) {
        warn!("Skipping coldplug: {}", e);
    }

    let applied = match &options.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            daemon.run(BufReader::new(file)).await?
        }
        None => daemon.run(BufReader::new(tokio::io::stdin())).await?,
    };

    info!("policyd exiting, {} events applied", applied);
    Ok(())
}

fn print_usage() {
    println!("policyd - BLE scan and USB Type-C mode entry policy");
    println!("\nUsage:");
    println!("  policyd [OPTIONS] [SCRIPT]");
    println!("\nReads JSON events, one per line, from SCRIPT or stdin.");
    println!("\nOptions:");
    println!("  --config PATH   Configuration file (default: {})", default_config_path().display());
    println!("  --sysfs ROOT    Type-C class directory to coldplug from");
    println!("  --ectool        Send mode entry commands to the EC through ectool");
    println!("  --debug CATS    Debug categories: bluetooth,typec,config,system,all");
    println!("  -h, --help      Show this help");
}
