use std::env;
use log::{info, LevelFilter};
use crate::cli::Args;
use crate::config::io::ConfigIO;
use crate::error::AppRunError;

pub mod cli;
pub mod config;
pub mod device;
pub mod error;

/// Logs to stderr, and to the file named by `LOG_FILE` if set. The level can be changed later
/// with `log::set_max_level`.
pub fn init_logging(level: LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Trace)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
    log::set_max_level(level);
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let mut config_io = ConfigIO::new_sync(args.config.as_deref())?;
        let mut locker = config_io.locker()?;
        let _config_lock = locker.lock()?;

        let mut config = match config_io.read().await {
            Ok(config) => config,
            Err(err) if err.is_file_not_found_error() => {
                info!("Config file not found, using defaults");
                Default::default()
            },
            Err(err) => return Err(err.into()),
        };

        if !args.verbose {
            log::set_max_level(config.log_level);
        }

        args.apply_to(&mut config);

        if args.write_config {
            config_io.save(&config).await?;
            info!("Wrote config to {}", config_io.path().to_string_lossy());
            return Ok(());
        }

        cli::run_cli(&args, &config).await
    })
}
