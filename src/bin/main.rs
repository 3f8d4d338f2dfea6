use std::{fs, process, sync::Arc};

use tracing::error;
use tracing_subscriber::EnvFilter;

use pact_mock_service::{
    cli::{Cli, Commands, parse_args},
    router,
};

fn main() {
    let args = parse_args();
    init_logging(&args);

    if let Err(err) = router::dispatch(args) {
        error!("{err}");
        process::exit(err.exit_code());
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // A foreground mock service with --log writes its output to that file;
    // everything else logs to the console.
    let log_file = match &args.command {
        Some(Commands::Service(service)) => service.log.clone(),
        // A bare invocation runs the foreground service too.
        None => args.service.log.clone(),
        Some(_) => None,
    };
    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                let _ = fs::create_dir_all(parent);
            }
            match fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .try_init();
                }
                Err(err) => {
                    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
                    error!("could not open log file {}: {err}", path.display());
                }
            }
        }
        None => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }
}
