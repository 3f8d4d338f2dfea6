//! Dispatches parsed commands to the foreground runners and the supervisor.
use std::path::PathBuf;

use tracing::info;

use crate::{
    cli::{Cli, Commands, ControlArgs, ServiceArgs, StartArgs, StopArgs},
    constants::DEFAULT_CONTROL_PACT_DIR,
    control,
    descriptor::{ProcessFamily, ServiceDescriptor, TlsIdentity},
    error::SupervisorError,
    mock,
    pidfile::Pidfile,
    supervisor::{StopOutcome, Supervisor},
};

/// Executes the parsed command. A bare invocation runs the foreground mock
/// service with the top-level options.
pub fn dispatch(cli: Cli) -> Result<(), SupervisorError> {
    let command = cli.command.unwrap_or(Commands::Service(cli.service));
    match command {
        Commands::Service(args) => mock::run(&service_descriptor(&args)?),
        Commands::Start(args) => {
            let descriptor = start_descriptor(&args)?;
            start_daemon(&descriptor)
        }
        Commands::Stop(args) => stop_daemon(ProcessFamily::MockService, &args),
        Commands::Restart(args) => {
            let descriptor = start_descriptor(&args)?;
            restart_daemon(&descriptor)
        }
        Commands::Control(args) => control::run(&control_descriptor(&args)?),
        Commands::ControlStart(args) => {
            let descriptor = control_daemon_descriptor(&args)?;
            start_daemon(&descriptor)
        }
        Commands::ControlStop(args) => stop_daemon(ProcessFamily::ControlServer, &args),
        Commands::ControlRestart(args) => {
            let descriptor = control_daemon_descriptor(&args)?;
            restart_daemon(&descriptor)
        }
        Commands::Version => {
            println!("pact-mock-service {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn start_daemon(descriptor: &ServiceDescriptor) -> Result<(), SupervisorError> {
    let pidfile = pidfile_for(descriptor);
    let handle = Supervisor::default().spawn(&pidfile, descriptor)?;
    info!(
        pid = handle.pid,
        url = descriptor.base_url(),
        started_at = %handle.started_at,
        "{} started",
        descriptor.family.label()
    );
    Ok(())
}

fn restart_daemon(descriptor: &ServiceDescriptor) -> Result<(), SupervisorError> {
    let pidfile = pidfile_for(descriptor);
    let handle = Supervisor::default().respawn(&pidfile, descriptor)?;
    info!(
        pid = handle.pid,
        url = descriptor.base_url(),
        started_at = %handle.started_at,
        "{} restarted",
        descriptor.family.label()
    );
    Ok(())
}

fn stop_daemon(family: ProcessFamily, args: &StopArgs) -> Result<(), SupervisorError> {
    let pidfile = Pidfile::new(args.pid_dir.clone(), family.pidfile_name(args.port));
    match Supervisor::default().stop(&pidfile)? {
        StopOutcome::Graceful => info!("{} stopped", family.label()),
        StopOutcome::Forced => info!("{} killed after the stop timeout", family.label()),
    }
    Ok(())
}

fn pidfile_for(descriptor: &ServiceDescriptor) -> Pidfile {
    Pidfile::new(
        descriptor.pid_dir.clone(),
        descriptor.family.pidfile_name(descriptor.port),
    )
}

fn service_descriptor(args: &ServiceArgs) -> Result<ServiceDescriptor, SupervisorError> {
    let mut descriptor = ServiceDescriptor::new(ProcessFamily::MockService);
    descriptor.host = args.host.clone();
    descriptor.port = args.port;
    descriptor.consumer = args.consumer.clone();
    descriptor.provider = args.provider.clone();
    descriptor.pact_dir = args.pact_dir.clone();
    descriptor.write_mode = args.pact_file_write_mode;
    descriptor.spec_version = args.pact_specification_version;
    descriptor.cors = args.cors;
    descriptor.tls = tls_identity(args.ssl, &args.sslcert, &args.sslkey)?;
    descriptor.log = args.log.clone();
    Ok(descriptor)
}

fn start_descriptor(args: &StartArgs) -> Result<ServiceDescriptor, SupervisorError> {
    let mut descriptor = service_descriptor(&args.service)?;
    descriptor.pid_dir = args.pid_dir.clone();
    Ok(descriptor)
}

fn control_descriptor(args: &ControlArgs) -> Result<ServiceDescriptor, SupervisorError> {
    let mut descriptor = ServiceDescriptor::new(ProcessFamily::ControlServer);
    descriptor.host = args.host.clone();
    descriptor.port = args.port;
    descriptor.pact_dir = args.pact_dir.clone();
    descriptor.write_mode = args.pact_file_write_mode;
    descriptor.spec_version = args.pact_specification_version;
    descriptor.cors = args.cors;
    descriptor.tls = tls_identity(args.ssl, &args.sslcert, &args.sslkey)?;
    descriptor.log_dir = args.log_dir.clone();
    descriptor.pid_dir = args.pid_dir.clone();
    Ok(descriptor)
}

/// A daemonized control server logs next to the mock services it manages
/// and always has somewhere to persist their pacts; only the foreground
/// `control` command leaves persistence off unless asked.
fn control_daemon_descriptor(args: &ControlArgs) -> Result<ServiceDescriptor, SupervisorError> {
    let mut descriptor = control_descriptor(args)?;
    if descriptor.pact_dir.is_none() {
        descriptor.pact_dir = Some(PathBuf::from(DEFAULT_CONTROL_PACT_DIR));
    }
    descriptor.log = Some(
        args.log_dir
            .join(format!("mock-service-control-{}.log", args.port)),
    );
    Ok(descriptor)
}

fn tls_identity(
    ssl: bool,
    sslcert: &Option<PathBuf>,
    sslkey: &Option<PathBuf>,
) -> Result<Option<TlsIdentity>, SupervisorError> {
    if !ssl {
        return Ok(None);
    }
    match (sslcert, sslkey) {
        (Some(cert), Some(key)) => Ok(Some(TlsIdentity {
            cert: cert.clone(),
            key: key.clone(),
        })),
        _ => Err(SupervisorError::InvalidArguments {
            message: "--ssl requires both --sslcert and --sslkey".to_string(),
        }),
    }
}
