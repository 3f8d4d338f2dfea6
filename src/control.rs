//! Foreground runner for the control server.
//!
//! The control server administers a fleet of mock services over HTTP:
//! `POST /` spawns (or reuses) a daemonized mock for a consumer/provider
//! pair on an ephemeral port, `DELETE /` stops one, and shutdown reaps
//! every mock it still has registered. Spawning goes through the same
//! supervisor as the `start` command, so each managed mock has its own PID
//! record under the control server's PID directory.
use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
};

use tracing::{debug, info, warn};

use crate::{
    constants::{CONSUMER_HEADER, PROVIDER_HEADER},
    descriptor::{ProcessFamily, ServiceDescriptor},
    error::SupervisorError,
    http::{self, Request, Response, ServerEvent},
    mock,
    pidfile::Pidfile,
    supervisor::{Supervisor, daemon_gone},
};

/// A mock service this control server has spawned.
struct ManagedMock {
    port: u16,
    pidfile: Pidfile,
}

/// Registered mocks, keyed by `consumer/provider`.
type Registry = HashMap<String, ManagedMock>;

/// Runs the control server until interrupted, then stops its mocks.
pub fn run(descriptor: &ServiceDescriptor) -> Result<(), SupervisorError> {
    // Interrupts must be catchable from the first moment a client could
    // connect, so the handler goes in before the listener binds.
    let (events_tx, events) = mpsc::channel();
    let interrupt_tx = events_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(ServerEvent::Shutdown);
    })?;

    let addr = format!("{}:{}", descriptor.host, descriptor.port);
    let listener =
        TcpListener::bind(&addr).map_err(|source| SupervisorError::BindFailed { addr, source })?;
    let tls = mock::tls_acceptor(descriptor)?;

    let accepting = Arc::new(AtomicBool::new(true));
    let acceptor = http::spawn_acceptor(listener, tls, events_tx, Arc::clone(&accepting))?;
    info!(url = descriptor.base_url(), "control server listening");

    let supervisor = Supervisor::default();
    let mut registry = Registry::new();
    while let Ok(event) = events.recv() {
        match event {
            ServerEvent::Connection(conn) => {
                http::serve_connection(conn, |request| {
                    respond(&supervisor, &mut registry, descriptor, request)
                });
            }
            ServerEvent::Shutdown => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        if let ServerEvent::Connection(conn) = event {
            http::serve_connection(conn, |request| {
                respond(&supervisor, &mut registry, descriptor, request)
            });
        }
    }
    accepting.store(false, Ordering::SeqCst);
    if acceptor.join().is_err() {
        warn!("acceptor thread panicked during shutdown");
    }

    reap(&supervisor, &mut registry);
    Ok(())
}

fn respond(
    supervisor: &Supervisor,
    registry: &mut Registry,
    control: &ServiceDescriptor,
    request: &Request,
) -> Response {
    if request.path() != "/" {
        return Response::new(404);
    }
    match request.method.to_ascii_uppercase().as_str() {
        "GET" => Response::new(200).with_body("Control server running", "text/plain"),
        "POST" => start_mock(supervisor, registry, control, request),
        "DELETE" => stop_mock(supervisor, registry, request),
        _ => Response::new(404),
    }
}

fn start_mock(
    supervisor: &Supervisor,
    registry: &mut Registry,
    control: &ServiceDescriptor,
    request: &Request,
) -> Response {
    let Some((consumer, provider, key)) = participant_key(request) else {
        return missing_headers_response();
    };

    if let Some(existing) = registry.get(&key) {
        let running = matches!(existing.pidfile.read(), Ok(Some(pid)) if !daemon_gone(pid));
        if running {
            info!(%key, port = existing.port, "reusing running mock service");
            return Response::new(200)
                .with_header("Location", &mock_location(control, existing.port));
        }
        debug!(%key, "registered mock service is gone, starting a new one");
    }
    registry.remove(&key);

    let port = match ephemeral_port(&control.host) {
        Ok(port) => port,
        Err(err) => {
            warn!("could not allocate a port: {err}");
            return Response::new(500).with_body(err.to_string(), "text/plain");
        }
    };
    let descriptor = mock_descriptor(control, consumer, provider, port);
    let pidfile = Pidfile::new(
        control.pid_dir.clone(),
        ProcessFamily::MockService.pidfile_name(port),
    );
    match supervisor.spawn(&pidfile, &descriptor) {
        Ok(handle) => {
            info!(%key, port, pid = handle.pid, "started mock service");
            registry.insert(key, ManagedMock { port, pidfile });
            Response::new(201).with_header("Location", &mock_location(control, port))
        }
        Err(err) => {
            warn!(%key, "failed to start mock service: {err}");
            Response::new(500).with_body(err.to_string(), "text/plain")
        }
    }
}

fn stop_mock(supervisor: &Supervisor, registry: &mut Registry, request: &Request) -> Response {
    let Some((.., key)) = participant_key(request) else {
        return missing_headers_response();
    };
    let Some(managed) = registry.remove(&key) else {
        return Response::new(404).with_body(
            "No mock service is registered for this consumer and provider",
            "text/plain",
        );
    };

    match supervisor.stop(&managed.pidfile) {
        Ok(outcome) => {
            info!(%key, port = managed.port, ?outcome, "stopped mock service");
            Response::new(204)
        }
        // Already gone counts as stopped.
        Err(SupervisorError::NotRunning { .. }) => Response::new(204),
        Err(err) => {
            warn!(%key, "failed to stop mock service: {err}");
            Response::new(500).with_body(err.to_string(), "text/plain")
        }
    }
}

fn reap(supervisor: &Supervisor, registry: &mut Registry) {
    for (key, managed) in registry.drain() {
        match supervisor.stop(&managed.pidfile) {
            Ok(outcome) => debug!(%key, port = managed.port, ?outcome, "stopped mock service"),
            Err(SupervisorError::NotRunning { .. }) => {}
            Err(err) => warn!(%key, "failed to stop mock service: {err}"),
        }
    }
}

fn participant_key(request: &Request) -> Option<(&str, &str, String)> {
    match (
        request.header(CONSUMER_HEADER),
        request.header(PROVIDER_HEADER),
    ) {
        (Some(consumer), Some(provider)) => {
            Some((consumer, provider, format!("{consumer}/{provider}")))
        }
        _ => None,
    }
}

fn missing_headers_response() -> Response {
    Response::new(400).with_body(
        format!("Both the {CONSUMER_HEADER} and {PROVIDER_HEADER} headers must be given"),
        "text/plain",
    )
}

fn mock_descriptor(
    control: &ServiceDescriptor,
    consumer: &str,
    provider: &str,
    port: u16,
) -> ServiceDescriptor {
    let mut descriptor = ServiceDescriptor::new(ProcessFamily::MockService);
    descriptor.host = control.host.clone();
    descriptor.port = port;
    descriptor.consumer = Some(consumer.to_string());
    descriptor.provider = Some(provider.to_string());
    descriptor.pact_dir = control.pact_dir.clone();
    descriptor.write_mode = control.write_mode;
    descriptor.spec_version = control.spec_version;
    descriptor.cors = control.cors;
    descriptor.tls = control.tls.clone();
    descriptor.log = Some(control.log_dir.join(format!("mock-service-{port}.log")));
    descriptor.pid_dir = control.pid_dir.clone();
    descriptor
}

fn mock_location(control: &ServiceDescriptor, port: u16) -> String {
    format!("{}://{}:{}", control.scheme(), control.host, port)
}

fn ephemeral_port(host: &str) -> std::io::Result<u16> {
    // Bind port 0, note what the kernel handed out, and release it for the
    // mock to claim. The window where another process could grab the port
    // is accepted.
    let listener = TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}
