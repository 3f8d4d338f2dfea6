//! Foreground runner for the interaction-recording mock service.
//!
//! The daemonized child the supervisor launches lands here. Requests are
//! served on the caller's thread, one at a time, off a channel fed by the
//! acceptor thread; an interrupt drains what was already accepted and then
//! persists the recorded pact.
use std::{
    fs,
    net::TcpListener,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
};

use native_tls::{Identity, TlsAcceptor};
use tracing::{info, warn};

use crate::{
    constants::MOCK_SERVICE_HEADER,
    descriptor::ServiceDescriptor,
    error::SupervisorError,
    http::{self, Request, Response, ServerEvent},
    pact::PactSession,
};

/// Runs the mock service until interrupted, then writes the pact.
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
    let tls = tls_acceptor(descriptor)?;

    let accepting = Arc::new(AtomicBool::new(true));
    let acceptor = http::spawn_acceptor(listener, tls, events_tx, Arc::clone(&accepting))?;
    info!(url = descriptor.base_url(), "mock service listening");

    let mut session = PactSession::new(descriptor);
    while let Ok(event) = events.recv() {
        match event {
            ServerEvent::Connection(conn) => {
                http::serve_connection(conn, |request| respond(&mut session, descriptor, request));
            }
            ServerEvent::Shutdown => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    // Serve connections that were accepted before the interrupt arrived.
    while let Ok(event) = events.try_recv() {
        if let ServerEvent::Connection(conn) = event {
            http::serve_connection(conn, |request| respond(&mut session, descriptor, request));
        }
    }
    accepting.store(false, Ordering::SeqCst);
    if acceptor.join().is_err() {
        warn!("acceptor thread panicked during shutdown");
    }

    session.persist()?;
    Ok(())
}

/// Builds the TLS acceptor for a `--ssl` descriptor, if any.
///
/// Shared with the control server, which speaks the same scheme as the
/// mocks it manages.
pub fn tls_acceptor(descriptor: &ServiceDescriptor) -> Result<Option<TlsAcceptor>, SupervisorError> {
    let Some(identity) = &descriptor.tls else {
        return Ok(None);
    };
    let cert = fs::read(&identity.cert).map_err(|source| SupervisorError::TlsFile {
        path: identity.cert.clone(),
        source,
    })?;
    let key = fs::read(&identity.key).map_err(|source| SupervisorError::TlsFile {
        path: identity.key.clone(),
        source,
    })?;
    let identity = Identity::from_pkcs8(&cert, &key)?;
    Ok(Some(TlsAcceptor::new(identity)?))
}

fn respond(
    session: &mut PactSession,
    descriptor: &ServiceDescriptor,
    request: &Request,
) -> Response {
    // Administrative traffic, the liveness probe included, is answered but
    // never recorded as an interaction.
    if request.header(MOCK_SERVICE_HEADER).is_some() {
        return Response::new(200).with_body("Mock service running", "text/plain");
    }
    if descriptor.cors && request.method.eq_ignore_ascii_case("OPTIONS") {
        return cors_preflight(request);
    }

    let status = 200;
    session.record(&request.method, request.path(), request.query(), status);
    let mut response = Response::new(status).with_header(MOCK_SERVICE_HEADER, "true");
    if descriptor.cors {
        response = response.with_header("Access-Control-Allow-Origin", "*");
    }
    response
}

fn cors_preflight(request: &Request) -> Response {
    let allowed_headers = request
        .header("Access-Control-Request-Headers")
        .unwrap_or("*")
        .to_string();
    Response::new(200)
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header(
            "Access-Control-Allow-Methods",
            "DELETE, POST, GET, HEAD, PUT, TRACE, CONNECT, PATCH, OPTIONS",
        )
        .with_header("Access-Control-Allow-Headers", &allowed_headers)
}
