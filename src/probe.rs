//! Bounded HTTP liveness probing for freshly spawned services.
use std::{
    thread,
    time::{Duration, Instant},
};

use reqwest::blocking::Client;
use tracing::{debug, trace};

use crate::{
    constants::{
        LOOPBACK_HOST, MOCK_SERVICE_HEADER, PROBE_POLL_INTERVAL,
        PROBE_REQUEST_TIMEOUT,
    },
    error::SupervisorError,
};

/// Single-shot HTTP prober for one service endpoint.
///
/// Probe requests carry the administrative marker header so the mock service
/// answers them without recording an interaction. Self-signed certificates
/// are accepted because `--ssl` services are expected to present them.
pub struct Prober {
    client: Client,
    url: String,
}

impl Prober {
    /// Builds a prober for `host:port`. The URL targets loopback when the
    /// service was bound to a wildcard address.
    pub fn new(host: &str, port: u16, use_tls: bool) -> Result<Self, SupervisorError> {
        // Probes only ever target this machine, so ambient proxy settings
        // must not redirect them.
        let client = Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .build()?;

        let scheme = if use_tls { "https" } else { "http" };
        let url = format!("{scheme}://{}:{port}/", probe_host(host));
        Ok(Self { client, url })
    }

    /// The URL this prober targets.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs a single probe.
    ///
    /// Any 2xx answer counts as responsive. Connection refusals, timeouts and
    /// handshake failures count as not-yet-up rather than errors, since they
    /// are expected while the service is still starting.
    pub fn responsive(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .header(MOCK_SERVICE_HEADER, "true")
            .send()
        {
            Ok(response) => {
                let up = response.status().is_success();
                trace!("Probe of {} answered {}", self.url, response.status());
                up
            }
            Err(err) => {
                trace!("Probe of {} failed: {err}", self.url);
                false
            }
        }
    }
}

/// Polls `host:port` until it answers a liveness probe or `timeout` elapses.
///
/// `label` names the service in the timeout error so callers can tell which
/// identity failed to come up.
pub fn wait_for_server_up(
    label: &str,
    host: &str,
    port: u16,
    use_tls: bool,
    timeout: Duration,
) -> Result<(), SupervisorError> {
    let prober = Prober::new(host, port, use_tls)?;
    let deadline = Instant::now() + timeout;
    debug!("Waiting for '{label}' to respond at {}", prober.url());

    loop {
        if prober.responsive() {
            debug!("'{label}' is up at {}", prober.url());
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(SupervisorError::SpawnTimeout {
                name: label.to_string(),
                port,
                waited: timeout,
            });
        }

        thread::sleep(PROBE_POLL_INTERVAL);
    }
}

/// Maps wildcard bind addresses to loopback; `0.0.0.0` accepts connections
/// on loopback but is not itself a connectable destination on all platforms.
fn probe_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "::" | "" => LOOPBACK_HOST,
        other => other,
    }
}
