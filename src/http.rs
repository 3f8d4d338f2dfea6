//! Minimal blocking HTTP/1.1 plumbing shared by the mock service and the
//! control server.
//!
//! Both servers run a single-threaded event loop fed by an acceptor thread.
//! The acceptor owns the listening socket and forwards prepared connections
//! over a channel; a Ctrl-C handler feeds the same channel, so shutdown and
//! traffic serialize naturally.
use std::{
    io::{self, BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
    thread::{self, JoinHandle},
};

use native_tls::TlsAcceptor;
use tracing::{debug, error, trace, warn};

use crate::constants::{ACCEPT_POLL_INTERVAL, CLIENT_READ_TIMEOUT, MAX_REQUEST_BODY_BYTES};

/// A bidirectional client connection, plain or TLS.
pub trait Conn: Read + Write + Send {}

impl<T: Read + Write + Send> Conn for T {}

/// What the server event loop wakes up for.
pub enum ServerEvent {
    /// A client connection ready to be served.
    Connection(Box<dyn Conn>),
    /// The process received an interrupt and should drain and exit.
    Shutdown,
}

/// A parsed HTTP/1.1 request.
#[derive(Debug)]
pub struct Request {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Request target as sent, including any query string.
    pub target: String,
    /// Header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
    /// Request body, empty unless a `Content-Length` was sent.
    pub body: Vec<u8>,
}

impl Request {
    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The target with any query string removed.
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(idx) => &self.target[..idx],
            None => &self.target,
        }
    }

    /// The query string, if the target carries one.
    pub fn query(&self) -> Option<&str> {
        self.target.find('?').map(|idx| &self.target[idx + 1..])
    }
}

/// Reads one request from `reader`.
///
/// Returns `Ok(None)` when the peer closed the connection before sending a
/// request line. Malformed requests and bodies declared larger than
/// [`MAX_REQUEST_BODY_BYTES`] surface as [`io::ErrorKind::InvalidData`].
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<Request>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target.to_string()),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed request line: {}", line.trim_end()),
            ));
        }
    };

    let mut headers = Vec::new();
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line)? == 0 {
            break;
        }
        let header_line = header_line.trim_end();
        if header_line.is_empty() {
            break;
        }
        match header_line.split_once(':') {
            Some((name, value)) => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed header line: {header_line}"),
                ));
            }
        }
    }

    let mut body = Vec::new();
    if let Some(length) = content_length(&headers)? {
        body.resize(length, 0);
        reader.read_exact(&mut body)?;
    }

    Ok(Some(Request {
        method,
        target,
        headers,
        body,
    }))
}

fn content_length(headers: &[(String, String)]) -> io::Result<Option<usize>> {
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-length") {
            let length = value.parse::<usize>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid content length: {value}"),
                )
            })?;
            // The declared length is allocated up front, so an unchecked
            // value lets one request exhaust the process.
            if length > MAX_REQUEST_BODY_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "content length {length} exceeds the {MAX_REQUEST_BODY_BYTES} byte limit"
                    ),
                ));
            }
            return Ok(Some(length));
        }
    }
    Ok(None)
}

/// An HTTP/1.1 response under construction.
#[derive(Debug)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Extra headers beyond the framing ones written by [`Response::write_to`].
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// An empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the body and its content type.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        self.body = body.into();
        self.headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        self
    }

    /// Serializes the response. Every response closes the connection, so the
    /// framing always carries `Content-Length` and `Connection: close`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        )?;
        for (name, value) in &self.headers {
            write!(writer, "{name}: {value}\r\n")?;
        }
        write!(writer, "Content-Length: {}\r\n", self.body.len())?;
        write!(writer, "Connection: close\r\n\r\n")?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Reads one request off `conn`, answers it with `handler`, and lets the
/// connection close. Unreadable requests are dropped without a response.
pub fn serve_connection<F>(mut conn: Box<dyn Conn>, handler: F)
where
    F: FnOnce(&Request) -> Response,
{
    let request = {
        let mut reader = BufReader::new(&mut *conn);
        match read_request(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(err) => {
                debug!("dropping connection: {err}");
                return;
            }
        }
    };

    let response = handler(&request);
    debug!(
        method = %request.method,
        target = %request.target,
        status = response.status,
        "served request"
    );
    if let Err(err) = response.write_to(&mut conn) {
        debug!("failed to write response: {err}");
    }
}

/// Starts the acceptor thread for `listener`.
///
/// Accepted sockets are switched back to blocking mode, given a read
/// timeout, optionally wrapped in TLS, and forwarded over `events`. The
/// thread exits when `accepting` is cleared or the receiving side goes away.
pub fn spawn_acceptor(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    events: Sender<ServerEvent>,
    accepting: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    let handle = thread::spawn(move || {
        while accepting.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    trace!(%peer, "accepted connection");
                    let conn = match prepare_stream(stream, tls.as_ref()) {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!("dropping connection from {peer}: {err}");
                            continue;
                        }
                    };
                    if events.send(ServerEvent::Connection(conn)).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    error!("accept failed: {err}");
                    break;
                }
            }
        }
    });
    Ok(handle)
}

fn prepare_stream(stream: TcpStream, tls: Option<&TlsAcceptor>) -> io::Result<Box<dyn Conn>> {
    // The listener is non-blocking so the acceptor can poll its shutdown
    // flag; accepted sockets inherit that and must be switched back.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
    match tls {
        Some(acceptor) => {
            let stream = acceptor
                .accept(stream)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
            Ok(Box::new(stream))
        }
        None => Ok(Box::new(stream)),
    }
}
