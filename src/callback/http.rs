use super::{CallbackReceiver, CallbackResponse};
use crate::shared::now_secs;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Blocking HTTP listener for agent callbacks. Agents issue one short GET per
/// status change, so a sequential accept loop is all the throughput this
/// endpoint needs.
pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves callbacks until the process exits. Per-connection failures are
    /// logged and dropped; a bad peer must not take the receiver down.
    pub fn serve(&self, receiver: &CallbackReceiver, state_root: &std::path::Path) {
        for stream in self.listener.incoming() {
            let result = match stream {
                Ok(stream) => handle_connection(stream, receiver),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                let _ = crate::shared::logging::append_engine_log_line(
                    state_root,
                    &format!("callback connection failed: {err}"),
                );
            }
        }
    }

    /// Accepts and answers exactly one connection. Test hook.
    pub fn accept_one(&self, receiver: &CallbackReceiver) -> std::io::Result<()> {
        let (stream, _) = self.listener.accept()?;
        handle_connection(stream, receiver)
    }
}

fn handle_connection(stream: TcpStream, receiver: &CallbackReceiver) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Drain headers; the callback protocol carries everything in the path.
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
    }

    let mut stream = reader.into_inner();
    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path),
        _ => {
            return write_response(
                &mut stream,
                400,
                &CallbackResponse::Error("malformed request line".to_string()).to_json(),
            );
        }
    };
    if method != "GET" {
        return write_response(
            &mut stream,
            405,
            &CallbackResponse::Error(format!("method `{method}` not allowed")).to_json(),
        );
    }

    let response = receiver.handle(path, now_secs());
    let code = if response.is_error() { 400 } else { 200 };
    write_response(&mut stream, code, &response.to_json())
}

fn write_response(stream: &mut TcpStream, code: u16, body: &str) -> std::io::Result<()> {
    let reason = match code {
        200 => "OK",
        400 => "Bad Request",
        405 => "Method Not Allowed",
        _ => "Error",
    };
    write!(
        stream,
        "HTTP/1.1 {code} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}
