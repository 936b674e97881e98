use super::{Credentials, Target, TransportError};
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

fn connection_error(target: &Target, reason: impl std::fmt::Display) -> TransportError {
    TransportError::Connection {
        host: target.addr(),
        reason: reason.to_string(),
    }
}

/// Opens an authenticated session. Any handshake or login failure maps to a
/// connection error so callers never see transport internals.
pub fn connect(
    target: &Target,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<Session, TransportError> {
    let addr = target
        .addr()
        .to_socket_addrs()
        .map_err(|err| connection_error(target, err))?
        .next()
        .ok_or_else(|| connection_error(target, "address did not resolve"))?;

    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|err| connection_error(target, err))?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|err| connection_error(target, err))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|err| connection_error(target, err))?;

    let mut session = Session::new().map_err(|err| connection_error(target, err))?;
    session.set_tcp_stream(stream);
    session.set_timeout(timeout.as_millis() as u32);
    session
        .handshake()
        .map_err(|err| connection_error(target, err))?;

    session
        .userauth_pubkey_memory(
            &credentials.username,
            None,
            &credentials.private_key,
            credentials.passphrase.as_deref(),
        )
        .map_err(|err| connection_error(target, err))?;
    if !session.authenticated() {
        return Err(connection_error(target, "authentication rejected"));
    }
    Ok(session)
}
