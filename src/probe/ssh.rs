//! Blocking SSH probe primitives built on `ssh2`.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::Session;

use super::ProbeError;

/// SFTP status code for a missing remote path.
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Establishes a TCP connection and completes the SSH handshake.
pub(super) fn handshake(
    server: &str,
    port: u16,
    timeout: Duration,
) -> Result<Session, ProbeError> {
    let addr = (server, port)
        .to_socket_addrs()
        .map_err(|e| ProbeError::Connection(format!("cannot resolve {server}: {e}")))?
        .next()
        .ok_or_else(|| ProbeError::Connection(format!("no address for {server}")))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Connection(e.to_string())
        }
    })?;

    // Bound the handshake and subsequent channel I/O as well.
    let _ = tcp.set_read_timeout(Some(timeout));
    let _ = tcp.set_write_timeout(Some(timeout));

    let mut session = Session::new().map_err(|e| ProbeError::Handshake(e.to_string()))?;
    session.set_timeout(timeout.as_millis() as u32);
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| ProbeError::Handshake(e.to_string()))?;

    Ok(session)
}

/// Password authentication.
pub(super) fn auth_password(
    session: &Session,
    username: &str,
    password: &str,
) -> Result<(), ProbeError> {
    session
        .userauth_password(username, password)
        .map_err(|e| ProbeError::Auth(e.to_string()))?;
    if session.authenticated() {
        Ok(())
    } else {
        Err(ProbeError::Auth("password rejected".to_string()))
    }
}

/// Key-file authentication. No credential decryption is involved; the
/// key is referenced in place.
pub(super) fn auth_key(
    session: &Session,
    username: &str,
    key_path: &Path,
) -> Result<(), ProbeError> {
    session
        .userauth_pubkey_file(username, None, key_path, None)
        .map_err(|e| ProbeError::Auth(e.to_string()))?;
    if session.authenticated() {
        Ok(())
    } else {
        Err(ProbeError::Auth(format!(
            "key {} rejected",
            key_path.display()
        )))
    }
}

/// Runs a non-interactive no-op command and checks its exit status.
pub(super) fn run_noop(session: &Session) -> Result<(), ProbeError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| ProbeError::Command(format!("cannot open channel: {e}")))?;

    channel
        .exec("true")
        .map_err(|e| ProbeError::Command(format!("cannot execute no-op: {e}")))?;

    let mut output = String::new();
    let _ = channel.read_to_string(&mut output);
    channel
        .wait_close()
        .map_err(|e| ProbeError::Command(e.to_string()))?;

    let status = channel
        .exit_status()
        .map_err(|e| ProbeError::Command(e.to_string()))?;
    if status == 0 {
        Ok(())
    } else {
        Err(ProbeError::Command(format!(
            "no-op exited with status {status}"
        )))
    }
}

/// Stats `remote_path` over SFTP. A missing path is `Ok(false)`; any
/// other failure is an error.
pub(super) fn remote_path_exists(
    session: &Session,
    remote_path: &str,
) -> Result<bool, ProbeError> {
    let sftp = session
        .sftp()
        .map_err(|e| ProbeError::Command(format!("cannot open sftp: {e}")))?;

    match sftp.stat(Path::new(remote_path)) {
        Ok(_) => Ok(true),
        Err(e) => match e.code() {
            ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => Ok(false),
            _ => Err(ProbeError::Command(format!(
                "cannot stat {remote_path}: {e}"
            ))),
        },
    }
}
