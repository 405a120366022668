//! SMB client capability backed by the `smbclient` binary.
//!
//! The client wraps each invocation in an explicit `Result`: exit
//! status and diagnostic text become inspectable values rather than
//! stray process output. The share password is handed to the child
//! through the `PASSWD` environment variable so it never appears on a
//! command line.

use std::process::Command;
use std::time::Duration;

use super::ProbeError;

/// smbclient status codes that mean "the path does not exist" as
/// opposed to "the check failed".
const NOT_FOUND_STATUSES: [&str; 3] = [
    "NT_STATUS_NO_SUCH_FILE",
    "NT_STATUS_OBJECT_NAME_NOT_FOUND",
    "NT_STATUS_OBJECT_PATH_NOT_FOUND",
];

/// Runs SMB operations against a share via `smbclient`.
#[derive(Debug, Clone)]
pub struct SmbClient {
    timeout: Duration,
}

impl SmbClient {
    /// Creates a client with the given per-operation timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Trivial listing of the share root. Success means the server is
    /// reachable and the credentials are accepted.
    pub fn list(
        &self,
        server: &str,
        share: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ProbeError> {
        self.run(server, share, username, password, "ls").map(|_| ())
    }

    /// Checks whether `remote_path` exists on the share. Not-found
    /// statuses map to `Ok(false)`; anything else that fails is an
    /// error.
    pub fn exists(
        &self,
        server: &str,
        share: &str,
        username: &str,
        password: &str,
        remote_path: &str,
    ) -> Result<bool, ProbeError> {
        let command = format!("ls \"{}\"", remote_path.replace('"', ""));
        match self.run(server, share, username, password, &command) {
            Ok(_) => Ok(true),
            Err(ProbeError::Client(diag)) if is_not_found(&diag) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Invokes smbclient with a single `-c` command, returning the
    /// combined output on success or the diagnostic text on failure.
    fn run(
        &self,
        server: &str,
        share: &str,
        username: &str,
        password: &str,
        command: &str,
    ) -> Result<String, ProbeError> {
        tracing::debug!(server, share, command, "running smbclient");

        let output = Command::new("smbclient")
            .arg(format!("//{server}/{share}"))
            .args(["-U", username, "-c", command])
            .args(["-t", &self.timeout.as_secs().max(1).to_string()])
            .env("PASSWD", password)
            .output()
            .map_err(|e| ProbeError::Client(format!("cannot run smbclient: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            Ok(stdout.into_owned())
        } else {
            let diag = format!("{}{}", stdout, stderr);
            Err(ProbeError::Client(diag.trim().to_string()))
        }
    }
}

/// True if the diagnostic text names a path-not-found status.
fn is_not_found(diag: &str) -> bool {
    NOT_FOUND_STATUSES.iter().any(|s| diag.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_statuses_are_recognized() {
        assert!(is_not_found(
            "NT_STATUS_OBJECT_NAME_NOT_FOUND listing \\run1"
        ));
        assert!(is_not_found("NT_STATUS_NO_SUCH_FILE"));
        assert!(!is_not_found("NT_STATUS_LOGON_FAILURE"));
        assert!(!is_not_found("Connection to nas.local failed"));
    }

    #[test]
    fn missing_binary_or_host_is_client_error() {
        // Either smbclient is absent (error spawning) or the connect
        // to a nonexistent host fails; both must surface as Client.
        let client = SmbClient::new(Duration::from_secs(1));
        let err = client
            .list("127.0.0.1", "no-such-share", "nobody", "x")
            .unwrap_err();
        assert!(matches!(err, ProbeError::Client(_)));
    }
}
