//! Remote execution over SSH.
//!
//! One session is opened per macro invocation and shared by every command
//! in it. Unknown host keys are accepted (trust on first use). The session
//! is disconnected when it is dropped, whatever way the replay ended.

use std::fmt;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use ssh2::Session;

use crate::dispatch::ExecutionOutcome;
use crate::error::{MacroError, Result};

pub const DEFAULT_PORT: u16 = 22;
const DEFAULT_USER: &str = "root";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub enum RemoteAuth {
    Key(PathBuf),
    Password(String),
}

impl fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAuth::Key(path) => f.debug_tuple("Key").field(path).finish(),
            RemoteAuth::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

#[derive(Debug)]
pub struct RemoteConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub auth: RemoteAuth,
}

impl RemoteConfig {
    /// `target` is `host` or `user@host`. Exactly one of `key` and
    /// `password` must be given.
    pub fn new(
        target: &str,
        port: u16,
        key: Option<PathBuf>,
        password: Option<String>,
    ) -> Result<Self> {
        let auth = match (key, password) {
            (Some(key), None) => RemoteAuth::Key(key),
            (None, Some(password)) => RemoteAuth::Password(password),
            (Some(_), Some(_)) => {
                return Err(MacroError::Configuration(
                    "both --key and --password were given".to_string(),
                ))
            }
            (None, None) => {
                return Err(MacroError::Configuration(
                    "no authentication method given".to_string(),
                ))
            }
        };

        let (user, host) = match target.split_once('@') {
            Some((user, host)) => (user.to_string(), host.to_string()),
            None => (DEFAULT_USER.to_string(), target.to_string()),
        };
        if user.is_empty() || host.is_empty() {
            return Err(MacroError::Configuration(format!(
                "invalid host '{target}', expected [user@]host"
            )));
        }

        Ok(RemoteConfig {
            user,
            host,
            port,
            auth,
        })
    }

    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

pub trait RemoteSession {
    /// Run one command and capture its output. A non-zero exit status is
    /// an outcome, not an error; the session stays usable either way.
    fn exec(&mut self, command: &str) -> Result<ExecutionOutcome>;
}

pub trait RemoteConnector {
    fn connect(&self, config: &RemoteConfig) -> Result<Box<dyn RemoteSession>>;
}

pub struct SshConnector;

impl SshConnector {
    fn open_stream(config: &RemoteConfig) -> std::io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

impl RemoteConnector for SshConnector {
    fn connect(&self, config: &RemoteConfig) -> Result<Box<dyn RemoteSession>> {
        let target = config.target();
        let failed = |reason: String| MacroError::RemoteConnection {
            target: target.clone(),
            reason,
        };

        tracing::info!(host = %config.host, port = config.port, user = %config.user, "Connecting");
        let stream = Self::open_stream(config).map_err(|e| failed(e.to_string()))?;

        let mut session = Session::new().map_err(|e| failed(e.to_string()))?;
        session.set_tcp_stream(stream);
        session.handshake().map_err(|e| failed(e.to_string()))?;

        if let Some(hash) = session.host_key_hash(ssh2::HashType::Sha256) {
            let fingerprint: String = hash.iter().map(|b| format!("{b:02x}")).collect();
            tracing::debug!(host = %config.host, fingerprint = %fingerprint, "Accepted host key");
        }

        let auth = match &config.auth {
            RemoteAuth::Key(path) => session.userauth_pubkey_file(&config.user, None, path, None),
            RemoteAuth::Password(password) => session.userauth_password(&config.user, password),
        };
        auth.map_err(|e| failed(format!("authentication failed: {e}")))?;
        if !session.authenticated() {
            return Err(failed("authentication failed".to_string()));
        }

        Ok(Box::new(SshSession { session, target }))
    }
}

struct SshSession {
    session: Session,
    target: String,
}

impl SshSession {
    fn run(&mut self, command: &str) -> std::result::Result<ExecutionOutcome, String> {
        let mut channel = self.session.channel_session().map_err(|e| e.to_string())?;
        channel.exec(command).map_err(|e| e.to_string())?;

        // Both streams share one window; reading them in turn would stall a
        // command that fills stderr before closing stdout.
        self.session.set_blocking(false);
        let drained = drain_interleaved(&mut channel, POLL_INTERVAL);
        self.session.set_blocking(true);
        let (stdout, stderr) = drained.map_err(|e| e.to_string())?;

        channel.wait_close().map_err(|e| e.to_string())?;
        let status = channel.exit_status().map_err(|e| e.to_string())?;

        Ok(ExecutionOutcome {
            status: Some(status),
            stdout: Some(String::from_utf8_lossy(&stdout).into_owned()),
            stderr: Some(String::from_utf8_lossy(&stderr).into_owned()),
        })
    }
}

/// A command's two output streams, read without blocking.
trait OutputStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn at_eof(&self) -> bool;
}

impl OutputStreams for ssh2::Channel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(buf)
    }

    fn at_eof(&self) -> bool {
        self.eof()
    }
}

/// Pull whatever is ready on either stream until the remote end signals
/// EOF and a full pass yields nothing more.
fn drain_interleaved(
    streams: &mut dyn OutputStreams,
    idle: Duration,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let got_out = take_ready(streams.read_stdout(&mut buf), &buf, &mut stdout)?;
        let got_err = take_ready(streams.read_stderr(&mut buf), &buf, &mut stderr)?;

        if !got_out && !got_err {
            if streams.at_eof() {
                break;
            }
            thread::sleep(idle);
        }
    }

    Ok((stdout, stderr))
}

fn take_ready(read: io::Result<usize>, buf: &[u8], sink: &mut Vec<u8>) -> io::Result<bool> {
    match read {
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(n > 0)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

impl RemoteSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<ExecutionOutcome> {
        self.run(command).map_err(|reason| MacroError::RemoteCommand {
            command: command.to_string(),
            reason,
        })
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(err) = self.session.disconnect(None, "macro finished", None) {
            tracing::debug!(target_host = %self.target, error = %err, "Disconnect failed");
        }
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Counts connection attempts and hands out sessions that log what
    /// they ran into a shared buffer.
    #[derive(Default)]
    pub struct FakeConnector {
        pub attempts: Cell<usize>,
        pub refuse: bool,
        pub ran: Rc<RefCell<Vec<String>>>,
        pub closed: Rc<Cell<usize>>,
    }

    struct FakeSession {
        ran: Rc<RefCell<Vec<String>>>,
        closed: Rc<Cell<usize>>,
    }

    impl RemoteConnector for FakeConnector {
        fn connect(&self, config: &RemoteConfig) -> Result<Box<dyn RemoteSession>> {
            self.attempts.set(self.attempts.get() + 1);
            if self.refuse {
                return Err(MacroError::RemoteConnection {
                    target: config.target(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(Box::new(FakeSession {
                ran: Rc::clone(&self.ran),
                closed: Rc::clone(&self.closed),
            }))
        }
    }

    impl RemoteSession for FakeSession {
        fn exec(&mut self, command: &str) -> Result<ExecutionOutcome> {
            self.ran.borrow_mut().push(command.to_string());
            let failing = command.starts_with("false");
            Ok(ExecutionOutcome {
                status: Some(if failing { 1 } else { 0 }),
                stdout: Some(format!("ran {command}\n")),
                stderr: None,
            })
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }
    }
}
