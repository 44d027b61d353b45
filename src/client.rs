//! A synchronous management-interface session.
//!
//! The session is strictly request/response: one command is written, then
//! lines are read until that command's terminator arrives. Nothing runs in
//! the background, so asynchronous `>` notifications are only noticed (and
//! dropped) while a reply is being read.

use std::io::{self, BufRead, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::command::{self, KillTarget, Signal};
use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::reply::{is_notification, is_terminator, CommandResult};
use crate::stats::StatsSnapshot;
use crate::status::StatusReport;

/// Challenge sent by a password-protected management interface.
///
/// It is not followed by a newline.
pub const PASSWORD_PROMPT: &[u8] = b"ENTER PASSWORD:";

/// A duplex byte stream a [`Session`] can run over.
pub trait Transport: io::Read + io::Write {
    /// Bound the next blocking read, `None` to block forever.
    fn set_read_timeout(&self, to: Option<Duration>) -> io::Result<()>;
    /// Bound each blocking write, `None` to block forever.
    fn set_write_timeout(&self, to: Option<Duration>) -> io::Result<()>;
    /// Close both directions, waking any pending read.
    fn shutdown(&self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, to: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, to)
    }

    fn set_write_timeout(&self, to: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, to)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, std::net::Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for UnixStream {
    fn set_read_timeout(&self, to: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, to)
    }

    fn set_write_timeout(&self, to: Option<Duration>) -> io::Result<()> {
        UnixStream::set_write_timeout(self, to)
    }

    fn shutdown(&self) -> io::Result<()> {
        UnixStream::shutdown(self, std::net::Shutdown::Both)
    }
}

/// One live connection to a management interface.
///
/// A session is not meant to be shared: give each thread its own, or
/// serialize access. After [`Error::is_fatal`] errors it must be closed and
/// reopened.
pub struct Session<T: Transport = TcpStream> {
    reader: BufReader<T>,
    endpoint: String,
    timeout: Duration,
    authenticated: bool,
}

impl Session<TcpStream> {
    /// Connect over TCP and log in if a password is configured.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// println!("{}", session.version()?);
    /// session.close()?;
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn open(options: &ConnectOptions) -> Result<Self> {
        let endpoint = options.endpoint();
        let stream = connect_tcp(options)?;
        Session::from_transport(stream, endpoint, options.timeout, options.password.as_deref())
    }
}

#[cfg(unix)]
impl Session<UnixStream> {
    /// Connect to a management interface bound to a UNIX socket
    /// (`--management <path> unix`). Host and port of `options` are ignored.
    pub fn open_unix<P: AsRef<Path>>(path: P, options: &ConnectOptions) -> Result<Self> {
        let endpoint = path.as_ref().display().to_string();
        let stream = UnixStream::connect(path)
            .map_err(|source| Error::Connect { endpoint: endpoint.clone(), source })?;
        Session::from_transport(stream, endpoint, options.timeout, options.password.as_deref())
    }
}

impl<T: Transport> Session<T> {
    /// Wrap an already connected stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - Connected transport, owned by the session from now on
    /// * `endpoint` - Address used in log messages
    /// * `timeout` - Bound on each reply and on the login exchange; must be non-zero
    /// * `password` - Answer to the `ENTER PASSWORD:` challenge, if any
    ///
    /// # Returns
    ///
    /// Returns the session, logged in if a password was given. A missing
    /// prompt or a rejected password is [`Error::Auth`]; a password containing
    /// a line break is [`Error::InvalidArgument`] and is never sent.
    pub fn from_transport(
        stream: T,
        endpoint: impl Into<String>,
        timeout: Duration,
        password: Option<&str>,
    ) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidArgument("timeout must be non-zero".into()));
        }
        stream.set_write_timeout(Some(timeout))?;
        let mut session = Self {
            reader: BufReader::new(stream),
            endpoint: endpoint.into(),
            timeout,
            authenticated: false,
        };
        if let Some(password) = password {
            session.login(password)?;
        }
        info!("connected to management interface at {}", session.endpoint);
        Ok(session)
    }

    /// Address this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bound on waiting for each reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the password challenge was answered successfully.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Shut the connection down.
    ///
    /// Consumes the session, so it cannot be used afterwards.
    pub fn close(self) -> Result<()> {
        info!("closing management session to {}", self.endpoint);
        match self.reader.get_ref().shutdown() {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Send one command line and read its reply.
    ///
    /// The reply is classified by its terminator line: `ERROR: m` gives
    /// [`CommandResult::Error`], `SUCCESS: m` gives [`CommandResult::Success`],
    /// anything else (an `END` line, or a `SUCCESS:` line without payload)
    /// gives the whole block as [`CommandResult::Raw`].
    ///
    /// # Arguments
    ///
    /// * `command` - A single management command line, without line terminator
    ///
    /// # Returns
    ///
    /// Returns the classified reply. `ERROR:` replies are *not* turned into
    /// errors here; [`Error::Timeout`] and [`Error::Protocol`] mean the session
    /// must be reopened, and a command containing a line break fails with
    /// [`Error::InvalidArgument`] before anything is written.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// let reply = session.issue("state")?;
    /// println!("{reply}");
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn issue(&mut self, command: &str) -> Result<CommandResult> {
        if command.contains(['\n', '\r']) {
            return Err(Error::InvalidArgument(format!("command {command:?} spans several lines")));
        }
        debug!("sending command {command:?}");
        self.write_line(command)?;
        let lines = self.read_reply()?;
        Ok(CommandResult::classify(lines))
    }

    /// Fetch the connected clients and the routing table.
    ///
    /// Sends `status` and parses the multi-line report.
    ///
    /// # Returns
    ///
    /// Returns a [`StatusReport`] keyed by common name (clients) and virtual
    /// address (routes). A malformed table row gives [`Error::Parse`], an
    /// `ERROR:` reply gives [`Error::Remote`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// let report = session.status()?;
    /// for (cn, connections) in &report.clients {
    ///     println!("{cn}: {} connection(s)", connections.len());
    /// }
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn status(&mut self) -> Result<StatusReport> {
        match self.issue(command::STATUS)? {
            CommandResult::Raw(lines) => StatusReport::parse(&lines),
            CommandResult::Error(message) => Err(Error::Remote(message)),
            CommandResult::Success(payload) => {
                Err(Error::Protocol(format!("single-line reply to status: {payload}")))
            }
        }
    }

    /// Fetch the client count and traffic counters.
    ///
    /// Sends `load-stats` and parses its single-line payload.
    ///
    /// # Returns
    ///
    /// Returns a fresh [`StatsSnapshot`]. Missing, reordered or non-numeric
    /// fields give [`Error::Parse`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// let stats = session.stats()?;
    /// println!("{} clients, {} bytes in", stats.clients, stats.bytes_download);
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn stats(&mut self) -> Result<StatsSnapshot> {
        match self.issue(command::LOAD_STATS)? {
            CommandResult::Success(payload) => StatsSnapshot::parse(&payload),
            CommandResult::Error(message) => Err(Error::Remote(message)),
            CommandResult::Raw(_) => Err(Error::Protocol("multi-line reply to load-stats".into())),
        }
    }

    /// Daemon and management interface versions.
    ///
    /// # Returns
    ///
    /// Returns the reply text, one line per version, without the `END` line.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// println!("{}", session.version()?);
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn version(&mut self) -> Result<String> {
        self.issue(command::VERSION)?.into_text()
    }

    /// Process ID of the daemon, as reported (`pid=<n>`).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// assert!(session.pid()?.starts_with("pid="));
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn pid(&mut self) -> Result<String> {
        self.issue(command::PID)?.into_text()
    }

    /// Send a signal given by name.
    ///
    /// # Arguments
    ///
    /// * `name` - One of `SIGHUP`, `SIGTERM`, `SIGUSR1`, `SIGUSR2`
    ///
    /// # Returns
    ///
    /// Returns the daemon's confirmation. Unsupported names fail with
    /// [`Error::InvalidArgument`] before anything is written; a refusal by
    /// the daemon is [`Error::Remote`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// session.signal("SIGUSR2")?;
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn signal(&mut self, name: &str) -> Result<String> {
        let sig: Signal = name.parse()?;
        self.send_signal(sig)
    }

    /// Send a signal, see [`Session::signal`].
    pub fn send_signal(&mut self, sig: Signal) -> Result<String> {
        self.issue(&command::signal(sig))?.into_text()
    }

    /// Set the log verbosity, or query it with `None`.
    ///
    /// # Arguments
    ///
    /// * `level` - New verbosity, or `None` to read the current one
    ///
    /// # Returns
    ///
    /// Returns the daemon's reply, e.g. `verb=3` for a query.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// println!("{}", session.verb(None)?);
    /// session.verb(Some(4))?;
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn verb(&mut self, level: Option<u32>) -> Result<String> {
        self.issue(&command::verb(level))?.into_text()
    }

    /// Set the log mute level, or query it with `None`.
    ///
    /// Works like [`Session::verb`].
    pub fn mute(&mut self, level: Option<u32>) -> Result<String> {
        self.issue(&command::mute(level))?.into_text()
    }

    /// Disconnect client instance(s).
    ///
    /// # Arguments
    ///
    /// * `target` - Every instance of a common name, or one `host:port`
    ///
    /// # Returns
    ///
    /// Returns the daemon's confirmation. An unknown target comes back as
    /// [`Error::Remote`] carrying the daemon's message.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ovpn_mgmt::{ConnectOptions, KillTarget, Session};
    ///
    /// let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    /// session.kill(&KillTarget::CommonName("alice".into()))?;
    /// session.kill(&KillTarget::Address { host: "198.51.100.7".into(), port: 50112 })?;
    /// # Ok::<(), ovpn_mgmt::Error>(())
    /// ```
    pub fn kill(&mut self, target: &KillTarget) -> Result<String> {
        let line = command::kill(target)?;
        self.issue(&line)?.into_text()
    }

    fn login(&mut self, password: &str) -> Result<()> {
        // A line break would smuggle a command in after the password.
        if password.contains(['\n', '\r']) {
            return Err(Error::InvalidArgument("password spans several lines".into()));
        }
        let deadline = Instant::now() + self.timeout;
        self.wait_for_prompt(deadline)?;
        debug!("answering password prompt");
        self.write_line(password)?;

        loop {
            let line = match self.read_line(deadline) {
                Ok(Some(line)) => line,
                Ok(None) => return Err(Error::Auth("connection closed after password".into())),
                Err(Error::Timeout) => return Err(Error::Auth("no reply to password".into())),
                Err(e) => return Err(e),
            };
            // The prompt leaves an unterminated line behind.
            if line.trim().is_empty() || is_notification(&line) {
                continue;
            }
            if line.starts_with("SUCCESS:") {
                self.authenticated = true;
                return Ok(());
            }
            let reason = line.strip_prefix("ERROR: ").unwrap_or(&line);
            return Err(Error::Auth(reason.to_string()));
        }
    }

    /// Consume the stream up to and including the password prompt.
    fn wait_for_prompt(&mut self, deadline: Instant) -> Result<()> {
        let mut seen: Vec<u8> = Vec::new();
        loop {
            match self.arm_read_timeout(deadline) {
                Err(Error::Timeout) => return Err(Error::Auth("password prompt not received".into())),
                other => other?,
            }
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if is_timeout(&e) => {
                    return Err(Error::Auth("password prompt not received".into()))
                }
                Err(e) => return Err(e.into()),
            };
            if available.is_empty() {
                return Err(Error::Auth("connection closed before password prompt".into()));
            }

            let mut used = available.len();
            let mut found = false;
            for (i, &b) in available.iter().enumerate() {
                seen.push(b);
                if seen.ends_with(PASSWORD_PROMPT) {
                    used = i + 1;
                    found = true;
                    break;
                }
            }
            self.reader.consume(used);
            if found {
                return Ok(());
            }
            if seen.len() > 4096 {
                seen.drain(..seen.len() - PASSWORD_PROMPT.len());
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(format!("{line}\n").as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Read lines up to and including the next terminator line.
    fn read_reply(&mut self) -> Result<Vec<String>> {
        let deadline = Instant::now() + self.timeout;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(deadline)?.ok_or_else(|| {
                Error::Protocol("connection closed before the reply was complete".into())
            })?;
            if is_notification(&line) {
                debug!("skipping notification {line:?}");
                continue;
            }
            let done = is_terminator(&line);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Next line without its terminator, `None` at end of stream.
    fn read_line(&mut self, deadline: Instant) -> Result<Option<String>> {
        self.arm_read_timeout(deadline)?;
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) if is_timeout(&e) => return Err(Error::Timeout),
            Err(e) => return Err(e.into()),
        }
        if buf.ends_with(b"\n") {
            buf.pop();
        }
        if buf.ends_with(b"\r") {
            buf.pop();
        }
        let line = String::from_utf8(buf)?;
        trace!("received {line:?}");
        Ok(Some(line))
    }

    fn arm_read_timeout(&mut self, deadline: Instant) -> Result<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }
        self.reader.get_ref().set_read_timeout(Some(remaining))?;
        Ok(())
    }
}

fn connect_tcp(options: &ConnectOptions) -> Result<TcpStream> {
    let endpoint = options.endpoint();
    let addrs = (options.host.as_str(), options.port)
        .to_socket_addrs()
        .map_err(|source| Error::Connect { endpoint: endpoint.clone(), source })?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, options.timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connecting to {addr} failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(Error::Connect {
        endpoint,
        source: last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }),
    })
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
