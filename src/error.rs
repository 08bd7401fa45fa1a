//! Unified error types for the FOTA client.
//!
//! Every subsystem error converts into the top-level [`Error`], so the
//! scheduler and the binary handle failures uniformly.  All variants are
//! `Copy` so they can be carried inside session states and reporting
//! events without allocation.
//!
//! Only [`ConfigError`] is fatal: it is returned from
//! [`FotaScheduler::start`](crate::scheduler::FotaScheduler::start).  Every
//! other class terminates one session and is reported through the
//! [`EventSink`](crate::app::ports::EventSink).

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Config(ConfigError),
    Parse(ParseError),
    Session(SessionError),
    Upgrade(UpgradeError),
    Resolution(ResolutionError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Upgrade(e) => write!(f, "upgrade: {e}"),
            Self::Resolution(e) => write!(f, "resolution: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors (fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `start()` was already called on this scheduler.
    AlreadyRunning,
    /// The locally running firmware version string does not parse.
    InvalidLocalVersion,
    /// A config field failed range validation.
    /// The `&'static str` names the field and the accepted range.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "FOTA already running"),
            Self::InvalidLocalVersion => write!(f, "local firmware version is malformed"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Version string or response body is structurally wrong.
    Malformed,
    /// No blank line between headers and body (malformed or partial response).
    NoBodySeparator,
    /// The server answered with a non-2xx status.
    HttpStatus(u16),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::NoBodySeparator => write!(f, "no header/body separator"),
            Self::HttpStatus(code) => write!(f, "unexpected HTTP status {code}"),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors (terminal for one session)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// No response within the response window.
    Timeout,
    /// The network layer reported the connection gone.
    Disconnected,
    /// The transport refused to open a connection.
    ConnectFailed,
    /// The transport refused the request bytes.
    SendFailed,
    /// The request did not fit its fixed-capacity buffer.
    RequestTooLarge,
    /// The response could not be decoded.
    Parse(ParseError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "response timeout"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::SendFailed => write!(f, "send failed"),
            Self::RequestTooLarge => write!(f, "request exceeds buffer"),
            Self::Parse(e) => write!(f, "bad response: {e}"),
        }
    }
}

impl From<ParseError> for SessionError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Upgrade errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeError {
    /// The flash engine reported a failed download, write or verify.
    EngineFailed,
    /// The flash engine refused to start the download.
    EngineRejected,
    /// The download connection could not be opened.
    ConnectFailed,
    /// The download connection dropped before the engine took it over.
    Disconnected,
    /// The download request did not fit its fixed-capacity buffer.
    RequestTooLarge,
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineFailed => write!(f, "flash engine reported failure"),
            Self::EngineRejected => write!(f, "flash engine rejected the download"),
            Self::ConnectFailed => write!(f, "download connect failed"),
            Self::Disconnected => write!(f, "download connection lost"),
            Self::RequestTooLarge => write!(f, "download request exceeds buffer"),
        }
    }
}

impl From<UpgradeError> for Error {
    fn from(e: UpgradeError) -> Self {
        Self::Upgrade(e)
    }
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionError {
    /// The resolver answered without an IPv4 address.
    NoAddress,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAddress => write!(f, "no address for host"),
        }
    }
}

impl From<ResolutionError> for Error {
    fn from(e: ResolutionError) -> Self {
        Self::Resolution(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
