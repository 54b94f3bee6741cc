use thiserror::Error;

/// The five error kinds recognized by the observer (§7).
///
/// Background loops only ever construct [`ObserverError::IoFailure`] and log
/// it (§7 propagation policy); the other variants are surfaced to callers on
/// query paths.
#[derive(Error, Debug)]
pub enum ObserverError {
    /// The platform lacks a kernel conntrack facility; the Collector runs in
    /// degraded mode instead of failing outright.
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    /// Persistence was not configured (`store_connection_string` absent).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A caller-supplied argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A transient failure talking to the store, source, or inventory.
    #[error("io failure: {0}")]
    IoFailure(String),

    /// Reserved for explicit identifier lookups; never raised for unknown
    /// container names (§7 — empty results instead).
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ObserverError>;

impl From<std::io::Error> for ObserverError {
    fn from(err: std::io::Error) -> Self {
        ObserverError::IoFailure(err.to_string())
    }
}
