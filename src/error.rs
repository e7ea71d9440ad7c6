use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `cleanbot`.
///
/// Each subsystem defines its own error variant. CLI dispatch and the daemon
/// return it; the gateway glue and config loading use `anyhow` for context
/// chains, which land in `Other`.
#[derive(Debug, Error)]
pub enum CleanerError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Platform / transport ────────────────────────────────────────────
    #[error("platform: {0}")]
    Platform(#[from] PlatformError),

    // ── Retention store ─────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Deletion engine ─────────────────────────────────────────────────
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

/// Rejections raised at the configuration boundary.
///
/// These never mutate state; the command surface turns them into a reply.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("retention must be between {min} and {max} hours, got {hours}")]
    RetentionOutOfRange { hours: i64, min: u32, max: u32 },

    #[error("cleaner is not enabled for channel {0}")]
    NotEnabled(String),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Platform errors ─────────────────────────────────────────────────────────

/// Failures reported by the chat platform, classified by how the caller
/// should react to them.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("decode: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Server-side failures that are worth retrying from the same cursor.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Http { status, message },
        }
    }
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write state file {path}: {message}")]
    Write { path: String, message: String },

    #[error("failed to serialize state: {0}")]
    Serialize(String),
}

// ─── Engine errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("history scan for channel {channel} gave up after {attempts} transient failures")]
    ScanRetriesExhausted { channel: String, attempts: u32 },

    #[error("history scan for channel {channel} failed: {source}")]
    Scan {
        channel: String,
        #[source]
        source: PlatformError,
    },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, CleanerError>;
