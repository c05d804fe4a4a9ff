//! Crate-wide error type and causal-chain carrier.

use std::fmt;

/// The closed set of error kinds a fallible operation in this crate can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {message}")]
    InvalidArgument {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("not found: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("already exists: {message}")]
    AlreadyExists {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("failed precondition: {message}")]
    FailedPrecondition {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("io failure: {message}")]
    IoFailure {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("gpu failure: {message}")]
    GpuFailure {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("shader compile failed: {message}")]
    ShaderCompileFailed {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("cancelled: {message}")]
    Cancelled {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("internal bug: {message}")]
    InternalBug {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument { message: message.into(), source: None }
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Error::ResourceExhausted { message: message.into(), source: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound { message: message.into(), source: None }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::AlreadyExists { message: message.into(), source: None }
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Error::FailedPrecondition { message: message.into(), source: None }
    }

    pub fn io_failure(message: impl Into<String>) -> Self {
        Error::IoFailure { message: message.into(), source: None }
    }

    pub fn gpu_failure(message: impl Into<String>) -> Self {
        Error::GpuFailure { message: message.into(), source: None }
    }

    pub fn shader_compile_failed(message: impl Into<String>) -> Self {
        Error::ShaderCompileFailed { message: message.into(), source: None }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled { message: message.into(), source: None }
    }

    pub fn internal_bug(message: impl Into<String>) -> Self {
        Error::InternalBug { message: message.into(), source: None }
    }

    /// Attaches a causal source to an already-constructed error, returning a new one
    /// of the same variant.
    pub fn with_source(self, source: Error) -> Self {
        let boxed = Some(Box::new(source));
        match self {
            Error::InvalidArgument { message, .. } => Error::InvalidArgument { message, source: boxed },
            Error::ResourceExhausted { message, .. } => Error::ResourceExhausted { message, source: boxed },
            Error::NotFound { message, .. } => Error::NotFound { message, source: boxed },
            Error::AlreadyExists { message, .. } => Error::AlreadyExists { message, source: boxed },
            Error::FailedPrecondition { message, .. } => Error::FailedPrecondition { message, source: boxed },
            Error::IoFailure { message, .. } => Error::IoFailure { message, source: boxed },
            Error::GpuFailure { message, .. } => Error::GpuFailure { message, source: boxed },
            Error::ShaderCompileFailed { message, .. } => Error::ShaderCompileFailed { message, source: boxed },
            Error::Cancelled { message, .. } => Error::Cancelled { message, source: boxed },
            Error::InternalBug { message, .. } => Error::InternalBug { message, source: boxed },
        }
    }
}

/// Formats the full causal chain, innermost cause last, separated by `caused by:`.
/// `tracing`'s `%e` formatting and `Display` both resolve to this via `thiserror`'s
/// generated impl plus this manual chain walk.
pub fn chain_to_string(err: &Error) -> String {
    use std::error::Error as _;
    let mut out = err.to_string();
    let mut cur: Option<&dyn std::error::Error> = err.source();
    while let Some(e) = cur {
        out.push_str(" caused by: ");
        out.push_str(&e.to_string());
        cur = e.source();
    }
    out
}

impl fmt::Display for ErrorKindLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cheap label for grouping errors by kind in logs/metrics without matching the enum.
pub struct ErrorKindLabel(pub &'static str);

impl Error {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::InvalidArgument { .. } => "invalid_argument",
            Error::ResourceExhausted { .. } => "resource_exhausted",
            Error::NotFound { .. } => "not_found",
            Error::AlreadyExists { .. } => "already_exists",
            Error::FailedPrecondition { .. } => "failed_precondition",
            Error::IoFailure { .. } => "io_failure",
            Error::GpuFailure { .. } => "gpu_failure",
            Error::ShaderCompileFailed { .. } => "shader_compile_failed",
            Error::Cancelled { .. } => "cancelled",
            Error::InternalBug { .. } => "internal_bug",
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
