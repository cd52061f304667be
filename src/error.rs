//! Crate-wide error type.

use std::fmt;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A caller-supplied argument is unusable: unknown snapshot id, no
    /// snapshot at or before a requested timestamp, a snapshot pinned twice.
    InvalidArgument,
    /// An expression or column selection does not resolve against the schema
    /// under the active case sensitivity.
    Validation,
    /// Underlying storage failed while reading or releasing a file.
    Io,
    /// Stored content (metadata, manifests, property values) is malformed.
    DataInvalid,
    /// The operation needs something this crate does not implement.
    FeatureUnsupported,
    /// An internal invariant was violated. Not recoverable.
    Unexpected,
}

impl ErrorKind {
    /// Stable textual form, used in `Display`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::Validation => "Validation",
            ErrorKind::Io => "Io",
            ErrorKind::DataInvalid => "DataInvalid",
            ErrorKind::FeatureUnsupported => "FeatureUnsupported",
            ErrorKind::Unexpected => "Unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carrying a kind, a message, optional context pairs and an optional
/// source error.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
        }
    }

    /// Attach a named context value.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.kind, self.message)?;
        for (key, value) in &self.context {
            write!(f, ", {key}: {value}")?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Error");
        dbg.field("kind", &self.kind).field("message", &self.message);
        if !self.context.is_empty() {
            dbg.field("context", &self.context);
        }
        if let Some(source) = &self.source {
            dbg.field("source", source);
        }
        dbg.finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| {
            let source: &(dyn std::error::Error + 'static) = e.as_ref();
            source
        })
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, "io operation failed").with_source(value)
    }
}

impl From<apache_avro::Error> for Error {
    fn from(value: apache_avro::Error) -> Self {
        Error::new(ErrorKind::DataInvalid, "failed to read or write avro content")
            .with_source(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::new(ErrorKind::DataInvalid, "failed to read or write json content")
            .with_source(value)
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Error::new(ErrorKind::DataInvalid, "invalid url").with_source(value)
    }
}
