//! Error taxonomy for bundling, signing and publishing.
//!
//! Every failure the core can surface is a variant of [`Error`]. Failures that
//! happen while cleaning up after another failure are never dropped: they are
//! folded into [`Error::Nested`] together with the primary error so that the
//! rendered message carries all of them.

use std::{
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

/// Result type alias for bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bundling operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid application metadata. Fatal, never retried.
    #[error("{message}")]
    Config {
        /// Name of the offending field (e.g. `author`)
        field: String,
        /// File that was examined
        path: PathBuf,
        /// Full user-facing message
        message: String,
    },

    /// External tool exited with a non-zero status.
    #[error("{command} failed ({}): {}", exit_label(.code), .stderr.trim())]
    Process {
        /// Program and arguments (sensitive values redacted)
        command: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured standard error output
        stderr: String,
    },

    /// External tool could not be spawned at all.
    #[error("Failed to run {command}: {error}")]
    CommandFailed {
        /// Program that failed to start
        command: String,
        /// Underlying spawn error
        error: io::Error,
    },

    /// Identity extraction or signing failure.
    #[error("Code signing failed: {0}")]
    Signing(String),

    /// Response with status >= 400 from an HTTP endpoint.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Authorization failure against the release host (401/403).
    #[error("{message}\n{source}")]
    Auth {
        /// Corrective message shown to the user
        message: String,
        /// Underlying HTTP failure
        source: HttpError,
    },

    /// Release publishing failure.
    #[error("{message}{}", render_http(.source))]
    Publish {
        /// What could not be published
        message: String,
        /// Server response behind the failure, if any
        source: Option<HttpError>,
    },

    /// Socket-level timeout, distinct from server-reported errors.
    #[error("Request timed out: {url}")]
    Timeout {
        /// URL of the aborted request
        url: String,
    },

    /// Connection closed before the response body completed.
    #[error("Request aborted: {url}")]
    Aborted {
        /// URL of the truncated download
        url: String,
    },

    /// Redirect chain exceeded the allowed hop count.
    #[error("Too many redirects (> {max}): {url}")]
    TooManyRedirects {
        /// Last URL requested
        url: String,
        /// Allowed hop count
        max: usize,
    },

    /// Operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Primary failure plus further failures (usually from cleanup).
    #[error("{}", render_nested(.message, .errors))]
    Nested {
        /// Heading line
        message: String,
        /// Collected failures, primary first
        errors: Vec<Error>,
    },

    /// Failure shared between several waiters of a single-flight operation.
    #[error(transparent)]
    Shared(Arc<Error>),

    /// Error annotated with what was being done.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted
        context: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// Filesystem failure with the path involved.
    #[error("Failed {context} at {}: {error}", .path.display())]
    Fs {
        /// What was being attempted
        context: String,
        /// Path involved
        path: PathBuf,
        /// Underlying IO error
        error: io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP transport error: {0}")]
    Request(#[from] reqwest::Error),

    /// Directory traversal errors
    #[error("Directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix errors
    #[error("Path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// URL parsing errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Anything else
    #[error("{0}")]
    GenericError(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn render_http(source: &Option<HttpError>) -> String {
    match source {
        Some(http) => format!(": {http}"),
        None => String::new(),
    }
}

fn render_nested(message: &str, errors: &[Error]) -> String {
    let mut rendered = message.to_string();
    for error in errors {
        rendered.push('\n');
        rendered.push_str(&error.to_string());
    }
    rendered
}

impl Error {
    /// Configuration error for a field missing from `path`.
    pub fn missing_field(field: &str, path: &Path) -> Self {
        Error::Config {
            field: field.to_string(),
            path: path.to_path_buf(),
            message: format!(
                "Please specify '{}' in the application package.json ('{}')",
                field,
                path.display()
            ),
        }
    }

    /// Configuration error with a custom message.
    pub fn config(field: &str, path: &Path, message: impl Into<String>) -> Self {
        Error::Config {
            field: field.to_string(),
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Publishing error, optionally caused by a failed response.
    pub fn publish(message: impl Into<String>, source: Option<HttpError>) -> Self {
        Error::Publish {
            message: message.into(),
            source,
        }
    }

    /// Wraps several failures under one heading.
    pub fn nested(message: impl Into<String>, errors: Vec<Error>) -> Self {
        Error::Nested {
            message: message.into(),
            errors,
        }
    }

    /// Follows [`Error::Shared`] and [`Error::Context`] wrappers to the
    /// underlying failure.
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(inner) => inner.root(),
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            Error::Http(http) => Some(http.status_code),
            Error::Auth { source, .. } => Some(source.status_code),
            Error::Publish {
                source: Some(http), ..
            } => Some(http.status_code),
            _ => None,
        }
    }

    /// `true` for the distinguishable "not found" response.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// `true` for socket-level timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout { .. })
    }
}

/// Failed HTTP response.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// Response status code
    pub status_code: u16,
    /// Canonical reason phrase for the status
    pub status_message: String,
    /// Message parsed from a JSON error body, when there was one
    pub description: Option<String>,
}

impl HttpError {
    /// Builds an error from a status code and optional parsed description.
    pub fn new(status: reqwest::StatusCode, description: Option<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            description,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code, self.status_message)?;
        if let Some(description) = &self.description {
            write!(f, "\n{description}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Adds context to fallible values.
pub trait Context<T> {
    /// Wraps the failure with a static message.
    fn context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Wraps the failure with a lazily built message.
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(context.into()))
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(f().into()))
    }
}

impl<T, E: Into<Error>> Context<T> for std::result::Result<T, E> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: f().into(),
            source: Box::new(e.into()),
        })
    }
}

/// Attaches a path to IO failures.
pub trait ErrorExt<T> {
    /// Converts an IO failure into [`Error::Fs`].
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context: context.to_string(),
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Returns early with a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}

/// Folds a list of failures into one result.
///
/// No failures is success, a single failure is returned as is, several are
/// wrapped in [`Error::Nested`] under `message`.
pub fn join_failures(mut errors: Vec<Error>, message: &str) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(Error::nested(message, errors)),
    }
}

/// Runs all futures to completion concurrently and aggregates every failure.
///
/// Unlike `try_join_all` nothing is dropped early: a failing future does not
/// cancel its siblings.
pub async fn all_settled<I, F>(futures: I, message: &str) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<()>>,
{
    let errors = futures::future::join_all(futures)
        .await
        .into_iter()
        .filter_map(|r| r.err())
        .collect();
    join_failures(errors, message)
}

/// Combines the outcome of a primary operation with its finalizer.
///
/// - both failed: [`Error::Nested`] carrying both messages
/// - only one failed: that failure
pub fn execute_finally<T>(primary: Result<T>, finally: Result<()>) -> Result<T> {
    match (primary, finally) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(primary), Ok(())) => Err(primary),
        (Ok(_), Err(finally)) => Err(finally),
        (Err(primary), Err(finally)) => {
            Err(Error::nested("Compound error: ", vec![primary, finally]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalizer_failure_is_kept_alongside_primary() {
        let result: Result<()> = execute_finally(
            Err(Error::GenericError("pack failed".into())),
            Err(Error::GenericError("keychain still present".into())),
        );

        let message = result.unwrap_err().to_string();
        assert!(message.starts_with("Compound error: "));
        assert!(message.contains("pack failed"));
        assert!(message.contains("keychain still present"));
    }

    #[test]
    fn single_failure_is_not_wrapped() {
        let error = join_failures(
            vec![Error::GenericError("only one".into())],
            "Cannot cleanup: ",
        )
        .unwrap_err();
        assert_eq!(error.to_string(), "only one");
    }

    #[test]
    fn status_code_survives_sharing() {
        let http = HttpError::new(reqwest::StatusCode::NOT_FOUND, None);
        let shared = Error::Shared(Arc::new(Error::Http(http)));
        assert!(shared.is_not_found());
    }
}
