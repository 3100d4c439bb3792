use std::path::PathBuf;

/// All errors in refdex carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, reference, or reason
/// for failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid model: {reason}")]
    InvalidModel {
        reason: String,
    },

    #[error("cannot fetch `{uri}`: {reason}")]
    Fetch {
        uri: String,
        reason: String,
    },

    #[error("unresolved reference: `{reference}` in {file}")]
    UnresolvedReference {
        reference: String,
        file: String,
    },

    #[error("lookup for `{uri}` is not allowed by configuration")]
    UnsupportedScheme {
        uri: String,
    },

    #[error("path escapes the base directory: {}", path.display())]
    OutsideBase {
        path: PathBuf,
    },

    #[error("duplicate component `{pointer}` in {file}")]
    DuplicateComponent {
        pointer: String,
        file: String,
    },

    #[error("composition conflict: {reason}")]
    CompositionConflict {
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("bundling finished with {} unresolved problems", errors.len())]
    Incomplete {
        errors: Vec<Error>,
        rendered: Option<Vec<u8>>,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Clone an error produced by a file-source fetch so every coalesced
    /// waiter on the same URI observes the same failure. Fetch results are
    /// always `Fetch` or `Cancelled`; anything else collapses to a `Fetch`
    /// carrying the rendered message.
    pub(crate) fn duplicate_for_waiter(&self, uri: &str) -> Error {
        match self {
            Error::Fetch { uri, reason } => Error::Fetch {
                uri: uri.clone(),
                reason: reason.clone(),
            },
            Error::Cancelled => Error::Cancelled,
            other => Error::Fetch {
                uri: uri.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
