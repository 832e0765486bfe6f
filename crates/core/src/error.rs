use crate::status::Operation;

/// Failure reported by a remote collaborator (ledger contract or content store).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The collaborator declined the call. The message is the collaborator's own reason.
    #[error("{0}")]
    Rejected(String),
    /// The collaborator could not be reached or failed internally.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        RemoteError::Rejected(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        RemoteError::Unavailable(reason.into())
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Required local input is missing or malformed. Raised before any remote call.
    #[error("{0}")]
    InvalidInput(String),

    #[error("no identity is connected")]
    NotConnected,

    /// A confirms-or-fails call was declined or could not be confirmed.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: Operation,
        #[source]
        source: RemoteError,
    },

    /// A read needed to build a view failed as a whole.
    #[error("Fetch {what} failed: {source}")]
    Fetch {
        what: &'static str,
        #[source]
        source: RemoteError,
    },

    /// One item of a bulk refresh could not be resolved.
    #[error("failed to resolve {kind} {id}: {reason}")]
    Resolution {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("ledger state error: {0}")]
    LedgerState(String),
}

impl ClientError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        ClientError::InvalidInput(message.into())
    }

    pub(crate) fn remote(operation: Operation, source: RemoteError) -> Self {
        ClientError::Remote { operation, source }
    }

    /// Returns the collaborator-supplied rejection message, if this error carries one.
    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            ClientError::Remote {
                source: RemoteError::Rejected(reason),
                ..
            }
            | ClientError::Fetch {
                source: RemoteError::Rejected(reason),
                ..
            } => Some(reason),
            _ => None,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
