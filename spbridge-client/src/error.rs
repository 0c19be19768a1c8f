use thiserror::Error;

/// Errors reported by a [Client](crate::Client) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("The client is disconnected")]
    Disconnected,
    #[error("The request was rejected: {0}")]
    Rejected(String),
}

/// Errors reported by the [Transport](crate::Transport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Timed out waiting for the connection to be acknowledged")]
    ConnectTimeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("No active session")]
    NotConnected,
    #[error("Publish rejected: {0}")]
    PublishRejected(String),
    #[error("Invalid topic filter: {0}")]
    InvalidFilter(String),
    #[error("The transport has been closed")]
    Closed,
}

impl TransportError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectTimeout | TransportError::Connect(_) | TransportError::NotConnected
        )
    }
}

impl From<ClientError> for TransportError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::Disconnected => TransportError::NotConnected,
            ClientError::Rejected(reason) => TransportError::PublishRejected(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_is_decided_by_kind() {
        assert!(TransportError::ConnectTimeout.is_retryable());
        assert!(TransportError::Connect("refused".into()).is_retryable());
        assert!(TransportError::NotConnected.is_retryable());
        assert!(!TransportError::PublishRejected("too large".into()).is_retryable());
        assert!(!TransportError::InvalidFilter("a/#/b".into()).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
    }

    #[test]
    fn client_errors_map_onto_transport_errors() {
        assert_eq!(
            TransportError::from(ClientError::Disconnected),
            TransportError::NotConnected
        );
        assert_eq!(
            TransportError::from(ClientError::Rejected("qos".into())),
            TransportError::PublishRejected("qos".into())
        );
    }
}
