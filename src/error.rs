use thiserror::Error;

/// Categorizes connection errors for subscriber decision-making.
///
/// This is the discriminator carried on every `Topic::Error` event, so
/// subscribers can react by category without parsing error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport construction failed (bad URL, handshake request rejected)
    Creation,
    /// Transport-level failure while open or connecting
    Connection,
    /// Inbound frame not decodable as the envelope shape
    Parse,
    /// Write attempted on a closed/absent transport, or the write raised
    Send,
}

impl ErrorKind {
    /// Wire-style string form, matching what observers key on
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Creation => "creation_error",
            ErrorKind::Connection => "connection_error",
            ErrorKind::Parse => "parse_error",
            ErrorKind::Send => "send_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `Topic::Error` bus event.
///
/// Connection errors are recovered locally and surfaced only through
/// these events; they are never returned to the caller of `connect()` or
/// `send()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable description of the underlying error
    pub message: String,
}

impl ErrorEvent {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors returned by constructors and configuration, where no connection
/// exists yet to carry an event.
#[derive(Error, Debug)]
pub enum Error {
    /// Endpoint URL could not be parsed
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Endpoint scheme is not usable for a WebSocket connection
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_strings() {
        assert_eq!(ErrorKind::Creation.as_str(), "creation_error");
        assert_eq!(ErrorKind::Connection.as_str(), "connection_error");
        assert_eq!(ErrorKind::Parse.as_str(), "parse_error");
        assert_eq!(ErrorKind::Send.as_str(), "send_error");
    }

    #[test]
    fn test_error_event_carries_kind_and_message() {
        let event = ErrorEvent::new(ErrorKind::Parse, "expected value at line 1");
        assert_eq!(event.kind, ErrorKind::Parse);
        assert!(event.message.contains("expected value"));
    }
}
