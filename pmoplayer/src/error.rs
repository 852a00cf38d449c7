//! Error types for the playback session core

use serde::Serialize;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad cause shown to the user when something fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCause {
    /// The network could not deliver the content
    Network,
    /// The content was delivered but cannot be read
    Format,
    /// The content does not exist or has no reachable source
    Availability,
    /// Anything else
    Other,
}

/// Errors that can occur inside the player core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network request or stream load failed
    #[error("Network error: {0}")]
    Network(String),

    /// Content could not be decoded or parsed
    #[error("Format error: {0}")]
    Format(String),

    /// Content or source is not available
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A swarm identifier (magnet link, info hash, .torrent URL) was rejected
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A swarm file could not be turned into a local blob
    #[error("Materialization failed: {0}")]
    Materialize(String),

    /// Persistent cache read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Media element failure during playback
    #[error("Playback error: {0}")]
    Playback(String),

    /// Cast hand-off failed
    #[error("Cast error: {0}")]
    Cast(String),

    /// Command not valid in the current session
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Unknown subtitle track label
    #[error("Unknown subtitle track: {0}")]
    UnknownTrack(String),

    /// Unknown swarm file name
    #[error("Unknown file: {0}")]
    UnknownFile(String),

    /// Configuration error (from pmoconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// JSON encoding of stored records failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Maps the error onto the cause shown to the user
    pub fn cause(&self) -> ErrorCause {
        match self {
            Error::Network(_) | Error::Timeout(_) | Error::Http(_) => ErrorCause::Network,
            Error::Format(_) | Error::Json(_) => ErrorCause::Format,
            Error::Unavailable(_)
            | Error::InvalidIdentifier(_)
            | Error::UnknownFile(_)
            | Error::UnknownTrack(_) => ErrorCause::Availability,
            Error::Materialize(_)
            | Error::Storage(_)
            | Error::Playback(_)
            | Error::Cast(_)
            | Error::InvalidCommand(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorCause::Other,
        }
    }

    /// Terse message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            Error::Network(_) | Error::Http(_) => {
                "Network error: check your connection and try again".to_string()
            }
            Error::Timeout(what) => format!("{what} took too long, try again later"),
            Error::Format(_) | Error::Json(_) => {
                "This media format is not supported".to_string()
            }
            Error::Unavailable(what) => format!("{what} is not available"),
            Error::InvalidIdentifier(_) => {
                "Invalid magnet link or torrent identifier".to_string()
            }
            Error::UnknownFile(name) => format!("{name} is not part of this torrent"),
            Error::UnknownTrack(label) => format!("No subtitle track named {label}"),
            Error::Materialize(_) => "The file could not be prepared for download".to_string(),
            Error::Cast(msg) => format!("Cast failed: {msg}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_causes() {
        assert_eq!(Error::network("x").cause(), ErrorCause::Network);
        assert_eq!(Error::Timeout("x".into()).cause(), ErrorCause::Network);
        assert_eq!(Error::format("x").cause(), ErrorCause::Format);
        assert_eq!(
            Error::InvalidIdentifier("x".into()).cause(),
            ErrorCause::Availability
        );
        assert_eq!(Error::storage("x").cause(), ErrorCause::Other);
    }

    #[test]
    fn test_user_messages_are_terse() {
        let msg = Error::Timeout("Torrent metadata".into()).user_message();
        assert_eq!(msg, "Torrent metadata took too long, try again later");
        assert!(Error::network("dns").user_message().starts_with("Network error"));
    }
}
