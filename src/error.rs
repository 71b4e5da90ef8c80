//! Custom error types for the application.
//!
//! `ScanError` is the single error type of the playback engine. It covers
//! the panel model (type mismatches, duplicates, full panels), lookups of
//! unknown channels and panels, illegal mode transitions, configuration
//! problems and transport failures from `scan-client`.
//!
//! Fetch failures during a running session never surface as `ScanError`:
//! they are classified and absorbed by the session (see
//! [`scan_client::FailureClass`]). `ScanError` is returned only from
//! explicit setup and command calls.

use thiserror::Error;

use crate::model::ChannelKind;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ScanError {
    #[error("Channel '{channel}' is {found:?} but panel holds {expected:?} channels")]
    TypeMismatch {
        channel: String,
        expected: ChannelKind,
        found: ChannelKind,
    },

    #[error("Channel '{0}' is already in this panel")]
    DuplicateChannel(String),

    #[error("Panel already holds its single {0:?} channel")]
    PanelFull(ChannelKind),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown panel: {0}")]
    UnknownPanel(usize),

    #[error("Cannot switch from {from} to {to} without pausing first")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Client error: {0}")]
    Client(#[from] scan_client::ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ScanError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_message_names_both_kinds() {
        let err = ScanError::TypeMismatch {
            channel: "Src/cam.jpg".to_string(),
            expected: ChannelKind::Numeric,
            found: ChannelKind::Image,
        };
        let msg = err.to_string();
        assert!(msg.contains("Src/cam.jpg"));
        assert!(msg.contains("Image"));
        assert!(msg.contains("Numeric"));
    }

    #[test]
    fn client_errors_convert() {
        let client = scan_client::ClientError::InvalidResponse("empty".into());
        let err: ScanError = client.into();
        assert!(matches!(err, ScanError::Client(_)));
    }

    #[test]
    fn configuration_message() {
        let err = ScanError::Configuration("window must be positive".into());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: window must be positive"
        );
    }
}
