//! Short user-facing messages. How they are shown is up to the front end;
//! this only fixes their content, severity and lifetime.

use std::fmt;
use std::time::Duration;

use crate::error::{CodecError, Error, SessionError, ValidationError};
use crate::report::size_change;
use crate::session::ResultStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    /// How long a notification stays up before it is dismissed.
    pub const DISPLAY_FOR: Duration = Duration::from_secs(3);
    /// Length of the enter/leave animation.
    pub const TRANSITION: Duration = Duration::from_millis(300);

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn download_started(file_name: &str) -> Self {
        Self::success(format!("Download of {} has started", file_name))
    }

    pub fn compressed(stats: &ResultStats) -> Self {
        Self::success(format!(
            "Compression finished: {}",
            size_change(stats.reduction_percent)
        ))
    }
}

impl From<&ValidationError> for Notification {
    fn from(e: &ValidationError) -> Self {
        match e {
            ValidationError::WrongType { .. } => Self::error("Please upload a PDF file"),
            ValidationError::TooLarge { .. } => Self::error("File size cannot exceed 50MB"),
        }
    }
}

impl From<&SessionError> for Notification {
    fn from(e: &SessionError) -> Self {
        Self::error(e.to_string())
    }
}

impl From<&CodecError> for Notification {
    fn from(_: &CodecError) -> Self {
        Self::error("PDF compression failed, please try again")
    }
}

impl From<&Error> for Notification {
    fn from(e: &Error) -> Self {
        match e {
            Error::Validation(e) => e.into(),
            Error::Session(e) => e.into(),
            Error::Codec(e) => e.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}
