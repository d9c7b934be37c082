//! Errors surfaced when a deferred module is forced.

use crate::ir::Location;
use thiserror::Error;

/// A deferred module whose content could not be turned into a [`Module`].
///
/// `message` carries the full context chain of the underlying reader error.
///
/// [`Module`]: crate::ir::Module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("{loc}: invalid binary module: {message}")]
    Binary { loc: Location, message: String },

    #[error("{loc}: invalid text module: {message}")]
    Text { loc: Location, message: String },
}

impl ReadError {
    pub(crate) fn binary(loc: &Location, err: &anyhow::Error) -> Self {
        ReadError::Binary {
            loc: loc.clone(),
            message: format!("{:#}", err),
        }
    }

    pub(crate) fn text(loc: &Location, err: &anyhow::Error) -> Self {
        ReadError::Text {
            loc: loc.clone(),
            message: format!("{:#}", err),
        }
    }

    /// Location of the module that failed to read.
    pub fn loc(&self) -> &Location {
        match self {
            ReadError::Binary { loc, .. } | ReadError::Text { loc, .. } => loc,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ReadError::Binary { message, .. } | ReadError::Text { message, .. } => message,
        }
    }
}
