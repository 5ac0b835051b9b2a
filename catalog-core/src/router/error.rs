//! Router error types

use thiserror::Error;

use crate::store::{Area, EditorScope, StoreError};

/// Errors raised while routing an operation to its store
///
/// `ReadOnly` and `ScopeDenied` are raised before any connection is taken.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Write attempted while the target store is read-only
    #[error("Read-only session: {op} cannot write to {area}")]
    ReadOnly { op: &'static str, area: Area },

    /// Write outside the session's editor scope
    #[error(
        "Editor scope denied. Session: {}. Operation {op} is allowed only for {}",
        .session.label(),
        .required.label()
    )]
    ScopeDenied {
        op: &'static str,
        session: EditorScope,
        required: Area,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// SQLite error raised by the dispatched operation
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl RouterError {
    /// Permission failures, as opposed to lookup or storage failures
    pub fn is_permission(&self) -> bool {
        matches!(self, RouterError::ReadOnly { .. } | RouterError::ScopeDenied { .. })
    }
}

pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_denied_message_uses_labels() {
        let err = RouterError::ScopeDenied {
            op: "create_material",
            session: EditorScope::Area(Area::Normati),
            required: Area::Materiali,
        };
        let text = err.to_string();
        assert!(text.contains("create_material"));
        assert!(text.contains(Area::Materiali.label()));
        assert!(err.is_permission());
    }
}
