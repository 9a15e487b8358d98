//! Error types for tweetload

use thiserror::Error;

/// Result type alias for tweetload operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for tweetload
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row file error: {0}")]
    RowFile(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A load task failed; the tier it belongs to and every later tier were not run.
    #[error("Merge of table '{table}' failed in tier {tier}: {reason}")]
    MergeFailed {
        tier: u8,
        table: String,
        reason: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether re-running the same stage can be expected to make progress.
    ///
    /// Every load is idempotent, so merge failures are always safe to retry once
    /// the underlying cause is fixed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::MergeFailed { .. } | IngestError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_failed_message_names_tier_and_table() {
        let err = IngestError::MergeFailed {
            tier: 2,
            table: "tweets".to_string(),
            reason: "duplicate column".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Merge of table 'tweets' failed in tier 2: duplicate column"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_file_error_not_retryable() {
        assert!(!IngestError::RowFile("bad width".into()).is_retryable());
        assert!(!IngestError::UnknownTable("retweets".into()).is_retryable());
    }
}
