use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A selector segment does not exist in the snapshot.
    ///
    /// Never surfaced as a hard failure: reads degrade to `None`, writes
    /// to a no-op.
    #[error("no property '{segment}' for selector '{selector}'")]
    PathNotFound { selector: String, segment: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A store accessor was used outside the scope of its provider.
    #[error("store not found: accessor used outside of its provider")]
    MissingContext,

    #[error("value contains a reference cycle")]
    Cycle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_not_found_display() {
        let err = StoreError::PathNotFound {
            selector: "a.b.c".into(),
            segment: "b".into(),
        };
        assert_eq!(err.to_string(), "no property 'b' for selector 'a.b.c'");
    }

    #[test]
    fn invalid_pattern_display() {
        let err = StoreError::InvalidPattern {
            pattern: "a.**.b".into(),
            reason: "`**` must be the last token".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid pattern 'a.**.b': `**` must be the last token"
        );
    }

    #[test]
    fn missing_context_display() {
        assert!(StoreError::MissingContext.to_string().starts_with("store not found"));
    }
}
