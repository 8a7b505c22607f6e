//! Pipeline-level errors for a recap run.

use thiserror::Error;

use crate::data::{NeedKind, ProviderError};

/// Why one source tier produced nothing usable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TierFailure {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("no usable records")]
    Empty,

    #[error("no client registered for {0}")]
    NoClient(&'static str),
}

/// Errors surfaced by the recap pipeline.
#[derive(Debug, Error)]
pub enum RecapError {
    /// Both primary and fallback were exhausted
    #[error("No data available for {need} (primary: {primary}; fallback: {fallback})")]
    NoDataAvailable {
        need: String,
        primary: TierFailure,
        fallback: TierFailure,
    },

    /// A stage the report cannot do without failed
    #[error("Stage `{stage}` failed: {source}")]
    StageFailed {
        stage: NeedKind,
        #[source]
        source: Box<RecapError>,
    },
}

impl RecapError {
    /// The stage that aborted the run, if this is a stage failure.
    pub fn failed_stage(&self) -> Option<NeedKind> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn stage(stage: NeedKind, source: RecapError) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stage_failure_names_stage() {
        let inner = RecapError::NoDataAvailable {
            need: "sector_list".into(),
            primary: TierFailure::Provider(ProviderError::Timeout(Duration::from_secs(15))),
            fallback: TierFailure::Empty,
        };
        let err = RecapError::stage(NeedKind::SectorList, inner);
        assert_eq!(err.failed_stage(), Some(NeedKind::SectorList));
        let msg = err.to_string();
        assert!(msg.starts_with("Stage `sector_list` failed"));
        assert!(msg.contains("fallback: no usable records"));
    }
}
