//! Job lifecycle types.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input file kind for import jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Comma-separated values, optionally with a header row.
    Csv,
    /// A single top-level JSON array of objects (or newline-separated
    /// objects when the job says so).
    Json,
}

impl FileKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Parses a kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of one import job.
///
/// The happy path is `Configuring → Streaming → MappingPushed → Flushing
/// → Done`; `Failed` is terminal and reachable from every non-`Done`
/// state. Failure always triggers staging cleanup before the error
/// surfaces to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Resolving and verifying configuration; no I/O yet.
    Configuring,
    /// Splitting the input and staging validated chunks.
    Streaming,
    /// All input consumed; schema mapping pushed to the store.
    MappingPushed,
    /// Replaying staged chunks to the store.
    Flushing,
    /// All chunks written and staging cleaned up.
    Done,
    /// Aborted; staging cleanup attempted.
    Failed,
}

impl JobState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuring => "configuring",
            Self::Streaming => "streaming",
            Self::MappingPushed => "mapping_pushed",
            Self::Flushing => "flushing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true once the job can no longer change state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Advances to `to`, rejecting transitions the lifecycle does not
    /// allow.
    pub fn transition(&mut self, to: Self) -> Result<()> {
        let allowed = match (*self, to) {
            (Self::Configuring, Self::Streaming)
            | (Self::Streaming, Self::MappingPushed)
            | (Self::MappingPushed, Self::Flushing)
            | (Self::Flushing, Self::Done) => true,
            (from, Self::Failed) => !matches!(from, Self::Done),
            _ => false,
        };
        if allowed {
            *self = to;
            Ok(())
        } else {
            Err(Error::InvalidState {
                state: self.as_str().to_string(),
                action: format!("transition to {}", to.as_str()),
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a completed import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Unique job id (also names the staging directory).
    pub job_id: String,
    /// Target table.
    pub table_name: String,
    /// Number of staged chunks replayed to the store.
    pub chunk_count: usize,
    /// Number of records written.
    pub record_count: usize,
    /// Terminal state; always `done` for a returned summary.
    pub state: JobState,
}

/// Result of a completed export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Number of documents serialized to the output.
    pub documents: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = JobState::Configuring;
        for next in [
            JobState::Streaming,
            JobState::MappingPushed,
            JobState::Flushing,
            JobState::Done,
        ] {
            state.transition(next).unwrap();
        }
        assert_eq!(state, JobState::Done);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failure_reachable_from_any_non_done_state() {
        for from in [
            JobState::Configuring,
            JobState::Streaming,
            JobState::MappingPushed,
            JobState::Flushing,
            JobState::Failed,
        ] {
            let mut state = from;
            state.transition(JobState::Failed).unwrap();
            assert_eq!(state, JobState::Failed);
        }
    }

    #[test]
    fn test_done_is_final() {
        let mut state = JobState::Done;
        assert!(state.transition(JobState::Failed).is_err());
        assert!(state.transition(JobState::Streaming).is_err());
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut state = JobState::Configuring;
        let err = state.transition(JobState::Flushing).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(state, JobState::Configuring);
    }

    #[test]
    fn test_file_kind_parse() {
        assert_eq!(FileKind::parse("CSV"), Some(FileKind::Csv));
        assert_eq!(FileKind::parse("json"), Some(FileKind::Json));
        assert_eq!(FileKind::parse("parquet"), None);
    }
}
