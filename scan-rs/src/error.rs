//! Errors surfaced at the boundary of each analysis stage

use thiserror::Error;

/// Failure of an ingestion, preprocessing, differential expression or plotting stage. The
/// message is meant to be shown to the analyst as is.
#[derive(Error, Debug)]
pub enum StageError {
    /// The input could not be parsed as an annotated expression matrix
    #[error("Could not read the uploaded dataset: {0}")]
    MalformedInput(String),

    /// An earlier stage has not been run yet
    #[error("{0}")]
    MissingPrerequisite(String),

    /// A user-chosen parameter does not fit the dataset
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A numeric step failed on the data at hand
    #[error("Analysis failed: {0}")]
    Computation(String),
}

impl StageError {
    /// Wrap an internal error as a malformed input, keeping its whole context chain.
    pub fn malformed(err: anyhow::Error) -> StageError {
        StageError::MalformedInput(format!("{:#}", err))
    }

    /// Wrap an internal error as a computation failure, keeping its whole context chain.
    pub fn computation(err: anyhow::Error) -> StageError {
        StageError::Computation(format!("{:#}", err))
    }
}

/// Result of a stage entry point
pub type StageResult<T> = Result<T, StageError>;

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::{format_err, Context};

    #[test]
    fn test_context_is_kept() {
        let err: anyhow::Result<()> = Err(format_err!("no X")).context("parsing h5ad");
        let msg = StageError::malformed(err.unwrap_err()).to_string();
        assert_eq!(msg, "Could not read the uploaded dataset: parsing h5ad: no X");
    }

    #[test]
    fn test_prerequisite_message() {
        let err = StageError::MissingPrerequisite("Please upload a dataset first".into());
        assert_eq!(err.to_string(), "Please upload a dataset first");
    }
}
