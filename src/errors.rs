use thiserror::Error;

/// Fatal failure classes for one image pipeline run.
///
/// Parse failures never show up here: the analyzer and estimator degrade to
/// sentinel values instead of erroring. Everything below aborts the run and is
/// reported to the user as a single apology message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}
