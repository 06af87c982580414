/*!
 * Pipeline Stages
 * One `impl FoldPipeline` block per stage
 */

mod analyze;
mod enrich;
mod fold;
mod persist;
mod resolve;
mod summarize;

pub use persist::{write_atomic, METADATA_FILE};

use super::types::{StageError, StageResult};
use crate::collaborators::{CollabError, CollabResult};
use crate::signals::CancelToken;
use std::future::Future;
use std::time::Duration;

/// Await a collaborator call under the stage-local timeout, giving up early
/// on cancellation. `wrap` turns the collaborator's message into the stage's
/// error kind.
pub(super) async fn bounded<T, F>(
    collaborator: &str,
    limit: Duration,
    cancel: &CancelToken,
    wrap: fn(String) -> StageError,
    call: F,
) -> StageResult<T>
where
    F: Future<Output = CollabResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StageError::Cancelled),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(wrap(e.to_string())),
            Err(_) => Err(wrap(
                CollabError::Timeout {
                    collaborator: collaborator.to_string(),
                    secs: limit.as_secs(),
                }
                .to_string(),
            )),
        },
    }
}
