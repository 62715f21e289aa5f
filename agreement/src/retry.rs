use std::future::Future;

use labrpc::{anyhow, log::warn, NodeId};

use crate::RoundError;

/// Run one RPC up to `attempts` times, stopping at the first answer.
///
/// Only transport failures are retried; an answer, whatever it says, ends the loop.
pub(crate) async fn with_retries<T, F, Fut>(
    node: NodeId,
    method: &str,
    attempts: usize,
    mut call: F,
) -> Result<T, RoundError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut reason = String::new();
    for attempt in 1..=attempts {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!(
                    "{} to node {} failed ({}/{}): {}",
                    method, node, attempt, attempts, e
                );
                reason = e.to_string();
            }
        }
    }
    Err(RoundError::RemoteUnavailable { node, reason })
}
