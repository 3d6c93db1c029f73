use storecore_infra::DispatchError;

/// Bounded retry for optimistic concurrency conflicts.
///
/// A lost append race is transient: the losing command reloads the stream and
/// re-decides against the fresh state. Deterministic failures (validation,
/// insufficient stock) are returned immediately. After the budget is spent the
/// conflict surfaces to the caller, who may retry the whole request.
pub(crate) const MAX_CONFLICT_RETRIES: usize = 3;

pub(crate) fn with_conflict_retry<T>(
    mut op: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(DispatchError::Concurrency(msg)) if attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                tracing::debug!(attempt, %msg, "append conflict, retrying");
            }
            other => return other,
        }
    }
}

/// Unbounded conflict retry for release appends.
///
/// A release is always semantically valid on a registered unit, so the only
/// repeatable failure mode is losing append races under contention. By the
/// time a release runs, the destructive write it compensates (line removal,
/// cart clear, order cancel) is already committed; giving up would leave
/// stock permanently decremented. Deterministic failures still surface
/// immediately.
pub(crate) fn with_release_retry<T>(
    mut op: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let mut attempt: u64 = 0;
    loop {
        match op() {
            Err(DispatchError::Concurrency(msg)) => {
                attempt += 1;
                tracing::debug!(attempt, %msg, "release append conflict, retrying");
            }
            other => return other,
        }
    }
}
