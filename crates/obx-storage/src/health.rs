//! Storage reachability check

use opendal::Operator;

use obx_core::{ObxError, ObxResult};

/// List the container prefix. Succeeds on an empty or not-yet-created
/// container; fails on bad credentials or an unreachable endpoint.
pub async fn check_health(op: &Operator, container: &str) -> ObxResult<()> {
    let prefix = format!("{}/", container.trim_matches('/'));
    op.list(&prefix)
        .await
        .map(|_| ())
        .map_err(|e| ObxError::Storage(format!("storage health check failed: {e}")))
}
