//! Host port reconciliation
//!
//! Each cycle recomputes the complete desired ruleset from the runtime,
//! fingerprints it, and replaces the nftables table only when the
//! fingerprint differs from the last one applied.

mod fingerprint;
mod r#loop;


pub use fingerprint::{ChangeDetector, Fingerprint};
pub use r#loop::{Connection, ReconcileConfig, Reconciler, ReconcilerBuilder, TickOutcome};

use crate::error::{ReconcileError, ReconcileResult};
use crate::nft::{sort_containers, Ruleset, RulesetBuilder};
use crate::ports::extract_entries;
use crate::runtime::RuntimeService;
use std::time::Duration;
use tracing::error;

/// Query the runtime and render the desired ruleset.
///
/// Every runtime query of the cycle shares `deadline`. The first failing
/// container aborts the whole computation.
pub async fn desired_ruleset(
    runtime: &dyn RuntimeService,
    deadline: Duration,
) -> ReconcileResult<Ruleset> {
    tokio::time::timeout(deadline, build_ruleset(runtime))
        .await
        .map_err(|_| ReconcileError::DeadlineExceeded(deadline))?
}

async fn build_ruleset(runtime: &dyn RuntimeService) -> ReconcileResult<Ruleset> {
    let mut containers = runtime.list_containers().await.map_err(|e| {
        error!(error = %e, "Failed to list containers");
        e
    })?;

    sort_containers(&mut containers);

    let mut builder = RulesetBuilder::new();
    for container in &containers {
        builder.extend(extract_entries(runtime, container).await?);
    }

    Ok(builder.build())
}
