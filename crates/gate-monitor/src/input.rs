//! Reading replay input from a file or stdin.

use anyhow::{Context, Result};
use recovery::{RecoveryManager, RetryPolicy};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Read the whole input. File reads are retried per `policy`.
pub async fn read_input(path: Option<&Path>, policy: &RetryPolicy) -> Result<String> {
    let Some(path) = path else {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read snapshots from stdin")?;
        return Ok(buf);
    };

    let mut recovery = RecoveryManager::<io::Error>::new();
    recovery.register_fallback_recovery(move |err, attempt| {
        warn!(attempt, error = %err, "Snapshot file unreadable, will retry");
        Ok(())
    });

    recovery
        .execute_with_recovery(policy, || tokio::fs::read_to_string(path))
        .await
        .with_context(|| format!("failed to read snapshots from {}", path.display()))
}
