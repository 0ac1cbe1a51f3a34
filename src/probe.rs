//! Capability prober: which backends could run right now.
//!
//! Read-only. The orchestrator performs its own availability check per
//! attempt, so nothing here ever gates a conversion.

use crate::backend::{Availability, BackendRegistry};
use crate::error::FailureReason;
use serde::Serialize;
use std::collections::BTreeMap;

/// Availability of one registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub priority: u32,
    pub available: bool,
    /// Why the backend is unavailable; `None` when it is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

/// Backend name → availability.
pub async fn probe(registry: &BackendRegistry) -> BTreeMap<String, bool> {
    probe_detailed(registry)
        .await
        .into_iter()
        .map(|s| (s.name, s.available))
        .collect()
}

/// Full status per backend, in priority order. The checks run concurrently.
pub async fn probe_detailed(registry: &BackendRegistry) -> Vec<BackendStatus> {
    let checks = registry.iter().map(|d| async move {
        let (available, reason) = match d.backend.availability().await {
            Availability::Available => (true, None),
            Availability::Unavailable(reason) => (false, Some(reason)),
        };
        BackendStatus {
            name: d.name.clone(),
            priority: d.priority,
            available,
            reason,
        }
    });
    futures::future::join_all(checks).await
}

/// `"1 of 2 backends available (soffice)"`, for start-up logs.
pub fn summary(statuses: &[BackendStatus]) -> String {
    let up: Vec<&str> = statuses
        .iter()
        .filter(|s| s.available)
        .map(|s| s.name.as_str())
        .collect();
    let mut line = format!("{} of {} backends available", up.len(), statuses.len());
    if !up.is_empty() {
        line.push_str(&format!(" ({})", up.join(", ")));
    }
    line
}
