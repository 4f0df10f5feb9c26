//! Broadcast fan-out
//!
//! One send per target, all awaited together. A failing target never stops
//! the others from being collected; the report always has one entry per
//! distinct target.

use super::router::MessagingRouter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Per-target outcome of a broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Delivered { response: String },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub results: BTreeMap<String, DeliveryOutcome>,
}

impl BroadcastReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn get(&self, target_id: &str) -> Option<&DeliveryOutcome> {
        self.results.get(target_id)
    }
}

pub struct BroadcastCoordinator {
    router: Arc<MessagingRouter>,
}

impl BroadcastCoordinator {
    pub fn new(router: Arc<MessagingRouter>) -> Self {
        Self { router }
    }

    /// Send to every target and wait for all of them to settle.
    ///
    /// `targets` defaults to the registry's active agents. Duplicate ids are
    /// sent to once.
    pub async fn broadcast(&self, content: &str, from_id: &str, targets: Option<Vec<String>>) -> BroadcastReport {
        let targets = match targets {
            Some(targets) => targets,
            None => self.router.registry().active_ids().await,
        };
        let mut seen = HashSet::new();
        let targets: Vec<String> = targets.into_iter().filter(|t| seen.insert(t.clone())).collect();

        let sends = targets.iter().map(|target| async move {
            let outcome = match self.router.send_message(target, content, from_id).await {
                Ok(delivery) => DeliveryOutcome::Delivered { response: delivery.response },
                Err(e) => DeliveryOutcome::Failed { reason: e.to_string() },
            };
            (target.clone(), outcome)
        });
        let results: BTreeMap<_, _> = futures::future::join_all(sends).await.into_iter().collect();

        let report = BroadcastReport { results };
        info!("Broadcast from {}: {}/{} delivered", from_id, report.succeeded(), report.total());
        report
    }
}
