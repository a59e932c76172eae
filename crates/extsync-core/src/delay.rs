//! Delayed startup of extensions that carry a delay profile.

use crate::cancel::CancellationToken;
use crate::host::ExtensionHost;
use crate::registry::RegistryState;
use crate::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const CANCEL_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedStart {
    pub id: String,
    pub seconds: u64,
}

/// Enabled records with a known delay profile, soonest first.
pub fn plan_delayed_startup(state: &RegistryState) -> Vec<DelayedStart> {
    let mut plan: Vec<DelayedStart> = state
        .extensions
        .iter()
        .filter(|r| r.enabled)
        .filter_map(|record| {
            let profile_id = record.delay_profile_id.as_deref()?;
            let Some(profile) = state.delays.iter().find(|d| d.id == profile_id) else {
                debug!("{} references unknown delay profile {}", record.id, profile_id);
                return None;
            };
            Some(DelayedStart {
                id: record.id.clone(),
                seconds: profile.seconds,
            })
        })
        .collect();
    plan.sort_by(|a, b| a.seconds.cmp(&b.seconds).then_with(|| a.id.cmp(&b.id)));
    plan
}

/// Enable each planned extension once its delay has elapsed.
///
/// Delays are measured from the call. Returns the ids that were enabled;
/// cancellation stops the run between waits with `Cancelled`.
pub async fn run_delayed_startup(
    host: &dyn ExtensionHost,
    plan: &[DelayedStart],
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let start = Instant::now();
    let mut started = Vec::new();

    for entry in plan {
        let deadline = start + Duration::from_secs(entry.seconds);
        loop {
            cancel.check()?;
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(CANCEL_POLL)).await;
        }
        cancel.check()?;

        match host.enable(&entry.id).await {
            Ok(()) => {
                info!("Started {} after {}s delay", entry.id, entry.seconds);
                started.push(entry.id.clone());
            }
            Err(e) => warn!("Failed to start delayed extension {}: {}", entry.id, e),
        }
    }
    Ok(started)
}
