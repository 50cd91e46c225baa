//! Lease-based leader election.
//!
//! Only the holder of the `coordination.k8s.io/v1` Lease runs the
//! controllers. Every write carries the resourceVersion it was decided on,
//! so replicas racing for an expired lease cannot both win: the loser gets
//! 409 Conflict and keeps waiting.

use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::Client;
use kube::api::{Api, PostParams};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A holder that has not renewed for this long loses the lease.
pub const LEASE_DURATION: Duration = Duration::from_secs(15);

const RENEW_INTERVAL: Duration = Duration::from_secs(5);
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// What a replica may do with the lease it observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseAction {
    /// No lease exists yet
    Create,
    /// The replica already holds the lease
    Renew,
    /// The lease is released or expired
    TakeOver,
    /// Another replica holds a live lease
    Wait,
}

/// Decides what `identity` may do with `lease` at `now`.
pub fn lease_action(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> LeaseAction {
    let Some(lease) = lease else {
        return LeaseAction::Create;
    };
    let spec = lease.spec.as_ref();
    match spec.and_then(|s| s.holder_identity.as_deref()) {
        Some(holder) if holder == identity => LeaseAction::Renew,
        None | Some("") => LeaseAction::TakeOver,
        Some(_) if is_expired(spec, now) => LeaseAction::TakeOver,
        Some(_) => LeaseAction::Wait,
    }
}

fn is_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    match spec.map(|s| (&s.renew_time, s.lease_duration_seconds)) {
        Some((Some(MicroTime(renewed)), Some(seconds))) => now > *renewed + chrono::Duration::seconds(i64::from(seconds)),
        _ => true,
    }
}

/// Lease spec written when `identity` creates, renews or takes over a lease
/// whose current spec is `previous`.
fn held_spec(previous: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>, duration: Duration) -> LeaseSpec {
    let renewing = previous.and_then(|s| s.holder_identity.as_deref()) == Some(identity);
    let transitions = previous.and_then(|s| s.lease_transitions).unwrap_or(0);

    LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)),
        acquire_time: if renewing {
            previous.and_then(|s| s.acquire_time.clone())
        } else {
            Some(MicroTime(now))
        },
        renew_time: Some(MicroTime(now)),
        lease_transitions: Some(if renewing || previous.is_none() {
            transitions
        } else {
            transitions.saturating_add(1)
        }),
        ..Default::default()
    }
}

/// Acquires and renews the operator's Lease.
pub struct LeaderElector {
    api: Api<Lease>,
    name: String,
    identity: String,
}

impl LeaderElector {
    /// Creates an elector for lease `name` in `namespace`, competing as
    /// `identity`.
    pub fn new(client: Client, namespace: &str, name: &str, identity: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            identity: identity.to_string(),
        }
    }

    /// One acquire-or-renew round. `Ok(true)` while this replica holds the
    /// lease.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, ControllerError> {
        let now = Utc::now();
        let existing = match self.api.get(&self.name).await {
            Ok(lease) => Some(lease),
            Err(kube::Error::Api(ae)) if ae.code == 404 => None,
            Err(e) => return Err(e.into()),
        };

        let action = lease_action(existing.as_ref(), &self.identity, now);
        if action == LeaseAction::Wait {
            return Ok(false);
        }
        let spec = held_spec(
            existing.as_ref().and_then(|l| l.spec.as_ref()),
            &self.identity,
            now,
            LEASE_DURATION,
        );

        let result = match existing {
            Some(mut lease) => {
                // metadata still carries the resourceVersion the action was decided on
                lease.spec = Some(spec);
                self.api.replace(&self.name, &PostParams::default(), &lease).await
            }
            None => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.name.clone()),
                        ..Default::default()
                    },
                    spec: Some(spec),
                };
                self.api.create(&PostParams::default(), &lease).await
            }
        };

        match result {
            Ok(_) => {
                if action == LeaseAction::Renew {
                    debug!(identity = %self.identity, "Lease {} renewed", self.name);
                } else {
                    info!(identity = %self.identity, "Acquired lease {} ({:?})", self.name, action);
                }
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(identity = %self.identity, "Lease {} changed concurrently", self.name);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Waits until this replica holds the lease.
    pub async fn acquire(&self) {
        info!(identity = %self.identity, "Waiting for leadership of lease {}", self.name);
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => return,
                Ok(false) => debug!(identity = %self.identity, "Lease {} held by another replica", self.name),
                Err(e) => warn!(identity = %self.identity, "Failed to acquire lease {}: {}", self.name, e),
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Renews the lease until it is lost and returns why.
    ///
    /// API errors are tolerated until the lease would have expired.
    pub async fn hold(&self) -> ControllerError {
        let mut renewed = Instant::now();
        loop {
            tokio::time::sleep(RENEW_INTERVAL).await;
            match self.try_acquire_or_renew().await {
                Ok(true) => renewed = Instant::now(),
                Ok(false) => {
                    return ControllerError::LeadershipLost(format!("lease {} taken by another replica", self.name));
                }
                Err(e) if renewed.elapsed() >= LEASE_DURATION => {
                    return ControllerError::LeadershipLost(format!("lease {} not renewed: {}", self.name, e));
                }
                Err(e) => warn!(identity = %self.identity, "Failed to renew lease {}: {}", self.name, e),
            }
        }
    }

    /// Clears the holder so a standby takes over without waiting for the
    /// lease to expire.
    pub async fn release(&self) -> Result<(), ControllerError> {
        let mut lease = match self.api.get(&self.name).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let Some(spec) = lease.spec.as_mut() else {
            return Ok(());
        };
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            return Ok(());
        }
        spec.holder_identity = None;
        self.api.replace(&self.name, &PostParams::default(), &lease).await?;
        info!(identity = %self.identity, "Released lease {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn lease(holder: Option<&str>, renewed: i64) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some("talos-operator-leader".to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: holder.map(ToString::to_string),
                lease_duration_seconds: Some(15),
                acquire_time: Some(MicroTime(at(0))),
                renew_time: Some(MicroTime(at(renewed))),
                lease_transitions: Some(3),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_missing_lease_is_created() {
        assert_eq!(lease_action(None, "operator-a", at(0)), LeaseAction::Create);
    }

    #[test]
    fn test_own_lease_is_renewed() {
        let lease = lease(Some("operator-a"), 0);
        assert_eq!(lease_action(Some(&lease), "operator-a", at(60)), LeaseAction::Renew);
    }

    #[test]
    fn test_live_foreign_lease_is_respected() {
        let lease = lease(Some("operator-b"), 0);

        assert_eq!(lease_action(Some(&lease), "operator-a", at(10)), LeaseAction::Wait);
        assert_eq!(lease_action(Some(&lease), "operator-a", at(15)), LeaseAction::Wait);
        assert_eq!(lease_action(Some(&lease), "operator-a", at(16)), LeaseAction::TakeOver);
    }

    #[test]
    fn test_released_lease_is_taken_over() {
        let released = lease(None, 0);
        let blank = lease(Some(""), 0);

        assert_eq!(lease_action(Some(&released), "operator-a", at(1)), LeaseAction::TakeOver);
        assert_eq!(lease_action(Some(&blank), "operator-a", at(1)), LeaseAction::TakeOver);
    }

    #[test]
    fn test_lease_without_timing_is_expired() {
        let mut lease = lease(Some("operator-b"), 0);
        if let Some(spec) = lease.spec.as_mut() {
            spec.renew_time = None;
        }
        assert_eq!(lease_action(Some(&lease), "operator-a", at(1)), LeaseAction::TakeOver);
    }

    #[test]
    fn test_renewal_keeps_acquire_time_and_transitions() {
        let previous = lease(Some("operator-a"), 5);
        let spec = held_spec(previous.spec.as_ref(), "operator-a", at(10), LEASE_DURATION);

        assert_eq!(spec.acquire_time, Some(MicroTime(at(0))));
        assert_eq!(spec.renew_time, Some(MicroTime(at(10))));
        assert_eq!(spec.lease_transitions, Some(3));
        assert_eq!(spec.lease_duration_seconds, Some(15));
    }

    #[test]
    fn test_takeover_counts_a_transition() {
        let previous = lease(Some("operator-b"), 0);
        let spec = held_spec(previous.spec.as_ref(), "operator-a", at(30), LEASE_DURATION);

        assert_eq!(spec.holder_identity.as_deref(), Some("operator-a"));
        assert_eq!(spec.acquire_time, Some(MicroTime(at(30))));
        assert_eq!(spec.lease_transitions, Some(4));
    }

    #[test]
    fn test_first_holder_starts_at_zero_transitions() {
        let spec = held_spec(None, "operator-a", at(0), LEASE_DURATION);
        assert_eq!(spec.lease_transitions, Some(0));
    }
}
