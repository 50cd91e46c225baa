//! Machine reconciliation: connectivity test and readiness conditions.

use super::Reconciler;
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::probe;
use crds::{CONDITION_AVAILABLE, CONDITION_READY, ConditionLedger, ConditionStatus, MachineStatus};
use kube::Resource;
use kube::runtime::events::EventType;
use kube_runtime::controller::Action;
use resource_store::IgnoreNotFound;
use tracing::{debug, error, info, warn};

impl Reconciler {
    /// Probes the Machine's endpoint and records `Available` and `Ready`.
    ///
    /// A failed probe is returned as
    /// [`ControllerError::ConnectivityTestFailed`] after the conditions are
    /// written, so the Machine is retried after the configured delay.
    pub async fn reconcile_machine(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let Some(mut machine) = self.machines.get(namespace, name).await.ignore_not_found()? else {
            debug!("Machine {}/{} no longer exists", namespace, name);
            return Ok(Action::await_change());
        };

        let generation = machine.metadata.generation.unwrap_or_default();
        let object_ref = machine.object_ref(&());
        let endpoint = machine.spec.endpoint(self.settings.default_port);
        let mut ledger = ConditionLedger::from_conditions(
            machine.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default(),
        );

        let probe_result = probe::tcp_connect(&endpoint, self.settings.probe_timeout).await;
        match &probe_result {
            Ok(()) => {
                debug!("Machine {}/{} reachable at {}", namespace, name, endpoint);
                ledger.upsert(
                    CONDITION_AVAILABLE,
                    ConditionStatus::True,
                    reasons::CONNECTIVITY_TEST_SUCCEEDED,
                    "Connectivity test succeeded",
                    generation,
                );
            }
            Err(e) => {
                warn!("Machine {}/{} unreachable: {}", namespace, name, e);
                let message = e.to_string();
                ledger.upsert(
                    CONDITION_AVAILABLE,
                    ConditionStatus::False,
                    reasons::CONNECTIVITY_TEST_FAILED,
                    &message,
                    generation,
                );
                self.machine_events
                    .publish(
                        &object_ref,
                        EventType::Warning,
                        reasons::CONNECTIVITY_TEST_FAILED,
                        actions::PROBE,
                        Some(message),
                    )
                    .await;
            }
        }

        let available = ledger
            .get(CONDITION_AVAILABLE)
            .is_some_and(|c| c.status == ConditionStatus::True);
        if available {
            ledger.upsert(CONDITION_READY, ConditionStatus::True, reasons::READY, "All checks passed", generation);
        } else {
            ledger.upsert(
                CONDITION_READY,
                ConditionStatus::False,
                reasons::CHECKS_FAILED,
                "One or more checks failed",
                generation,
            );
            self.machine_events
                .publish(
                    &object_ref,
                    EventType::Warning,
                    reasons::UNREADY,
                    actions::EVALUATE,
                    Some("One or more checks failed".to_string()),
                )
                .await;
        }

        machine.status = Some(MachineStatus {
            conditions: ledger.into_conditions(),
        });
        match self.machines.update_status(&machine).await {
            Ok(_) => info!("Machine {}/{} ready={}", namespace, name, available),
            Err(e) => error!("Failed to update status of Machine {}/{}: {}", namespace, name, e),
        }

        match probe_result {
            Ok(()) => Ok(Action::await_change()),
            Err(e) => Err(ControllerError::ConnectivityTestFailed {
                endpoint,
                message: e.to_string(),
                retry_after: self.settings.retry_after,
            }),
        }
    }
}
