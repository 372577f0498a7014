// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status reconciliation.
//!
//! Applies an agent's status report to the persisted deployment model.
//! Command-originated transitions own a deployment's status while one is in
//! flight: a report can never overwrite a transient state. Route toggles are
//! collected across the batch so the proxy reloads at most once per report.

use std::sync::Arc;

use tracing::{debug, warn};

use fleet_core::{AppReport, Clock, DeploymentStatus, ServerId, UiEvent};
use fleet_storage::{RepoError, Repository};
use fleet_wire::StatusReport;

use crate::event_bus::EventBus;
use crate::locks::MutexRegistry;
use crate::proxy::ProxyController;

#[derive(Clone)]
pub struct StatusReconciler {
    repo: Arc<dyn Repository>,
    locks: MutexRegistry,
    bus: EventBus,
    proxy: Arc<dyn ProxyController>,
    clock: Arc<dyn Clock>,
}

impl StatusReconciler {
    pub fn new(
        repo: Arc<dyn Repository>,
        locks: MutexRegistry,
        bus: EventBus,
        proxy: Arc<dyn ProxyController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, locks, bus, proxy, clock }
    }

    /// Apply one status report.
    pub async fn apply(&self, server_id: &ServerId, report: StatusReport) -> Result<(), RepoError> {
        // Server-level fields first; single row, no mutex needed.
        self.repo
            .server_update_metrics(
                server_id,
                report.metrics.clone(),
                report.network_info.clone(),
                self.clock.now(),
            )
            .await?;

        let mut routes_changed = false;
        for app in &report.apps {
            match self.apply_app(server_id, app).await {
                Ok(changed) => routes_changed |= changed,
                Err(e) => {
                    warn!(
                        server_id = %server_id,
                        app = %app.name,
                        error = %e,
                        "failed to reconcile app status"
                    );
                }
            }
        }

        if routes_changed {
            self.proxy.update_and_reload().await;
        }

        self.bus.publish(UiEvent::ServerStatus {
            server_id: server_id.clone(),
            metrics: report.metrics,
            apps: report.apps,
        });

        Ok(())
    }

    /// Reconcile one reported app. Returns whether its proxy route changed.
    async fn apply_app(&self, server_id: &ServerId, app: &AppReport) -> Result<bool, RepoError> {
        let Some(found) =
            self.repo.deployment_get_by_server_and_app(server_id, &app.name).await?
        else {
            debug!(server_id = %server_id, app = %app.name, "report for unknown deployment, skipping");
            return Ok(false);
        };

        let new_status = app.status.to_deployment_status();

        let _guard = self.locks.lock_deployment(&found.id).await;

        let applied =
            self.repo.deployment_set_status_if_not_transient(&found.id, new_status).await?;
        if !applied {
            // A command in flight owns this deployment's status
            debug!(
                deployment_id = %found.id,
                current = %found.status,
                reported = %new_status,
                "transient state preserved over status report"
            );
            return Ok(false);
        }

        let mut route_changed = false;
        let mut route_active = found.route_active;
        if let Some(active) = found.route_active {
            let desired = new_status == DeploymentStatus::Running;
            if active != desired {
                self.repo.route_set_active(&found.id, desired).await?;
                route_active = Some(desired);
                route_changed = true;
            }
        }

        if found.status != new_status {
            self.bus.publish(UiEvent::DeploymentStatus {
                deployment_id: found.id.clone(),
                server_id: server_id.clone(),
                previous_status: found.status,
                status: new_status,
                route_active,
            });
        }

        Ok(route_changed)
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
