//! Reconciliation engine for per-account stack sets
//!
//! One reconciliation describes the stack set, selects a single
//! [`CorrectiveAction`], applies it through the gateway and blocks until the
//! resulting operation (and, where applicable, every instance) settles.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::plan::{plan_action, CorrectiveAction};
use super::waiter::{OperationWaiter, WaitConfig};
use crate::error::{ConflictKind, Result};
use crate::stackset::{
    DesiredState, InstanceOutcome, OperationHandle, OperationStatus, RegionDiff, RegionSet,
    StackSetGateway, StackSetIdentity, StackSetStatus,
};

/// Settings for the engine, independent of how the gateway was built
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Stack set family name; the account id is appended to form the remote name
    pub stack_set_base_name: String,
    pub wait: WaitConfig,
    /// Check every instance after the create-stack-set path
    pub confirm_created_instances: bool,
}

impl EngineConfig {
    pub fn new(stack_set_base_name: impl Into<String>) -> Self {
        Self {
            stack_set_base_name: stack_set_base_name.into(),
            wait: WaitConfig::default(),
            confirm_created_instances: true,
        }
    }
}

/// Why a reconciliation that ran to completion did not succeed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// Stack set exists, or was just created, but is not ACTIVE
    StackSetNotActive(StackSetStatus),
    /// Freshly created stack set could not be described after settling
    StackSetMissing,
    /// Control-plane operation ended in a status other than SUCCEEDED
    OperationFailed(OperationStatus),
    /// Operation succeeded but these instances did not converge
    InstancesNotConverged(Vec<InstanceOutcome>),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StackSetNotActive(status) => {
                write!(f, "stack set is {} instead of ACTIVE", status)
            }
            FailureReason::StackSetMissing => write!(f, "stack set not found after creation"),
            FailureReason::OperationFailed(status) => write!(f, "operation ended {}", status),
            FailureReason::InstancesNotConverged(instances) => {
                let regions: Vec<String> = instances
                    .iter()
                    .map(|i| format!("{}={}", i.region, i.status))
                    .collect();
                write!(f, "instances not converged: {}", regions.join(", "))
            }
        }
    }
}

/// Result of a reconciliation that ran to completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub account: String,
    pub action: CorrectiveAction,
    /// Per-region terminal statuses, when instances were confirmed
    pub instances: Vec<InstanceOutcome>,
    pub failure: Option<FailureReason>,
}

impl ReconcileOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// What one branch of the engine produced
struct Verdict {
    instances: Vec<InstanceOutcome>,
    failure: Option<FailureReason>,
}

impl Verdict {
    fn succeeded(instances: Vec<InstanceOutcome>) -> Self {
        Self {
            instances,
            failure: None,
        }
    }

    fn failed(reason: FailureReason) -> Self {
        Self {
            instances: Vec::new(),
            failure: Some(reason),
        }
    }
}

pub struct ReconciliationEngine {
    gateway: Arc<dyn StackSetGateway>,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(gateway: Arc<dyn StackSetGateway>, config: EngineConfig) -> Self {
        Self { gateway, config }
    }

    pub fn identity(&self, account: &str) -> StackSetIdentity {
        StackSetIdentity::new(&self.config.stack_set_base_name, account)
    }

    /// Describe the stack set and decide what would be done, without mutating anything
    #[instrument(skip(self, desired), fields(account = %desired.account))]
    pub async fn plan(&self, desired: &DesiredState) -> Result<CorrectiveAction> {
        let identity = self.identity(&desired.account);
        let snapshot = self.gateway.describe_stack_set(&identity).await?;
        Ok(plan_action(&desired.regions, snapshot.as_ref()))
    }

    /// Drive the stack set toward `desired` and wait for the remote outcome
    ///
    /// Remote errors (including conflicts and timeouts) are returned as `Err`;
    /// a reconciliation that ran to completion but did not converge is an
    /// `Ok` outcome carrying a [`FailureReason`].
    #[instrument(skip(self, desired), fields(account = %desired.account))]
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<ReconcileOutcome> {
        let identity = self.identity(&desired.account);
        let waiter = OperationWaiter::new(self.gateway.as_ref(), &self.config.wait);

        let snapshot = self.gateway.describe_stack_set(&identity).await?;
        let action = plan_action(&desired.regions, snapshot.as_ref());
        info!("Reconciling {} with action {}", identity, action);

        let verdict = match &action {
            CorrectiveAction::CreateStackSet => {
                self.create_stack_set(&identity, desired, &waiter).await?
            }
            CorrectiveAction::CreateInstances(regions) => {
                if let Some(current) = snapshot.as_ref().map(|s| &s.regions) {
                    let diff = RegionDiff::between(regions, current);
                    if !diff.removed.is_empty() {
                        warn!(
                            "Regions {:?} stay deployed for {} although no longer desired",
                            diff.removed, identity
                        );
                    }
                }
                let handle = self.gateway.create_instances(&identity, regions).await?;
                self.finish_operation(&identity, handle, Some(regions), &waiter)
                    .await?
            }
            CorrectiveAction::DeleteInstances(regions) => {
                let handle = self.gateway.delete_instances(&identity, regions).await?;
                self.finish_operation(&identity, handle, None, &waiter)
                    .await?
            }
            CorrectiveAction::UpdateStackSet => {
                let handle = self
                    .gateway
                    .update_stack_set(&identity, &desired.template_url)
                    .await?;
                self.finish_operation(&identity, handle, Some(&desired.regions), &waiter)
                    .await?
            }
            CorrectiveAction::NoOp(status) => {
                error!("Stack set {} is {}, not reconciling", identity, status);
                Verdict::failed(FailureReason::StackSetNotActive(status.clone()))
            }
        };

        match &verdict.failure {
            None => info!("Reconciled {} ({})", identity, action),
            Some(reason) => warn!("Reconciliation of {} failed: {}", identity, reason),
        }

        Ok(ReconcileOutcome {
            account: desired.account.clone(),
            action,
            instances: verdict.instances,
            failure: verdict.failure,
        })
    }

    async fn create_stack_set(
        &self,
        identity: &StackSetIdentity,
        desired: &DesiredState,
        waiter: &OperationWaiter<'_>,
    ) -> Result<Verdict> {
        match self
            .gateway
            .create_stack_set(identity, &desired.template_url)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_conflict(ConflictKind::AlreadyExists) => {
                info!("Stack set {} was created concurrently, continuing", identity);
            }
            Err(e) => return Err(e),
        }

        waiter
            .pause(self.config.wait.settle_delay, || {
                format!("stack set {identity} to settle")
            })
            .await?;

        let status = match self.gateway.describe_stack_set(identity).await? {
            Some(snapshot) => snapshot.status,
            None => return Ok(Verdict::failed(FailureReason::StackSetMissing)),
        };
        if !status.is_active() {
            error!("Stack set {} settled as {} after creation", identity, status);
            return Ok(Verdict::failed(FailureReason::StackSetNotActive(status)));
        }

        if desired.regions.is_empty() {
            info!("No regions requested for {}, skipping instances", identity);
            return Ok(Verdict::succeeded(Vec::new()));
        }

        let handle = self
            .gateway
            .create_instances(identity, &desired.regions)
            .await?;
        let confirm = self
            .config
            .confirm_created_instances
            .then_some(&desired.regions);
        self.finish_operation(identity, handle, confirm, waiter)
            .await
    }

    /// Wait for the operation and, when `confirm` is set, every listed instance
    async fn finish_operation(
        &self,
        identity: &StackSetIdentity,
        handle: OperationHandle,
        confirm: Option<&RegionSet>,
        waiter: &OperationWaiter<'_>,
    ) -> Result<Verdict> {
        let status = waiter.await_operation(identity, &handle).await?;
        if !status.is_succeeded() {
            return Ok(Verdict::failed(FailureReason::OperationFailed(status)));
        }

        let Some(regions) = confirm else {
            return Ok(Verdict::succeeded(Vec::new()));
        };

        let mut instances = Vec::with_capacity(regions.len());
        for region in regions {
            let status = waiter
                .await_instance(identity, identity.account(), region)
                .await?;
            instances.push(InstanceOutcome {
                region: region.clone(),
                status,
            });
        }
        info!(
            "{} stack instances status: {:?}",
            identity.account(),
            instances
        );

        let unconverged: Vec<InstanceOutcome> = instances
            .iter()
            .filter(|i| !i.status.is_succeeded())
            .cloned()
            .collect();
        if unconverged.is_empty() {
            Ok(Verdict::succeeded(instances))
        } else {
            Ok(Verdict {
                instances,
                failure: Some(FailureReason::InstancesNotConverged(unconverged)),
            })
        }
    }
}
