//! Blocking waits on asynchronous stack set operations and instances
//!
//! Polls at a fixed interval per resource kind until a terminal status is
//! observed. Remote errors end the wait immediately. When a deadline is set,
//! a wait that would sleep past it fails with [`Error::Timeout`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::stackset::{
    InstanceStatus, OperationHandle, OperationStatus, StackSetGateway, StackSetIdentity,
};

/// Poll interval for stack set operations
pub const DEFAULT_OPERATION_INTERVAL: Duration = Duration::from_secs(10);
/// Poll interval for per-instance status checks
pub const DEFAULT_INSTANCE_INTERVAL: Duration = Duration::from_secs(60);
/// Delay before a freshly created stack set is described again
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(20);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitConfig {
    pub operation_interval: Duration,
    pub instance_interval: Duration,
    pub settle_delay: Duration,
    /// Upper bound on one whole reconciliation; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            operation_interval: DEFAULT_OPERATION_INTERVAL,
            instance_interval: DEFAULT_INSTANCE_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            timeout: None,
        }
    }
}

pub struct OperationWaiter<'a> {
    gateway: &'a dyn StackSetGateway,
    config: &'a WaitConfig,
    started: Instant,
    deadline: Option<Instant>,
}

impl<'a> OperationWaiter<'a> {
    /// Start the deadline clock for one reconciliation
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn new(gateway: &'a dyn StackSetGateway, config: &'a WaitConfig) -> Self {
        let started = Instant::now();
        Self {
            gateway,
            config,
            started,
            deadline: config.timeout.and_then(|t| started.checked_add(t)),
        }
    }

    /// Sleep for `delay`, failing instead if that would pass the deadline
    pub async fn pause(&self, delay: Duration, waiting_for: impl FnOnce() -> String) -> Result<()> {
        if let Some(deadline) = self.deadline {
            let overruns = Instant::now()
                .checked_add(delay)
                .map_or(true, |end| end > deadline);
            if overruns {
                return Err(Error::Timeout {
                    waiting_for: waiting_for(),
                    elapsed: self.started.elapsed(),
                });
            }
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Poll an operation until it leaves RUNNING/QUEUED
    #[instrument(skip(self), fields(stack_set = %identity, operation = %handle))]
    pub async fn await_operation(
        &self,
        identity: &StackSetIdentity,
        handle: &OperationHandle,
    ) -> Result<OperationStatus> {
        loop {
            let status = self.gateway.describe_operation(identity, handle).await?;
            if !status.is_in_progress() {
                debug!("Operation {} finished with {}", handle, status);
                return Ok(status);
            }
            debug!("Operation {} is {}, polling again", handle, status);
            self.pause(self.config.operation_interval, || {
                format!("operation {handle} on {identity}")
            })
            .await?;
        }
    }

    /// Poll one instance until it leaves RUNNING/PENDING
    #[instrument(skip(self), fields(stack_set = %identity))]
    pub async fn await_instance(
        &self,
        identity: &StackSetIdentity,
        account: &str,
        region: &str,
    ) -> Result<InstanceStatus> {
        loop {
            let status = self
                .gateway
                .describe_instance(identity, account, region)
                .await?;
            if !status.is_in_progress() {
                debug!("Instance {}/{} settled at {}", account, region, status);
                return Ok(status);
            }
            debug!("Instance {}/{} is {}, polling again", account, region, status);
            self.pause(self.config.instance_interval, || {
                format!("instance {account}/{region} of {identity}")
            })
            .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceKind;
    use crate::stackset::fake::{Call, FakeGateway};

    fn fast() -> WaitConfig {
        WaitConfig {
            operation_interval: Duration::from_millis(1),
            instance_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
            timeout: None,
        }
    }

    fn identity() -> StackSetIdentity {
        StackSetIdentity::new("config-rules", "111122223333")
    }

    #[test]
    fn test_default_intervals() {
        let config = WaitConfig::default();
        assert_eq!(config.operation_interval, Duration::from_secs(10));
        assert_eq!(config.instance_interval, Duration::from_secs(60));
        assert_eq!(config.settle_delay, Duration::from_secs(20));
        assert!(config.timeout.is_none());
    }

    #[tokio::test]
    async fn test_operation_wait_skips_in_progress_states() {
        let gateway =
            FakeGateway::new().with_operation_statuses(&["QUEUED", "RUNNING", "RUNNING", "FAILED"]);
        let config = fast();
        let waiter = OperationWaiter::new(&gateway, &config);

        let status = waiter
            .await_operation(&identity(), &OperationHandle::new("op-1"))
            .await
            .unwrap();

        assert_eq!(status, OperationStatus::Failed);
        assert_eq!(gateway.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_operation_wait_returns_immediately_on_terminal_status() {
        for terminal in ["SUCCEEDED", "FAILED", "STOPPED", "STOPPING"] {
            let gateway = FakeGateway::new().with_operation_statuses(&[terminal]);
            let config = fast();
            let waiter = OperationWaiter::new(&gateway, &config);

            let status = waiter
                .await_operation(&identity(), &OperationHandle::new("op-1"))
                .await
                .unwrap();

            assert_eq!(status.to_string(), terminal);
            assert_eq!(gateway.calls().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_instance_wait_skips_pending_and_running() {
        let gateway = FakeGateway::new().with_instance_statuses(
            "us-west-2",
            &["PENDING", "RUNNING", "INOPERABLE"],
        );
        let config = fast();
        let waiter = OperationWaiter::new(&gateway, &config);

        let status = waiter
            .await_instance(&identity(), "111122223333", "us-west-2")
            .await
            .unwrap();

        assert_eq!(status, InstanceStatus::Inoperable);
        assert_eq!(
            gateway.calls(),
            vec![Call::DescribeInstance("us-west-2".to_string()); 3]
        );
    }

    #[tokio::test]
    async fn test_remote_error_stops_polling() {
        let gateway = FakeGateway::new()
            .with_operation_statuses(&["RUNNING"])
            .failing(
                "describe_operation",
                Error::NotFound {
                    kind: ResourceKind::Operation,
                    name: "op-1".to_string(),
                },
            );
        let config = fast();
        let waiter = OperationWaiter::new(&gateway, &config);

        let err = waiter
            .await_operation(&identity(), &OperationHandle::new("op-1"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_stops_instance_polling() {
        let gateway = FakeGateway::new()
            .with_instance_statuses("us-west-2", &["RUNNING"])
            .failing(
                "describe_instance",
                Error::NotFound {
                    kind: ResourceKind::StackInstance,
                    name: "111122223333/us-west-2".to_string(),
                },
            );
        let config = fast();
        let waiter = OperationWaiter::new(&gateway, &config);

        let err = waiter
            .await_instance(&identity(), "111122223333", "us-west-2")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(
            gateway.calls(),
            vec![Call::DescribeInstance("us-west-2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_waits_without_deadline() {
        let gateway = FakeGateway::new().with_operation_statuses(&["RUNNING", "SUCCEEDED"]);
        let config = WaitConfig {
            timeout: Some(Duration::from_secs(u64::MAX)),
            ..fast()
        };
        let waiter = OperationWaiter::new(&gateway, &config);

        let status = waiter
            .await_operation(&identity(), &OperationHandle::new("op-1"))
            .await
            .unwrap();

        assert_eq!(status, OperationStatus::Succeeded);
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unrepresentable_delay_fails_against_deadline() {
        let gateway = FakeGateway::new();
        let config = WaitConfig {
            timeout: Some(Duration::from_secs(5)),
            ..fast()
        };
        let waiter = OperationWaiter::new(&gateway, &config);

        let err = waiter
            .pause(Duration::from_secs(u64::MAX), || "settle".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_wait_times_out_at_deadline() {
        let gateway = FakeGateway::new().with_operation_statuses(&["RUNNING"]);
        let config = WaitConfig {
            operation_interval: Duration::from_secs(10),
            timeout: Some(Duration::from_secs(5)),
            ..fast()
        };
        let waiter = OperationWaiter::new(&gateway, &config);

        let err = waiter
            .await_operation(&identity(), &OperationHandle::new("op-1"))
            .await
            .unwrap_err();

        match err {
            Error::Timeout { waiting_for, .. } => {
                assert!(waiting_for.contains("op-1"), "{waiting_for}")
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
