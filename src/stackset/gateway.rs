//! Remote StackSet API seam
//!
//! Every method is a single round trip against the remote service. The gateway
//! performs no retries; transient errors propagate to the caller.

use async_trait::async_trait;

use super::types::{
    InstanceStatus, OperationHandle, OperationStatus, RegionSet, StackSetIdentity,
    StackSetSnapshot,
};
use crate::error::Result;

#[async_trait]
pub trait StackSetGateway: Send + Sync {
    /// Describe the stack set, returning `None` when it does not exist
    async fn describe_stack_set(&self, identity: &StackSetIdentity)
        -> Result<Option<StackSetSnapshot>>;

    /// Create the stack set from a template URL
    ///
    /// Fails with a `Conflict { AlreadyExists }` error when another creator won.
    async fn create_stack_set(&self, identity: &StackSetIdentity, template_url: &str) -> Result<()>;

    /// Re-apply the template to the stack set and all of its instances
    async fn update_stack_set(
        &self,
        identity: &StackSetIdentity,
        template_url: &str,
    ) -> Result<OperationHandle>;

    async fn create_instances(
        &self,
        identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle>;

    async fn delete_instances(
        &self,
        identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle>;

    async fn update_instances(
        &self,
        identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle>;

    /// Current status of a single operation
    async fn describe_operation(
        &self,
        identity: &StackSetIdentity,
        handle: &OperationHandle,
    ) -> Result<OperationStatus>;

    /// Current detailed status of the instance in one account/region
    async fn describe_instance(
        &self,
        identity: &StackSetIdentity,
        account: &str,
        region: &str,
    ) -> Result<InstanceStatus>;
}
