//! StackSet data model and the remote gateway used to drive it
//!
//! The reconciler only talks to the remote service through [`StackSetGateway`];
//! [`CloudFormationGateway`] is the AWS-backed implementation.

pub mod cloudformation;
#[cfg(test)]
pub(crate) mod fake;
pub mod gateway;
pub mod types;

pub use cloudformation::{CloudFormationGateway, StackSetMetadata};
pub use gateway::StackSetGateway;
pub use types::{
    DesiredState, InstanceOutcome, InstanceStatus, OperationHandle, OperationStatus, RegionDiff,
    RegionSet, StackSetIdentity, StackSetSnapshot, StackSetStatus,
    INSTANCE_OPERATION_PREFERENCES,
};
