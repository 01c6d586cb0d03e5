//! CloudFormation StackSets implementation of [`StackSetGateway`]

use async_trait::async_trait;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{
    CallAs, Capability, ManagedExecution, RegionConcurrencyType, StackSetOperationPreferences,
    Tag,
};
use aws_sdk_cloudformation::Client;
use tracing::{debug, info};

use super::gateway::StackSetGateway;
use super::types::{
    InstanceStatus, OperationHandle, OperationPreferences, OperationStatus, RegionSet,
    StackSetIdentity, StackSetSnapshot, StackSetStatus, INSTANCE_OPERATION_PREFERENCES,
};
use crate::error::{ConflictKind, Error, ResourceKind, Result};

pub const DEFAULT_DESCRIPTION: &str =
    "StackSet to deploy AWS Config Rules per account in designated regions";

/// Tag applied to every stack set when none are configured
pub const DEFAULT_TAG: (&str, &str) = ("FTA-Project", "AWSConfigRules");

/// Static metadata attached to created and updated stack sets
#[derive(Clone, Debug)]
pub struct StackSetMetadata {
    pub description: String,
    pub tags: Vec<(String, String)>,
}

impl Default for StackSetMetadata {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            tags: vec![(DEFAULT_TAG.0.to_string(), DEFAULT_TAG.1.to_string())],
        }
    }
}

/// How a remote error code maps onto the reconciler's taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RemoteErrorClass {
    NotFound(ResourceKind),
    Conflict(ConflictKind),
}

fn classify_error_code(code: Option<&str>) -> Option<RemoteErrorClass> {
    match code? {
        "StackSetNotFoundException" => Some(RemoteErrorClass::NotFound(ResourceKind::StackSet)),
        "OperationNotFoundException" => Some(RemoteErrorClass::NotFound(ResourceKind::Operation)),
        "StackInstanceNotFoundException" => {
            Some(RemoteErrorClass::NotFound(ResourceKind::StackInstance))
        }
        "NameAlreadyExistsException" => {
            Some(RemoteErrorClass::Conflict(ConflictKind::AlreadyExists))
        }
        "OperationInProgressException" => {
            Some(RemoteErrorClass::Conflict(ConflictKind::OperationInProgress))
        }
        _ => None,
    }
}

fn remote_error<E, R>(operation: &'static str, name: String, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.as_service_error().and_then(|e| e.code());
    match classify_error_code(code) {
        Some(RemoteErrorClass::NotFound(kind)) => {
            info!("{} not found during {}: {}", kind, operation, name);
            Error::NotFound { kind, name }
        }
        Some(RemoteErrorClass::Conflict(kind)) => {
            info!("{} rejected for {}: {}", operation, name, kind);
            Error::Conflict { kind, name }
        }
        None => Error::Remote {
            operation,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn sdk_preferences(prefs: &OperationPreferences) -> StackSetOperationPreferences {
    StackSetOperationPreferences::builder()
        .region_concurrency_type(RegionConcurrencyType::Parallel)
        .failure_tolerance_percentage(prefs.failure_tolerance_percent)
        .max_concurrent_count(prefs.max_concurrent_regions)
        .build()
}

fn sdk_tags(tags: &[(String, String)]) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect()
}

fn operation_handle(operation: &'static str, id: Option<&str>) -> Result<OperationHandle> {
    id.map(OperationHandle::new).ok_or(Error::MissingField {
        operation,
        field: "OperationId",
    })
}

/// Gateway backed by the AWS CloudFormation API, always calling as `SELF`
#[derive(Clone)]
pub struct CloudFormationGateway {
    client: Client,
    metadata: StackSetMetadata,
}

impl CloudFormationGateway {
    pub fn new(client: Client, metadata: StackSetMetadata) -> Self {
        Self { client, metadata }
    }

    fn managed_execution() -> ManagedExecution {
        ManagedExecution::builder().active(true).build()
    }
}

#[async_trait]
impl StackSetGateway for CloudFormationGateway {
    async fn describe_stack_set(
        &self,
        identity: &StackSetIdentity,
    ) -> Result<Option<StackSetSnapshot>> {
        let name = identity.name();
        debug!("Describing stack set {}", name);

        let output = match self
            .client
            .describe_stack_set()
            .stack_set_name(&name)
            .call_as(CallAs::SelfValue)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                return match remote_error("DescribeStackSet", name, e) {
                    Error::NotFound {
                        kind: ResourceKind::StackSet,
                        ..
                    } => Ok(None),
                    other => Err(other),
                };
            }
        };

        let stack_set = output.stack_set().ok_or(Error::MissingField {
            operation: "DescribeStackSet",
            field: "StackSet",
        })?;
        let status = stack_set
            .status()
            .map(|s| StackSetStatus::from(s.as_str()))
            .ok_or(Error::MissingField {
                operation: "DescribeStackSet",
                field: "Status",
            })?;

        Ok(Some(StackSetSnapshot {
            status,
            regions: stack_set.regions().iter().cloned().collect(),
        }))
    }

    async fn create_stack_set(&self, identity: &StackSetIdentity, template_url: &str) -> Result<()> {
        let name = identity.name();
        info!("Creating stack set {} from {}", name, template_url);

        self.client
            .create_stack_set()
            .stack_set_name(&name)
            .description(&self.metadata.description)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityAutoExpand)
            .template_url(template_url)
            .set_tags(Some(sdk_tags(&self.metadata.tags)))
            .managed_execution(Self::managed_execution())
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("CreateStackSet", name, e))?;

        Ok(())
    }

    async fn update_stack_set(
        &self,
        identity: &StackSetIdentity,
        template_url: &str,
    ) -> Result<OperationHandle> {
        let name = identity.name();
        info!("Updating stack set {} from {}", name, template_url);

        let output = self
            .client
            .update_stack_set()
            .stack_set_name(&name)
            .description(&self.metadata.description)
            .template_url(template_url)
            .use_previous_template(false)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityAutoExpand)
            .operation_preferences(sdk_preferences(&INSTANCE_OPERATION_PREFERENCES))
            .set_tags(Some(sdk_tags(&self.metadata.tags)))
            .managed_execution(Self::managed_execution())
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("UpdateStackSet", name, e))?;

        operation_handle("UpdateStackSet", output.operation_id())
    }

    async fn create_instances(
        &self,
        identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle> {
        let name = identity.name();
        info!("Creating stack instances for {} in {:?}", name, regions);

        let output = self
            .client
            .create_stack_instances()
            .stack_set_name(&name)
            .accounts(identity.account())
            .set_regions(Some(regions.iter().cloned().collect()))
            .operation_preferences(sdk_preferences(&INSTANCE_OPERATION_PREFERENCES))
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("CreateStackInstances", name, e))?;

        operation_handle("CreateStackInstances", output.operation_id())
    }

    async fn delete_instances(
        &self,
        identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle> {
        let name = identity.name();
        info!("Deleting stack instances for {} in {:?}", name, regions);

        let output = self
            .client
            .delete_stack_instances()
            .stack_set_name(&name)
            .accounts(identity.account())
            .set_regions(Some(regions.iter().cloned().collect()))
            .operation_preferences(sdk_preferences(&INSTANCE_OPERATION_PREFERENCES))
            .retain_stacks(false)
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("DeleteStackInstances", name, e))?;

        operation_handle("DeleteStackInstances", output.operation_id())
    }

    async fn update_instances(
        &self,
        identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle> {
        let name = identity.name();
        info!("Updating stack instances for {} in {:?}", name, regions);

        let output = self
            .client
            .update_stack_instances()
            .stack_set_name(&name)
            .accounts(identity.account())
            .set_regions(Some(regions.iter().cloned().collect()))
            .operation_preferences(sdk_preferences(&INSTANCE_OPERATION_PREFERENCES))
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("UpdateStackInstances", name, e))?;

        operation_handle("UpdateStackInstances", output.operation_id())
    }

    async fn describe_operation(
        &self,
        identity: &StackSetIdentity,
        handle: &OperationHandle,
    ) -> Result<OperationStatus> {
        let name = identity.name();

        let output = self
            .client
            .describe_stack_set_operation()
            .stack_set_name(&name)
            .operation_id(handle.as_str())
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("DescribeStackSetOperation", format!("{name}/{handle}"), e))?;

        output
            .stack_set_operation()
            .and_then(|op| op.status())
            .map(|s| OperationStatus::from(s.as_str()))
            .ok_or(Error::MissingField {
                operation: "DescribeStackSetOperation",
                field: "Status",
            })
    }

    async fn describe_instance(
        &self,
        identity: &StackSetIdentity,
        account: &str,
        region: &str,
    ) -> Result<InstanceStatus> {
        let name = identity.name();

        let output = self
            .client
            .describe_stack_instance()
            .stack_set_name(&name)
            .stack_instance_account(account)
            .stack_instance_region(region)
            .call_as(CallAs::SelfValue)
            .send()
            .await
            .map_err(|e| remote_error("DescribeStackInstance", format!("{name}/{region}"), e))?;

        output
            .stack_instance()
            .and_then(|i| i.stack_instance_status())
            .and_then(|s| s.detailed_status())
            .map(|s| InstanceStatus::from(s.as_str()))
            .ok_or(Error::MissingField {
                operation: "DescribeStackInstance",
                field: "DetailedStatus",
            })
    }
}
