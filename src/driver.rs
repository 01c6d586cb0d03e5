//! Reconciliation driver: the boundary between callers and the engine
//!
//! Turns a request into a [`DesiredState`], obtains a gateway scoped to the
//! request's account, runs the engine and maps the outcome to a response.
//! The driver makes no reconciliation decisions of its own.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::controller::{CorrectiveAction, EngineConfig, ReconcileOutcome, ReconciliationEngine};
use crate::error::{Error, Result};
use crate::stackset::{CloudFormationGateway, DesiredState, StackSetGateway, StackSetMetadata};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Session name used when assuming the member role
pub const ASSUME_ROLE_SESSION_NAME: &str = "StackSetReconciler";

/// Placeholder replaced with the request's account id in a member role ARN
pub const ACCOUNT_PLACEHOLDER: &str = "{account}";

/// Incoming reconciliation request
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconcileRequest {
    pub account: String,
    pub regions: Vec<String>,
    /// Overrides the configured template when present
    #[serde(
        default,
        rename = "templateUrl",
        alias = "templateLocation",
        skip_serializing_if = "Option::is_none"
    )]
    pub template_url: Option<String>,
}

impl ReconcileRequest {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read a request from a JSON file, or stdin when `path` is `-`
    pub fn load(path: &Path) -> Result<Self> {
        if path == Path::new("-") {
            return Self::from_reader(std::io::stdin().lock());
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

/// Boundary response: 200 only when everything converged
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconcileResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub account: String,
}

impl ReconcileResponse {
    pub const SUCCEEDED: u16 = 200;
    pub const FAILED: u16 = 500;

    pub fn from_outcome(outcome: &ReconcileOutcome) -> Self {
        Self {
            status_code: if outcome.is_success() {
                Self::SUCCEEDED
            } else {
                Self::FAILED
            },
            account: outcome.account.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == Self::SUCCEEDED
    }
}

/// Supplies a gateway able to act on one account's stack set
#[async_trait]
pub trait GatewayProvider: Send + Sync {
    async fn gateway_for(&self, account: &str) -> Result<Arc<dyn StackSetGateway>>;
}

/// Builds CloudFormation gateways from the ambient AWS configuration
///
/// When a member role is configured it is assumed before talking to
/// CloudFormation, so the stack set lives in the target account.
pub struct AwsGatewayProvider {
    region: String,
    member_role_arn: Option<String>,
    metadata: StackSetMetadata,
}

impl AwsGatewayProvider {
    pub fn new(
        region: impl Into<String>,
        member_role_arn: Option<String>,
        metadata: StackSetMetadata,
    ) -> Self {
        Self {
            region: region.into(),
            member_role_arn,
            metadata,
        }
    }
}

/// Substitute the account id into a member role ARN template
pub fn member_role_for(template: &str, account: &str) -> String {
    template.replace(ACCOUNT_PLACEHOLDER, account)
}

#[async_trait]
impl GatewayProvider for AwsGatewayProvider {
    async fn gateway_for(&self, account: &str) -> Result<Arc<dyn StackSetGateway>> {
        let region = Region::new(self.region.clone());
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(region.clone())
            .load()
            .await;

        let sdk_config = match &self.member_role_arn {
            Some(template) => {
                let role_arn = member_role_for(template, account);
                info!("Assuming role {} for account {}", role_arn, account);
                let credentials = AssumeRoleProvider::builder(role_arn)
                    .session_name(ASSUME_ROLE_SESSION_NAME)
                    .region(region.clone())
                    .configure(&base)
                    .build()
                    .await;
                aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
                    .load()
                    .await
            }
            None => base,
        };

        let client = aws_sdk_cloudformation::Client::new(&sdk_config);
        let gateway: Arc<dyn StackSetGateway> =
            Arc::new(CloudFormationGateway::new(client, self.metadata.clone()));
        Ok(gateway)
    }
}

/// Settings consumed by the driver rather than the engine
#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub engine: EngineConfig,
    /// Template used when the request does not name one
    pub template_url: Option<String>,
}

pub struct ReconciliationDriver<P> {
    provider: P,
    config: DriverConfig,
}

impl<P: GatewayProvider> ReconciliationDriver<P> {
    pub fn new(provider: P, config: DriverConfig) -> Self {
        Self { provider, config }
    }

    fn desired_state(&self, request: &ReconcileRequest) -> Result<DesiredState> {
        if request.account.trim().is_empty() {
            return Err(Error::ValidationError(
                "request account must not be empty".to_string(),
            ));
        }
        let template_url = request
            .template_url
            .as_ref()
            .or(self.config.template_url.as_ref())
            .ok_or_else(|| {
                Error::ConfigError(
                    "no template URL in the request or the configuration".to_string(),
                )
            })?;
        Ok(DesiredState::new(
            request.account.clone(),
            request.regions.iter().cloned(),
            template_url.clone(),
        ))
    }

    async fn engine_for(&self, account: &str) -> Result<ReconciliationEngine> {
        let gateway = self.provider.gateway_for(account).await?;
        Ok(ReconciliationEngine::new(gateway, self.config.engine.clone()))
    }

    /// Run one reconciliation and map it to a boundary response
    ///
    /// Errors that stop the engine (conflicts, remote failures, timeouts) are
    /// logged and returned to the caller, which owns any retry policy.
    #[instrument(skip(self, request), fields(account = %request.account))]
    pub async fn handle(&self, request: &ReconcileRequest) -> Result<ReconcileResponse> {
        info!(
            "Received reconciliation request for {} in {:?}",
            request.account, request.regions
        );
        let desired = self.desired_state(request)?;
        let engine = self.engine_for(&desired.account).await?;

        match engine.reconcile(&desired).await {
            Ok(outcome) => {
                let response = ReconcileResponse::from_outcome(&outcome);
                info!(
                    "Reconciliation of {} finished with status {}",
                    response.account, response.status_code
                );
                Ok(response)
            }
            Err(e) => {
                error!("Reconciliation of {} aborted: {}", desired.account, e);
                Err(e)
            }
        }
    }

    /// Report the action a reconciliation would take, without applying it
    pub async fn plan(&self, request: &ReconcileRequest) -> Result<CorrectiveAction> {
        let desired = self.desired_state(request)?;
        let engine = self.engine_for(&desired.account).await?;
        engine.plan(&desired).await
    }
}
