//! Types describing stack sets, their operations and instances

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

/// Sorted, de-duplicated set of region names
pub type RegionSet = BTreeSet<String>;

/// Unique key of a remote stack set: template family name plus account
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackSetIdentity {
    base_name: String,
    account: String,
}

impl StackSetIdentity {
    pub fn new(base_name: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            account: account.into(),
        }
    }

    /// Remote stack set name, e.g. `config-rules-111122223333`
    pub fn name(&self) -> String {
        format!("{}-{}", self.base_name, self.account)
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

impl fmt::Display for StackSetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base_name, self.account)
    }
}

/// Lifecycle status of a stack set
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackSetStatus {
    Active,
    Deleted,
    Other(String),
}

impl StackSetStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, StackSetStatus::Active)
    }
}

impl From<&str> for StackSetStatus {
    fn from(s: &str) -> Self {
        match s {
            "ACTIVE" => StackSetStatus::Active,
            "DELETED" => StackSetStatus::Deleted,
            other => StackSetStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StackSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackSetStatus::Active => write!(f, "ACTIVE"),
            StackSetStatus::Deleted => write!(f, "DELETED"),
            StackSetStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Serialized as the remote status string, matching `Display`
impl Serialize for StackSetStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Observed state of an existing stack set, fetched fresh on every reconciliation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSetSnapshot {
    pub status: StackSetStatus,
    pub regions: RegionSet,
}

/// What the caller wants deployed for one account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredState {
    pub account: String,
    pub regions: RegionSet,
    pub template_url: String,
}

impl DesiredState {
    pub fn new<I, S>(account: impl Into<String>, regions: I, template_url: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            account: account.into(),
            regions: regions.into_iter().map(Into::into).collect(),
            template_url: template_url.into(),
        }
    }
}

/// Identifier returned by a mutating call, used to poll the operation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a stack set operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Queued,
    Succeeded,
    Failed,
    Stopping,
    Stopped,
    Other(String),
}

impl OperationStatus {
    /// RUNNING and QUEUED are the only non-terminal operation states
    pub fn is_in_progress(&self) -> bool {
        matches!(self, OperationStatus::Running | OperationStatus::Queued)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, OperationStatus::Succeeded)
    }
}

impl From<&str> for OperationStatus {
    fn from(s: &str) -> Self {
        match s {
            "RUNNING" => OperationStatus::Running,
            "QUEUED" => OperationStatus::Queued,
            "SUCCEEDED" => OperationStatus::Succeeded,
            "FAILED" => OperationStatus::Failed,
            "STOPPING" => OperationStatus::Stopping,
            "STOPPED" => OperationStatus::Stopped,
            other => OperationStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Running => "RUNNING",
            OperationStatus::Queued => "QUEUED",
            OperationStatus::Succeeded => "SUCCEEDED",
            OperationStatus::Failed => "FAILED",
            OperationStatus::Stopping => "STOPPING",
            OperationStatus::Stopped => "STOPPED",
            OperationStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Detailed status of a single stack instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Inoperable,
    Other(String),
}

impl InstanceStatus {
    /// RUNNING and PENDING are the only non-terminal instance states
    pub fn is_in_progress(&self) -> bool {
        matches!(self, InstanceStatus::Running | InstanceStatus::Pending)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, InstanceStatus::Succeeded)
    }
}

impl From<&str> for InstanceStatus {
    fn from(s: &str) -> Self {
        match s {
            "PENDING" => InstanceStatus::Pending,
            "RUNNING" => InstanceStatus::Running,
            "SUCCEEDED" => InstanceStatus::Succeeded,
            "FAILED" => InstanceStatus::Failed,
            "CANCELLED" => InstanceStatus::Cancelled,
            "INOPERABLE" => InstanceStatus::Inoperable,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceStatus::Pending => "PENDING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Succeeded => "SUCCEEDED",
            InstanceStatus::Failed => "FAILED",
            InstanceStatus::Cancelled => "CANCELLED",
            InstanceStatus::Inoperable => "INOPERABLE",
            InstanceStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

/// Terminal status of one region's instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceOutcome {
    pub region: String,
    pub status: InstanceStatus,
}

/// Preferences attached to every instance-affecting operation, applied with
/// parallel region concurrency
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationPreferences {
    pub failure_tolerance_percent: i32,
    pub max_concurrent_regions: i32,
}

/// Tolerate failure in every region and apply one region at a time
pub const INSTANCE_OPERATION_PREFERENCES: OperationPreferences = OperationPreferences {
    failure_tolerance_percent: 100,
    max_concurrent_regions: 1,
};

/// Regions to add and remove to move from the current set to the desired one
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionDiff {
    pub added: RegionSet,
    pub removed: RegionSet,
}

impl RegionDiff {
    pub fn between(desired: &RegionSet, current: &RegionSet) -> Self {
        Self {
            added: desired.difference(current).cloned().collect(),
            removed: current.difference(desired).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
