//! In-memory scripted gateway for tests
//!
//! Scripted responses are consumed in order; the last scripted value for a
//! queue is repeated once the queue is down to one entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::gateway::StackSetGateway;
use super::types::{
    InstanceStatus, OperationHandle, OperationStatus, RegionSet, StackSetIdentity,
    StackSetSnapshot, StackSetStatus,
};
use crate::error::{Error, Result};

/// A call observed by the fake, in order of arrival
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    DescribeStackSet,
    CreateStackSet(String),
    UpdateStackSet(String),
    CreateInstances(RegionSet),
    DeleteInstances(RegionSet),
    UpdateInstances(RegionSet),
    DescribeOperation(OperationHandle),
    DescribeInstance(String),
}

impl Call {
    pub(crate) fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::DescribeStackSet | Call::DescribeOperation(_) | Call::DescribeInstance(_)
        )
    }
}

#[derive(Default)]
struct FakeState {
    snapshots: VecDeque<Option<StackSetSnapshot>>,
    operations: VecDeque<OperationStatus>,
    instances: HashMap<String, VecDeque<InstanceStatus>>,
    failures: HashMap<&'static str, Error>,
    calls: Vec<Call>,
    next_operation: u32,
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

pub(crate) fn regions(list: &[&str]) -> RegionSet {
    list.iter().map(|r| r.to_string()).collect()
}

pub(crate) fn active(list: &[&str]) -> Option<StackSetSnapshot> {
    Some(StackSetSnapshot {
        status: StackSetStatus::Active,
        regions: regions(list),
    })
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `describe_stack_set` call
    pub(crate) fn with_snapshot(self, snapshot: Option<StackSetSnapshot>) -> Self {
        self.state.lock().unwrap().snapshots.push_back(snapshot);
        self
    }

    pub(crate) fn with_operation_statuses(self, statuses: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .operations
            .extend(statuses.iter().map(|s| OperationStatus::from(*s)));
        self
    }

    pub(crate) fn with_instance_statuses(self, region: &str, statuses: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .instances
            .entry(region.to_string())
            .or_default()
            .extend(statuses.iter().map(|s| InstanceStatus::from(*s)));
        self
    }

    /// Make the next call to `method` fail with `error`
    pub(crate) fn failing(self, method: &'static str, error: Error) -> Self {
        self.state.lock().unwrap().failures.insert(method, error);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    fn record(&self, method: &'static str, call: Call) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.remove(method) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn new_operation(&self) -> OperationHandle {
        let mut state = self.state.lock().unwrap();
        state.next_operation += 1;
        OperationHandle::new(format!("op-{}", state.next_operation))
    }
}

#[async_trait]
impl StackSetGateway for FakeGateway {
    async fn describe_stack_set(
        &self,
        _identity: &StackSetIdentity,
    ) -> Result<Option<StackSetSnapshot>> {
        self.record("describe_stack_set", Call::DescribeStackSet)?;
        let mut state = self.state.lock().unwrap();
        Ok(next_scripted(&mut state.snapshots).flatten())
    }

    async fn create_stack_set(&self, _identity: &StackSetIdentity, template_url: &str) -> Result<()> {
        self.record(
            "create_stack_set",
            Call::CreateStackSet(template_url.to_string()),
        )
    }

    async fn update_stack_set(
        &self,
        _identity: &StackSetIdentity,
        template_url: &str,
    ) -> Result<OperationHandle> {
        self.record(
            "update_stack_set",
            Call::UpdateStackSet(template_url.to_string()),
        )?;
        Ok(self.new_operation())
    }

    async fn create_instances(
        &self,
        _identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle> {
        self.record("create_instances", Call::CreateInstances(regions.clone()))?;
        Ok(self.new_operation())
    }

    async fn delete_instances(
        &self,
        _identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle> {
        self.record("delete_instances", Call::DeleteInstances(regions.clone()))?;
        Ok(self.new_operation())
    }

    async fn update_instances(
        &self,
        _identity: &StackSetIdentity,
        regions: &RegionSet,
    ) -> Result<OperationHandle> {
        self.record("update_instances", Call::UpdateInstances(regions.clone()))?;
        Ok(self.new_operation())
    }

    async fn describe_operation(
        &self,
        _identity: &StackSetIdentity,
        handle: &OperationHandle,
    ) -> Result<OperationStatus> {
        self.record("describe_operation", Call::DescribeOperation(handle.clone()))?;
        let mut state = self.state.lock().unwrap();
        Ok(next_scripted(&mut state.operations).unwrap_or(OperationStatus::Succeeded))
    }

    async fn describe_instance(
        &self,
        _identity: &StackSetIdentity,
        _account: &str,
        region: &str,
    ) -> Result<InstanceStatus> {
        self.record("describe_instance", Call::DescribeInstance(region.to_string()))?;
        let mut state = self.state.lock().unwrap();
        Ok(state
            .instances
            .get_mut(region)
            .and_then(next_scripted)
            .unwrap_or(InstanceStatus::Succeeded))
    }
}
