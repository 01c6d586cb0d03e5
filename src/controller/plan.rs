//! Corrective action selection
//!
//! Chooses exactly one action from the desired region set and the observed
//! stack set snapshot. Grow versus shrink is decided on set size alone.

use std::fmt;

use serde::Serialize;

use crate::stackset::{RegionDiff, RegionSet, StackSetSnapshot, StackSetStatus};

/// The single remote action taken by one reconciliation
///
/// Serialized for dry runs as `{"action": ..., "target": ...}`, where the
/// target is the region list or, for a no-op, the stack set status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "target")]
pub enum CorrectiveAction {
    /// Stack set is missing; create it, then its instances
    CreateStackSet,
    /// Grow: create instances for the full desired set
    CreateInstances(RegionSet),
    /// Shrink: delete instances no longer desired
    DeleteInstances(RegionSet),
    /// Region sets match; re-apply the template in place
    UpdateStackSet,
    /// Stack set exists but is not ACTIVE; nothing can be done
    NoOp(StackSetStatus),
}

impl CorrectiveAction {
    /// Whether the resulting instances are checked region by region
    pub fn confirms_instances(&self) -> bool {
        matches!(
            self,
            CorrectiveAction::CreateInstances(_) | CorrectiveAction::UpdateStackSet
        )
    }
}

impl fmt::Display for CorrectiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectiveAction::CreateStackSet => write!(f, "create-stack-set"),
            CorrectiveAction::CreateInstances(r) => write!(f, "create-instances {:?}", r),
            CorrectiveAction::DeleteInstances(r) => write!(f, "delete-instances {:?}", r),
            CorrectiveAction::UpdateStackSet => write!(f, "update-stack-set"),
            CorrectiveAction::NoOp(status) => write!(f, "no-op (stack set is {})", status),
        }
    }
}

/// Decide the corrective action for one reconciliation
pub fn plan_action(desired: &RegionSet, snapshot: Option<&StackSetSnapshot>) -> CorrectiveAction {
    let Some(snapshot) = snapshot else {
        return CorrectiveAction::CreateStackSet;
    };

    if !snapshot.status.is_active() {
        return CorrectiveAction::NoOp(snapshot.status.clone());
    }

    let current = &snapshot.regions;
    if desired == current {
        return CorrectiveAction::UpdateStackSet;
    }

    if desired.len() < current.len() {
        CorrectiveAction::DeleteInstances(RegionDiff::between(desired, current).removed)
    } else {
        CorrectiveAction::CreateInstances(desired.clone())
    }
}
