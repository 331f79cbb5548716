//! Lifecycle state machines for stateful kinds.
//!
//! A stateful resource carries a desired state (caller intent) and a
//! current state (reported truth). Which desired states a caller may
//! request is an allow-list keyed by the current state. DELETED is always
//! reachable.

use std::fmt;
use std::str::FromStr;

use crate::kind::ResourceKind;
use crate::{Error, Result};

/// Column holding caller intent
pub const DESIRED_STATE: &str = "desired_state";
/// Column holding reported state, privileged
pub const CURRENT_STATE: &str = "current_state";

/// A lifecycle state enum with its transition allow-list
pub trait LifecycleState:
    Copy + Eq + fmt::Debug + fmt::Display + FromStr<Err = Error> + 'static
{
    const UNSPECIFIED: Self;
    const DELETED: Self;

    fn as_str(&self) -> &'static str;

    /// Desired states a caller may request while in this current state
    fn allowed_desired(&self) -> &'static [Self];

    fn permits(&self, desired: Self) -> bool {
        desired == Self::DELETED || self.allowed_desired().contains(&desired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    Unspecified,
    Registered,
    Onboarded,
    Untrusted,
    Deleted,
}

impl LifecycleState for HostState {
    const UNSPECIFIED: Self = HostState::Unspecified;
    const DELETED: Self = HostState::Deleted;

    fn as_str(&self) -> &'static str {
        match self {
            HostState::Unspecified => "HOST_STATE_UNSPECIFIED",
            HostState::Registered => "HOST_STATE_REGISTERED",
            HostState::Onboarded => "HOST_STATE_ONBOARDED",
            HostState::Untrusted => "HOST_STATE_UNTRUSTED",
            HostState::Deleted => "HOST_STATE_DELETED",
        }
    }

    fn allowed_desired(&self) -> &'static [Self] {
        use HostState::*;
        match self {
            Unspecified => &[Registered, Onboarded, Deleted],
            Registered => &[Registered, Onboarded, Untrusted, Deleted],
            Onboarded => &[Onboarded, Untrusted, Deleted],
            Untrusted => &[Untrusted, Deleted],
            Deleted => &[Deleted],
        }
    }
}

impl FromStr for HostState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HOST_STATE_UNSPECIFIED" => Ok(HostState::Unspecified),
            "HOST_STATE_REGISTERED" => Ok(HostState::Registered),
            "HOST_STATE_ONBOARDED" => Ok(HostState::Onboarded),
            "HOST_STATE_UNTRUSTED" => Ok(HostState::Untrusted),
            "HOST_STATE_DELETED" => Ok(HostState::Deleted),
            _ => Err(Error::invalid(format!("unknown host state: {}", s))),
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instance states. UNTRUSTED is a trap: only DELETED may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Unspecified,
    Running,
    Stopped,
    Untrusted,
    Deleted,
}

impl LifecycleState for InstanceState {
    const UNSPECIFIED: Self = InstanceState::Unspecified;
    const DELETED: Self = InstanceState::Deleted;

    fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Unspecified => "INSTANCE_STATE_UNSPECIFIED",
            InstanceState::Running => "INSTANCE_STATE_RUNNING",
            InstanceState::Stopped => "INSTANCE_STATE_STOPPED",
            InstanceState::Untrusted => "INSTANCE_STATE_UNTRUSTED",
            InstanceState::Deleted => "INSTANCE_STATE_DELETED",
        }
    }

    fn allowed_desired(&self) -> &'static [Self] {
        use InstanceState::*;
        match self {
            Unspecified => &[Running, Stopped, Deleted],
            Running | Stopped => &[Running, Stopped, Untrusted, Deleted],
            Untrusted => &[Deleted],
            Deleted => &[Deleted],
        }
    }
}

impl FromStr for InstanceState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INSTANCE_STATE_UNSPECIFIED" => Ok(InstanceState::Unspecified),
            "INSTANCE_STATE_RUNNING" => Ok(InstanceState::Running),
            "INSTANCE_STATE_STOPPED" => Ok(InstanceState::Stopped),
            "INSTANCE_STATE_UNTRUSTED" => Ok(InstanceState::Untrusted),
            "INSTANCE_STATE_DELETED" => Ok(InstanceState::Deleted),
            _ => Err(Error::invalid(format!("unknown instance state: {}", s))),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn check<S: LifecycleState>(kind: ResourceKind, current: Option<&str>, desired: &str) -> Result<()> {
    let current = current.map(str::parse::<S>).transpose()?.unwrap_or(S::UNSPECIFIED);
    let desired: S = desired.parse()?;

    if current.permits(desired) {
        return Ok(());
    }

    tracing::warn!(%kind, %current, %desired, "rejected lifecycle transition");
    Err(Error::invalid(format!(
        "{} desired state {} is not allowed while current state is {}",
        kind, desired, current
    )))
}

fn not_stateful(kind: ResourceKind) -> Error {
    Error::Internal(format!("{} has no lifecycle", kind))
}

/// Validate a requested desired state against the current state.
///
/// An unset current state counts as UNSPECIFIED.
pub fn check_transition(kind: ResourceKind, current: Option<&str>, desired: &str) -> Result<()> {
    match kind {
        ResourceKind::Host => check::<HostState>(kind, current, desired),
        ResourceKind::Instance => check::<InstanceState>(kind, current, desired),
        other => Err(not_stateful(other)),
    }
}

/// Stored value of the DELETED state for a kind
pub fn deleted_value(kind: ResourceKind) -> Result<&'static str> {
    match kind {
        ResourceKind::Host => Ok(HostState::DELETED.as_str()),
        ResourceKind::Instance => Ok(InstanceState::DELETED.as_str()),
        other => Err(not_stateful(other)),
    }
}

/// Stored value of the UNSPECIFIED state for a kind
pub fn unspecified_value(kind: ResourceKind) -> Result<&'static str> {
    match kind {
        ResourceKind::Host => Ok(HostState::UNSPECIFIED.as_str()),
        ResourceKind::Instance => Ok(InstanceState::UNSPECIFIED.as_str()),
        other => Err(not_stateful(other)),
    }
}

/// Both states are DELETED, so the row may be removed
pub fn is_hard_delete(kind: ResourceKind, desired: Option<&str>, current: Option<&str>) -> Result<bool> {
    let deleted = deleted_value(kind)?;
    Ok(desired == Some(deleted) && current == Some(deleted))
}
