//! Error types for sequencing and navigation.
//!
//! Three classes of failure exist:
//! - [`SequencingFailure`]: the request is illegal under the sequencing rules.
//!   Carries a stable clause code (`"NB.2.1-10"`, `"SB.2.1-1"`, ...).
//! - [`InternalError`]: a consistency violation inside the engine. Never user-facing.
//! - [`NavigatorError`]: what the public operations return, wrapping both of the
//!   above plus lookup and persistence failures.

use crate::activity::ActivityId;
use crate::navigator::AttemptStatus;
use crate::sequencing::NavigationCommand;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

// ─── Clause codes ───────────────────────────────────────────────────────────

/// Closed taxonomy of sequencing exception clauses.
///
/// Grouped by process: navigation request (`NB.2.1`), termination request
/// (`TB.2.3`), sequencing request (`SB.2.*`) and delivery request (`DB.*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencingCode {
    // NB.2.1 - navigation request process
    SessionAlreadyBegun,
    SessionNotBegun,
    NoSuspendedActivity,
    ContinueFlowViolation,
    PreviousFlowViolation,
    PreviousFromRoot,
    UnsupportedNavigationRequest,
    ChoiceExitViolation,
    NoActivitiesToConsider,
    ChoiceViolation,
    TargetDoesNotExist,
    CurrentAlreadyTerminated,
    UndefinedNavigationRequest,

    // TB.2.3 - termination request process
    TerminateWithoutSession,
    TerminateAlreadyTerminated,
    SuspendInactiveRoot,
    ExitParentFromRoot,
    NothingToSuspend,
    NothingToAbandon,
    UndefinedTerminationRequest,

    // SB.2.1 / SB.2.2 - flow traversal
    FlowPastLastActivity,
    FlowClusterEmpty,
    FlowBeforeRoot,
    FlowForwardOnlyViolation,
    FlowDisallowed,
    FlowActivityUnavailable,

    // SB.2.4 - choice activity traversal
    ChoiceForwardTraversalBlocked,
    ChoiceForwardOnlyViolation,
    ChoiceBeforeRoot,

    // SB.2.5 .. SB.2.8 - start, resume all, continue, previous
    StartAfterBegun,
    ResumeAfterBegun,
    ResumeWithoutSuspended,
    ContinueWithoutSession,
    ContinueFlowDisallowed,
    PreviousWithoutSession,
    PreviousFlowDisallowed,

    // SB.2.9 - choice sequencing request
    ChoiceNoTarget,
    ChoiceTargetUnavailable,
    ChoiceTargetHidden,
    ChoiceDisallowed,
    ChoiceNothingToConsider,
    ChoicePreventActivation,
    ChoiceExitDisallowed,
    ChoiceConstrained,
    ChoiceNothingToDeliver,

    // SB.2.10 .. SB.2.12 - retry, exit, overall
    RetryWithoutSession,
    RetryActiveActivity,
    RetryNothingToDeliver,
    ExitWithoutSession,
    ExitActiveActivity,
    UndefinedSequencingRequest,

    // DB - delivery request process
    DeliverCluster,
    DeliverNothing,
    DeliverUnavailable,
    DeliverAlreadyActive,
}

impl SequencingCode {
    /// Every code, in clause order.
    pub const ALL: [SequencingCode; 55] = [
        Self::SessionAlreadyBegun,
        Self::SessionNotBegun,
        Self::NoSuspendedActivity,
        Self::ContinueFlowViolation,
        Self::PreviousFlowViolation,
        Self::PreviousFromRoot,
        Self::UnsupportedNavigationRequest,
        Self::ChoiceExitViolation,
        Self::NoActivitiesToConsider,
        Self::ChoiceViolation,
        Self::TargetDoesNotExist,
        Self::CurrentAlreadyTerminated,
        Self::UndefinedNavigationRequest,
        Self::TerminateWithoutSession,
        Self::TerminateAlreadyTerminated,
        Self::SuspendInactiveRoot,
        Self::ExitParentFromRoot,
        Self::NothingToSuspend,
        Self::NothingToAbandon,
        Self::UndefinedTerminationRequest,
        Self::FlowPastLastActivity,
        Self::FlowClusterEmpty,
        Self::FlowBeforeRoot,
        Self::FlowForwardOnlyViolation,
        Self::FlowDisallowed,
        Self::FlowActivityUnavailable,
        Self::ChoiceForwardTraversalBlocked,
        Self::ChoiceForwardOnlyViolation,
        Self::ChoiceBeforeRoot,
        Self::StartAfterBegun,
        Self::ResumeAfterBegun,
        Self::ResumeWithoutSuspended,
        Self::ContinueWithoutSession,
        Self::ContinueFlowDisallowed,
        Self::PreviousWithoutSession,
        Self::PreviousFlowDisallowed,
        Self::ChoiceNoTarget,
        Self::ChoiceTargetUnavailable,
        Self::ChoiceTargetHidden,
        Self::ChoiceDisallowed,
        Self::ChoiceNothingToConsider,
        Self::ChoicePreventActivation,
        Self::ChoiceExitDisallowed,
        Self::ChoiceConstrained,
        Self::ChoiceNothingToDeliver,
        Self::RetryWithoutSession,
        Self::RetryActiveActivity,
        Self::RetryNothingToDeliver,
        Self::ExitWithoutSession,
        Self::ExitActiveActivity,
        Self::UndefinedSequencingRequest,
        Self::DeliverCluster,
        Self::DeliverNothing,
        Self::DeliverUnavailable,
        Self::DeliverAlreadyActive,
    ];

    /// Stable clause string, e.g. `"NB.2.1-10"`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionAlreadyBegun => "NB.2.1-1",
            Self::SessionNotBegun => "NB.2.1-2",
            Self::NoSuspendedActivity => "NB.2.1-3",
            Self::ContinueFlowViolation => "NB.2.1-4",
            Self::PreviousFlowViolation => "NB.2.1-5",
            Self::PreviousFromRoot => "NB.2.1-6",
            Self::UnsupportedNavigationRequest => "NB.2.1-7",
            Self::ChoiceExitViolation => "NB.2.1-8",
            Self::NoActivitiesToConsider => "NB.2.1-9",
            Self::ChoiceViolation => "NB.2.1-10",
            Self::TargetDoesNotExist => "NB.2.1-11",
            Self::CurrentAlreadyTerminated => "NB.2.1-12",
            Self::UndefinedNavigationRequest => "NB.2.1-13",
            Self::TerminateWithoutSession => "TB.2.3-1",
            Self::TerminateAlreadyTerminated => "TB.2.3-2",
            Self::SuspendInactiveRoot => "TB.2.3-3",
            Self::ExitParentFromRoot => "TB.2.3-4",
            Self::NothingToSuspend => "TB.2.3-5",
            Self::NothingToAbandon => "TB.2.3-6",
            Self::UndefinedTerminationRequest => "TB.2.3-7",
            Self::FlowPastLastActivity => "SB.2.1-1",
            Self::FlowClusterEmpty => "SB.2.1-2",
            Self::FlowBeforeRoot => "SB.2.1-3",
            Self::FlowForwardOnlyViolation => "SB.2.1-4",
            Self::FlowDisallowed => "SB.2.2-1",
            Self::FlowActivityUnavailable => "SB.2.2-2",
            Self::ChoiceForwardTraversalBlocked => "SB.2.4-1",
            Self::ChoiceForwardOnlyViolation => "SB.2.4-2",
            Self::ChoiceBeforeRoot => "SB.2.4-3",
            Self::StartAfterBegun => "SB.2.5-1",
            Self::ResumeAfterBegun => "SB.2.6-1",
            Self::ResumeWithoutSuspended => "SB.2.6-2",
            Self::ContinueWithoutSession => "SB.2.7-1",
            Self::ContinueFlowDisallowed => "SB.2.7-2",
            Self::PreviousWithoutSession => "SB.2.8-1",
            Self::PreviousFlowDisallowed => "SB.2.8-2",
            Self::ChoiceNoTarget => "SB.2.9-1",
            Self::ChoiceTargetUnavailable => "SB.2.9-2",
            Self::ChoiceTargetHidden => "SB.2.9-3",
            Self::ChoiceDisallowed => "SB.2.9-4",
            Self::ChoiceNothingToConsider => "SB.2.9-5",
            Self::ChoicePreventActivation => "SB.2.9-6",
            Self::ChoiceExitDisallowed => "SB.2.9-7",
            Self::ChoiceConstrained => "SB.2.9-8",
            Self::ChoiceNothingToDeliver => "SB.2.9-9",
            Self::RetryWithoutSession => "SB.2.10-1",
            Self::RetryActiveActivity => "SB.2.10-2",
            Self::RetryNothingToDeliver => "SB.2.10-3",
            Self::ExitWithoutSession => "SB.2.11-1",
            Self::ExitActiveActivity => "SB.2.11-2",
            Self::UndefinedSequencingRequest => "SB.2.12-1",
            Self::DeliverCluster => "DB.1.1-1",
            Self::DeliverNothing => "DB.1.1-2",
            Self::DeliverUnavailable => "DB.1.1-3",
            Self::DeliverAlreadyActive => "DB.2-1",
        }
    }

    /// Human-readable description of the violated condition.
    pub fn message(&self) -> &'static str {
        match self {
            Self::SessionAlreadyBegun => "The sequencing session has already begun.",
            Self::SessionNotBegun => "The sequencing session has not begun; there is no current activity.",
            Self::NoSuspendedActivity => "There is no suspended activity to resume.",
            Self::ContinueFlowViolation => "Flow navigation is not allowed within the parent of the current activity.",
            Self::PreviousFlowViolation => "Backward flow navigation is not allowed within the parent of the current activity.",
            Self::PreviousFromRoot => "There is no activity previous to the root of the activity tree.",
            Self::UnsupportedNavigationRequest => "The navigation request is not supported.",
            Self::ChoiceExitViolation => "An active ancestor of the current activity does not allow choice exit.",
            Self::NoActivitiesToConsider => "There are no activities to consider.",
            Self::ChoiceViolation => "The parent of the target activity does not allow choice navigation.",
            Self::TargetDoesNotExist => "The target activity does not exist.",
            Self::CurrentAlreadyTerminated => "The current activity has already been terminated.",
            Self::UndefinedNavigationRequest => "The navigation request is undefined.",
            Self::TerminateWithoutSession => "Cannot terminate: the sequencing session has not begun.",
            Self::TerminateAlreadyTerminated => "The current activity has already been terminated.",
            Self::SuspendInactiveRoot => "Cannot suspend an inactive root activity.",
            Self::ExitParentFromRoot => "The root of the activity tree has no parent to exit.",
            Self::NothingToSuspend => "There is nothing to suspend.",
            Self::NothingToAbandon => "There is nothing to abandon.",
            Self::UndefinedTerminationRequest => "The termination request is undefined.",
            Self::FlowPastLastActivity => "The activity is the last activity in the activity tree.",
            Self::FlowClusterEmpty => "The cluster has no available children.",
            Self::FlowBeforeRoot => "There is no activity previous to the root of the activity tree.",
            Self::FlowForwardOnlyViolation => "The parent activity only allows forward traversal.",
            Self::FlowDisallowed => "The parent activity does not allow flow navigation.",
            Self::FlowActivityUnavailable => "The activity is disabled or has exceeded its limit conditions.",
            Self::ChoiceForwardTraversalBlocked => "A stop forward traversal rule prevents moving past this activity.",
            Self::ChoiceForwardOnlyViolation => "The parent activity only allows forward traversal.",
            Self::ChoiceBeforeRoot => "There is no activity previous to the root of the activity tree.",
            Self::StartAfterBegun => "Cannot start: the sequencing session has already begun.",
            Self::ResumeAfterBegun => "Cannot resume: the sequencing session has already begun.",
            Self::ResumeWithoutSuspended => "There is no suspended activity to resume.",
            Self::ContinueWithoutSession => "Cannot continue: the sequencing session has not begun.",
            Self::ContinueFlowDisallowed => "The parent of the current activity does not allow flow navigation.",
            Self::PreviousWithoutSession => "Cannot move to previous: the sequencing session has not begun.",
            Self::PreviousFlowDisallowed => "The parent of the current activity does not allow flow navigation.",
            Self::ChoiceNoTarget => "No target activity was given for the choice request.",
            Self::ChoiceTargetUnavailable => "The target activity does not exist or is unavailable.",
            Self::ChoiceTargetHidden => "The target activity is hidden from choice.",
            Self::ChoiceDisallowed => "The parent of the target activity does not allow choice navigation.",
            Self::ChoiceNothingToConsider => "There are no activities to consider for the choice request.",
            Self::ChoicePreventActivation => "An activity on the path to the target prevents activation.",
            Self::ChoiceExitDisallowed => "An activity that must be exited does not allow choice exit.",
            Self::ChoiceConstrained => "The target activity is outside the constrained choice range.",
            Self::ChoiceNothingToDeliver => "Nothing can be delivered from the target activity.",
            Self::RetryWithoutSession => "Cannot retry: the sequencing session has not begun.",
            Self::RetryActiveActivity => "Cannot retry an activity that is active or suspended.",
            Self::RetryNothingToDeliver => "Nothing can be delivered from the retried activity.",
            Self::ExitWithoutSession => "Cannot exit: the sequencing session has not begun.",
            Self::ExitActiveActivity => "Cannot exit an activity that has not been terminated.",
            Self::UndefinedSequencingRequest => "The sequencing request is undefined.",
            Self::DeliverCluster => "Only leaf activities can be delivered.",
            Self::DeliverNothing => "There is nothing to deliver.",
            Self::DeliverUnavailable => "The activity is disabled, has exceeded its limits, or its prerequisites are not met.",
            Self::DeliverAlreadyActive => "The activity to deliver is already active.",
        }
    }

    /// Look a code up by its clause string.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl fmt::Display for SequencingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for SequencingCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// The request is illegal under the sequencing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("[{code}] {}", .code.message())]
pub struct SequencingFailure {
    pub code: SequencingCode,
}

impl SequencingFailure {
    pub fn new(code: SequencingCode) -> Self {
        Self { code }
    }

    /// Stable clause string.
    pub fn code(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &'static str {
        self.code.message()
    }
}

impl From<SequencingCode> for SequencingFailure {
    fn from(code: SequencingCode) -> Self {
        Self::new(code)
    }
}

// ─── Internal consistency ───────────────────────────────────────────────────

/// Programming-error class failures. Not expected to be recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("root activity is already set")]
    RootAlreadySet,

    #[error("activity tree has no root")]
    MissingRoot,

    #[error("activity {0} is not part of this tree")]
    DetachedActivity(ActivityId),

    #[error("activities {0} and {1} share no common ancestor")]
    NoCommonAncestor(ActivityId, ActivityId),

    #[error("activity '{activity}' references unknown objective '{objective}'")]
    UnknownObjective { activity: String, objective: String },

    #[error("{command} is not handled by the {variant} state machine")]
    UnsupportedCommand {
        command: NavigationCommand,
        variant: &'static str,
    },
}

// ─── Public operation error ─────────────────────────────────────────────────

/// Error returned by navigator operations.
#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error(transparent)]
    Sequencing(#[from] SequencingFailure),

    #[error("internal consistency error: {0}")]
    Internal(#[from] InternalError),

    #[error("unknown activity '{0}'")]
    UnknownActivity(String),

    #[error("no current activity")]
    NoCurrentActivity,

    #[error("could not find a first activity to deliver")]
    NoDeliverableActivity,

    #[error("{0} cannot be issued through this operation")]
    InvalidCommand(NavigationCommand),

    #[error("the attempt is {0}; no further navigation is possible")]
    AttemptEnded(AttemptStatus),

    #[error("the attempt is {0}; auto-grading needs a completed or abandoned attempt")]
    AttemptNotEnded(AttemptStatus),

    #[error("not allowed while in auto-grading mode")]
    AutoGradingActive,

    #[error("auto-grading mode has not begun")]
    AutoGradingNotBegun,

    #[error("invalid prerequisite script '{script}': {reason}")]
    Prerequisites { script: String, reason: String },

    #[error("activity store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl NavigatorError {
    /// Check if this error is a rule violation rather than a failure of the engine.
    pub fn is_sequencing_failure(&self) -> bool {
        matches!(self, NavigatorError::Sequencing(_))
    }

    /// Check if this error indicates a programming error.
    pub fn is_bug(&self) -> bool {
        matches!(self, NavigatorError::Internal(_))
    }

    /// The clause code, when this is a sequencing failure.
    pub fn sequencing_code(&self) -> Option<SequencingCode> {
        match self {
            NavigatorError::Sequencing(failure) => Some(failure.code),
            _ => None,
        }
    }
}

impl From<SequencingCode> for NavigatorError {
    fn from(code: SequencingCode) -> Self {
        NavigatorError::Sequencing(SequencingFailure::new(code))
    }
}

pub type Result<T, E = NavigatorError> = std::result::Result<T, E>;
