//! Sequencing state machines.
//!
//! One variant per SCORM edition, selected from the package format:
//! - [`Scorm2004SeqNav`]: the full Overall Sequencing Process with rule-based rollup.
//! - [`Scorm12SeqNav`]: the simplified 1.2 / LRM process (flow over launchable
//!   items, prerequisites, score aggregation only).
//!
//! Both operate on a `&mut NavigatorData`. Callers that need "no partial
//! application" hand in a working copy and commit it on success.

pub mod prerequisites;
pub mod rollup;
pub mod rules;
pub mod scorm12;
pub mod scorm2004;

pub use scorm12::Scorm12SeqNav;
pub use scorm2004::Scorm2004SeqNav;

use crate::activity::{ActivityId, PackageFormat};
use crate::error::{InternalError, Result};
use crate::navigator::data::NavigatorData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Commands ─────────────────────────────────────────────────

/// Navigation commands accepted by the navigator.
///
/// `Retry` and `RetryAll` are not commands: they only arise from
/// post-condition rules during termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationCommand {
    Start,
    ResumeAll,
    Continue,
    Previous,
    /// Choice of a specific activity; needs a destination.
    Choose,
    /// Start at the first leaf that accepts a choice.
    ChoiceStart,
    UnqualifiedExit,
    ExitAll,
    Abandon,
    AbandonAll,
    SuspendAll,
}

impl NavigationCommand {
    pub const ALL: [NavigationCommand; 11] = [
        Self::Start,
        Self::ResumeAll,
        Self::Continue,
        Self::Previous,
        Self::Choose,
        Self::ChoiceStart,
        Self::UnqualifiedExit,
        Self::ExitAll,
        Self::Abandon,
        Self::AbandonAll,
        Self::SuspendAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ResumeAll => "resume_all",
            Self::Continue => "continue",
            Self::Previous => "previous",
            Self::Choose => "choose",
            Self::ChoiceStart => "choice_start",
            Self::UnqualifiedExit => "unqualified_exit",
            Self::ExitAll => "exit_all",
            Self::Abandon => "abandon",
            Self::AbandonAll => "abandon_all",
            Self::SuspendAll => "suspend_all",
        }
    }
}

impl fmt::Display for NavigationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        if normalized == "exit" {
            return Ok(Self::UnqualifiedExit);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown navigation command '{s}'"))
    }
}

// ─── Internal requests ────────────────────────────────────────

/// Requests produced by the navigation and termination processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SequencingRequest {
    Choice,
    Continue,
    Exit,
    Previous,
    ResumeAll,
    Retry,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminationRequest {
    Abandon,
    AbandonAll,
    Exit,
    ExitAll,
    ExitParent,
    SuspendAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TraversalDirection {
    Forward,
    Backward,
    NotApplicable,
}

// ─── State machine ────────────────────────────────────────────

/// The sequencing implementation for one navigator, fixed at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencingStateMachine {
    Scorm2004(Scorm2004SeqNav),
    Scorm12(Scorm12SeqNav),
}

impl SequencingStateMachine {
    pub fn for_format(format: PackageFormat) -> Self {
        if format.is_simplified() {
            Self::Scorm12(Scorm12SeqNav)
        } else {
            Self::Scorm2004(Scorm2004SeqNav)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scorm2004(_) => "scorm2004",
            Self::Scorm12(_) => "scorm12",
        }
    }

    /// Run one navigation request to completion.
    ///
    /// Returns true when the sequencing session ended and the attempt
    /// should not be returned to.
    pub fn overall_sequencing_process(
        &self,
        data: &mut NavigatorData,
        command: NavigationCommand,
        destination: Option<ActivityId>,
    ) -> Result<bool> {
        if command == NavigationCommand::ChoiceStart {
            return Err(InternalError::UnsupportedCommand {
                command,
                variant: self.name(),
            }
            .into());
        }
        match self {
            Self::Scorm2004(seqnav) => seqnav.overall_sequencing_process(data, command, destination),
            Self::Scorm12(seqnav) => seqnav.overall_sequencing_process(data, command, destination),
        }
    }

    /// Roll tracking data up from `activity`. Only the 2004 family has
    /// rule-based rollup; the 1.2 family aggregates score on write instead.
    pub fn rollup(&self, data: &mut NavigatorData, activity: ActivityId) -> Result<()> {
        match self {
            Self::Scorm2004(seqnav) => seqnav.rollup(data, activity),
            Self::Scorm12(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse_accepts_display_form() {
        for command in NavigationCommand::ALL {
            assert_eq!(command.to_string().parse::<NavigationCommand>(), Ok(command));
        }
        assert_eq!("Exit-All".parse(), Ok(NavigationCommand::ExitAll));
        assert_eq!("exit".parse(), Ok(NavigationCommand::UnqualifiedExit));
        assert!("jump".parse::<NavigationCommand>().is_err());
    }

    #[test]
    fn test_format_selects_variant() {
        assert_eq!(
            SequencingStateMachine::for_format(PackageFormat::V1p2).name(),
            "scorm12"
        );
        assert_eq!(
            SequencingStateMachine::for_format(PackageFormat::Lrm).name(),
            "scorm12"
        );
        assert_eq!(
            SequencingStateMachine::for_format(PackageFormat::V1p3).name(),
            "scorm2004"
        );
    }
}
