//! Navigator: the public face of the engine.
//!
//! A `Navigator` owns one learner's [`NavigatorData`] and runs navigation
//! requests against it through the state machine chosen for the package
//! format. Two execution modes share the same interpreter:
//!
//! - **Simulation** (`is_navigation_valid*`): the request runs against a
//!   throwaway clone; a sequencing failure becomes `false`.
//! - **Execution** (`navigate*`): the request runs against a working clone
//!   that replaces the live state only when the whole request succeeded.
//!
//! Activities written by a committed request collect in a dirty set that
//! [`Navigator::save`] drains into an [`ActivityStore`].
//!
//! An ended attempt can be reopened read-only in auto-grading mode, where
//! `Continue` and `Previous` step through every activity that launches a
//! resource without running sequencing.

pub mod data;
pub mod log;
pub mod store;
pub mod toc;

use crate::activity::{
    Activity, ActivityId, ExitMode, LearningDataModel, PackageDefinition, PackageFormat,
};
use crate::config::NavigatorConfig;
use crate::error::{NavigatorError, Result, SequencingCode};
use crate::sequencing::{NavigationCommand, SequencingStateMachine};
use data::{GlobalObjective, NavigatorData};
use log::{SequencingEventType, SequencingLog};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::collections::BTreeSet;
use std::fmt;
use store::{ActivityRecord, ActivityStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of the learner's attempt on the whole package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    Active,
    Completed,
    Suspended,
    Abandoned,
}

impl AttemptStatus {
    /// Derive the status that follows a successful navigation.
    pub fn after(command: NavigationCommand, session_ended: bool) -> Self {
        if !session_ended {
            return Self::Active;
        }
        match command {
            NavigationCommand::Abandon | NavigationCommand::AbandonAll => Self::Abandoned,
            NavigationCommand::SuspendAll => Self::Suspended,
            _ => Self::Completed,
        }
    }

    /// No further navigation is accepted once an attempt is completed or abandoned.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Suspended => "suspended",
            Self::Abandoned => "abandoned",
        })
    }
}

pub struct Navigator {
    data: NavigatorData,
    config: NavigatorConfig,
    /// Chosen from the package format on first use.
    state_machine: OnceLock<SequencingStateMachine>,
    dirty: BTreeSet<ActivityId>,
    attempt_status: AttemptStatus,
    auto_grading: bool,
}

impl Navigator {
    pub fn new(package: &PackageDefinition, config: NavigatorConfig) -> Result<Self> {
        let data = NavigatorData::new(package, &config)?;
        info!(
            format = ?package.format,
            activities = data.tree().len(),
            root = %package.root.key,
            "activity tree loaded"
        );
        Ok(Self::from_data(data, config))
    }

    /// Wrap an existing state, for example one restored by a host.
    pub fn from_data(data: NavigatorData, config: NavigatorConfig) -> Self {
        Self {
            data,
            config,
            state_machine: OnceLock::new(),
            dirty: BTreeSet::new(),
            attempt_status: AttemptStatus::Active,
            auto_grading: false,
        }
    }

    // ── Accessors ──

    pub fn data(&self) -> &NavigatorData {
        &self.data
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn format(&self) -> PackageFormat {
        self.data.format()
    }

    pub fn attempt_status(&self) -> AttemptStatus {
        self.attempt_status
    }

    /// Restore the status of an attempt loaded from storage.
    pub fn set_attempt_status(&mut self, status: AttemptStatus) {
        self.attempt_status = status;
    }

    pub fn current_activity(&self) -> Option<&Activity> {
        self.data.current().map(|id| &self.data.tree()[id])
    }

    pub fn suspended_activity(&self) -> Option<&Activity> {
        self.data.suspended().map(|id| &self.data.tree()[id])
    }

    pub fn activity(&self, key: &str) -> Option<&Activity> {
        self.data
            .activity_key_to_activity(key)
            .map(|id| &self.data.tree()[id])
    }

    /// Activities written since the last successful save.
    pub fn dirty_activities(&self) -> impl Iterator<Item = &Activity> + '_ {
        self.dirty.iter().map(|id| &self.data.tree()[*id])
    }

    pub fn sequencing_log(&self) -> Option<&SequencingLog> {
        self.data.sequencing_log()
    }

    pub fn state_machine(&self) -> SequencingStateMachine {
        *self
            .state_machine
            .get_or_init(|| SequencingStateMachine::for_format(self.data.format()))
    }

    pub fn is_auto_grading(&self) -> bool {
        self.auto_grading
    }

    fn ensure_not_grading(&self) -> Result<()> {
        if self.auto_grading {
            return Err(NavigatorError::AutoGradingActive);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        self.ensure_not_grading()?;
        if self.attempt_status.is_closed() {
            return Err(NavigatorError::AttemptEnded(self.attempt_status));
        }
        Ok(())
    }

    // ── Validity checks ──

    /// Whether `command` would succeed now. Choice uses
    /// [`is_navigation_to_valid`](Self::is_navigation_to_valid) instead.
    pub fn is_navigation_valid(&self, command: NavigationCommand) -> Result<bool> {
        match command {
            NavigationCommand::Choose => Err(NavigatorError::InvalidCommand(command)),
            NavigationCommand::ChoiceStart => {
                let root = self.data.root()?;
                self.is_navigation_to_valid_id(root)
            }
            _ => {
                self.ensure_open()?;
                self.simulate(command, None)
            }
        }
    }

    /// Whether a choice of the activity with package key `key` would succeed.
    /// An unknown key is simply not a valid target.
    pub fn is_navigation_to_valid(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        match self.data.activity_key_to_activity(key) {
            Some(id) => self.simulate(NavigationCommand::Choose, Some(id)),
            None => Ok(false),
        }
    }

    pub fn is_navigation_to_valid_id(&self, id: ActivityId) -> Result<bool> {
        self.ensure_open()?;
        match self.data.activity_by_id(id) {
            Some(id) => self.simulate(NavigationCommand::Choose, Some(id)),
            None => Ok(false),
        }
    }

    /// Run a request against a disposable clone.
    fn simulate(&self, command: NavigationCommand, destination: Option<ActivityId>) -> Result<bool> {
        let mut clone = self.data.clone_for_navigation_test();
        match self
            .state_machine()
            .overall_sequencing_process(&mut clone, command, destination)
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_sequencing_failure() => {
                debug!(%command, ?destination, %err, "simulated navigation rejected");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    // ── Navigation ──

    /// Execute `command`. Choice uses [`navigate_to`](Self::navigate_to).
    pub fn navigate(&mut self, command: NavigationCommand) -> Result<()> {
        if self.auto_grading {
            return self.grading_step(command);
        }
        self.ensure_open()?;
        match command {
            NavigationCommand::Choose => Err(NavigatorError::InvalidCommand(command)),
            NavigationCommand::ChoiceStart => self.choice_start(),
            _ => self.execute(command, None),
        }
    }

    /// Choose the activity with package key `key`.
    pub fn navigate_to(&mut self, key: &str) -> Result<()> {
        self.ensure_open()?;
        let id = self
            .data
            .activity_key_to_activity(key)
            .ok_or_else(|| NavigatorError::UnknownActivity(key.to_string()))?;
        self.execute(NavigationCommand::Choose, Some(id))
    }

    pub fn navigate_to_id(&mut self, id: ActivityId) -> Result<()> {
        self.ensure_open()?;
        let id = self
            .data
            .activity_by_id(id)
            .ok_or_else(|| NavigatorError::UnknownActivity(id.to_string()))?;
        self.execute(NavigationCommand::Choose, Some(id))
    }

    /// Choose the first leaf, in preorder, that accepts a choice.
    fn choice_start(&mut self) -> Result<()> {
        let leaves: Vec<_> = self
            .data
            .tree()
            .preorder()
            .into_iter()
            .filter(|id| self.data.tree().is_leaf(*id))
            .collect();
        for leaf in leaves {
            match self.execute(NavigationCommand::Choose, Some(leaf)) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_sequencing_failure() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(NavigatorError::NoDeliverableActivity)
    }

    /// Run a request on a working copy and commit it on success.
    fn execute(&mut self, command: NavigationCommand, destination: Option<ActivityId>) -> Result<()> {
        let mut working = self.data.clone_for_navigation_test();
        let session_ended = match self
            .state_machine()
            .overall_sequencing_process(&mut working, command, destination)
        {
            Ok(ended) => ended,
            Err(err) => {
                self.data.record(
                    SequencingEventType::FinalNavigation,
                    Some(command),
                    destination,
                    format!("rejected: {err}"),
                );
                return Err(err);
            }
        };

        let outcome = match working.current() {
            Some(_) => "delivered",
            None if session_ended => "session ended",
            None => "no current activity",
        };
        let subject = working.current().or(destination);
        working.record(SequencingEventType::FinalNavigation, Some(command), subject, outcome);

        let touched = self.data.commit(working);
        self.dirty.extend(touched);
        self.attempt_status = AttemptStatus::after(command, session_ended);
        Ok(())
    }

    /// Act on a navigation request the current content embedded in its data
    /// model. Returns whether a navigation was executed.
    ///
    /// An exit mode takes precedence over an embedded command. A `Suspended`
    /// exit only suspends the current activity (followed by rollup for 2004
    /// packages) and reports `false`.
    pub fn process_data_model_navigation(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let current = self.data.current().ok_or(NavigatorError::NoCurrentActivity)?;
        let model = self.data.model(current);
        let exit = model.exit;
        let embedded = model.navigation_request.clone();
        let full_sequencing = !self.format().is_simplified();

        let command = match exit {
            Some(ExitMode::TimeOut) if full_sequencing => Some(NavigationCommand::ExitAll),
            Some(ExitMode::Logout) => Some(NavigationCommand::SuspendAll),
            Some(ExitMode::Suspended) => {
                self.suspend_current(current)?;
                return Ok(false);
            }
            _ => None,
        };

        let request = match command {
            Some(command) => Some((command, None)),
            None => embedded.map(|r| (r.command, r.destination)),
        };
        match request {
            None => Ok(false),
            Some((NavigationCommand::Choose, destination)) => {
                let key = destination.ok_or(SequencingCode::TargetDoesNotExist)?;
                self.navigate_to(&key)?;
                Ok(true)
            }
            Some((command, _)) => {
                self.navigate(command)?;
                Ok(true)
            }
        }
    }

    fn suspend_current(&mut self, current: ActivityId) -> Result<()> {
        let mut working = self.data.clone_for_navigation_test();
        let model = working.model_mut(current);
        model.is_active = false;
        model.is_suspended = true;
        self.state_machine().rollup(&mut working, current)?;
        let touched = self.data.commit(working);
        self.dirty.extend(touched);
        Ok(())
    }

    // ── Auto-grading ──

    /// Reopen an ended attempt for grading.
    ///
    /// The current activity becomes the first one in preorder that launches a
    /// resource. Until [`end_auto_grading_mode`](Self::end_auto_grading_mode)
    /// only `Continue` and `Previous` navigate. Data-model writes stay allowed.
    pub fn begin_auto_grading_mode(&mut self) -> Result<()> {
        if !self.attempt_status.is_closed() {
            return Err(NavigatorError::AttemptNotEnded(self.attempt_status));
        }
        self.ensure_not_grading()?;
        self.auto_grading = true;
        let first = self
            .data
            .tree()
            .preorder()
            .into_iter()
            .find(|id| self.data.tree()[*id].has_resource());
        self.move_grading_cursor(first);
        info!(attempt = %self.attempt_status, "auto-grading mode started");
        Ok(())
    }

    pub fn end_auto_grading_mode(&mut self) -> Result<()> {
        if !self.auto_grading {
            return Err(NavigatorError::AutoGradingNotBegun);
        }
        self.auto_grading = false;
        self.move_grading_cursor(None);
        info!("auto-grading mode ended");
        Ok(())
    }

    /// Step to the neighbouring activity with a resource. No rules, no rollup.
    fn grading_step(&mut self, command: NavigationCommand) -> Result<()> {
        let current = self.data.current().ok_or(SequencingCode::SessionNotBegun)?;
        let tree = self.data.tree();
        let target = match command {
            NavigationCommand::Continue => {
                std::iter::successors(tree.next_in_preorder(current), |id| {
                    tree.next_in_preorder(*id)
                })
                .find(|id| tree[*id].has_resource())
                .ok_or(SequencingCode::FlowPastLastActivity)?
            }
            NavigationCommand::Previous => {
                std::iter::successors(tree.previous_in_preorder(current), |id| {
                    tree.previous_in_preorder(*id)
                })
                .find(|id| tree[*id].has_resource())
                .ok_or(SequencingCode::FlowBeforeRoot)?
            }
            _ => return Err(NavigatorError::AutoGradingActive),
        };
        self.move_grading_cursor(Some(target));
        self.data.record(
            SequencingEventType::FinalNavigation,
            Some(command),
            Some(target),
            "auto-grading",
        );
        Ok(())
    }

    /// Grading moves never dirty an activity.
    fn move_grading_cursor(&mut self, target: Option<ActivityId>) {
        if let Some(current) = self.data.current() {
            self.data.model_mut(current).is_active = false;
        }
        if let Some(target) = target {
            self.data.model_mut(target).is_active = true;
        }
        self.data.set_current(target);
        self.data.take_touched();
    }

    // ── Tracking data writes ──

    /// Apply a learner data-model write to one activity, then roll up.
    ///
    /// The write and the rollup commit together.
    pub fn update_activity<F>(&mut self, id: ActivityId, write: F) -> Result<()>
    where
        F: FnOnce(&mut LearningDataModel),
    {
        let id = self
            .data
            .activity_by_id(id)
            .ok_or_else(|| NavigatorError::UnknownActivity(id.to_string()))?;
        let mut working = self.data.clone_for_navigation_test();
        write(working.model_mut(id));
        self.state_machine().rollup(&mut working, id)?;
        let touched = self.data.commit(working);
        self.dirty.extend(touched);
        Ok(())
    }

    /// Set the points one activity contributes to the tree-wide total.
    pub fn set_evaluation_points(&mut self, id: ActivityId, points: Option<f32>) -> Result<()> {
        let id = self
            .data
            .activity_by_id(id)
            .ok_or_else(|| NavigatorError::UnknownActivity(id.to_string()))?;
        self.data.set_evaluation_points(id, points);
        self.dirty.extend(self.data.take_touched());
        Ok(())
    }

    /// Seed or overwrite a shared objective, e.g. from another package.
    pub fn set_global_objective(&mut self, name: &str, value: GlobalObjective) {
        self.data.set_global_objective(name, value);
    }

    /// Nearest activity that is an ancestor of (or equal to) both. With only
    /// one activity given, that activity is the answer.
    pub fn find_common_ancestor(&self, a: Option<ActivityId>, b: ActivityId) -> Result<ActivityId> {
        match a {
            None => Ok(b),
            Some(a) => Ok(self.data.tree().find_common_ancestor(a, b)?),
        }
    }

    // ── Persistence ──

    /// Hand every dirty activity to `store` and clear the dirty set.
    /// Refused in auto-grading mode.
    ///
    /// Activities without a persistence id get one here. On failure the dirty
    /// set is kept for the next attempt. Returns the number of records written.
    pub async fn save(&mut self, store: &dyn ActivityStore) -> Result<usize> {
        self.ensure_not_grading()?;
        if self.dirty.is_empty() {
            debug!("nothing to save");
            return Ok(0);
        }
        let dirty = std::mem::take(&mut self.dirty);
        let mut records = Vec::with_capacity(dirty.len());
        for id in &dirty {
            let persistence_id = match self.data.tree()[*id].persistence_id() {
                Some(existing) => existing,
                None => {
                    let assigned = Uuid::new_v4();
                    self.data.tree_mut().node_mut(*id).set_persistence_id(assigned);
                    assigned
                }
            };
            records.push(ActivityRecord::snapshot(&self.data.tree()[*id], persistence_id));
        }

        if let Err(err) = store.save_activities(&records).await {
            warn!(count = records.len(), error = %err, "saving activities failed");
            self.dirty.extend(dirty);
            return Err(NavigatorError::Store(err));
        }
        info!(count = records.len(), "saved activities");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::definition::{
        ActivityDefinition, RuleAction, RuleCondition, RuleConditionKind, SequencingDefinition,
        SequencingRule,
    };
    use crate::activity::{CompletionStatus, ContentNavigationRequest, LessonStatus};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use store::MemoryStore;

    fn config() -> NavigatorConfig {
        NavigatorConfig {
            random_seed: Some(11),
            record_sequencing_log: true,
            ..NavigatorConfig::default()
        }
    }

    fn linear(format: PackageFormat) -> Navigator {
        let package = PackageDefinition {
            format,
            root: ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    ActivityDefinition::leaf("b", "B"),
                    ActivityDefinition::leaf("c", "C"),
                ],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        };
        Navigator::new(&package, config()).unwrap()
    }

    fn current_key(nav: &Navigator) -> Option<&str> {
        nav.current_activity().map(|a| a.key())
    }

    #[test]
    fn test_state_machine_follows_format() {
        assert_eq!(linear(PackageFormat::V1p3).state_machine().name(), "scorm2004");
        assert_eq!(linear(PackageFormat::V1p2).state_machine().name(), "scorm12");
        assert_eq!(linear(PackageFormat::Lrm).state_machine().name(), "scorm12");
    }

    #[test]
    fn test_validity_checks_run_across_threads() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let nav = &nav;
        std::thread::scope(|scope| {
            let workers: Vec<_> = ["b", "c"]
                .into_iter()
                .map(|key| scope.spawn(move || nav.is_navigation_to_valid(key).unwrap()))
                .collect();
            for worker in workers {
                assert!(worker.join().unwrap());
            }
        });
        assert_eq!(current_key(nav), Some("a"));
    }

    #[test]
    fn test_validity_check_leaves_state_alone() {
        let nav = linear(PackageFormat::V1p3);
        assert!(nav.is_navigation_valid(NavigationCommand::Start).unwrap());
        assert!(!nav.is_navigation_valid(NavigationCommand::Continue).unwrap());
        assert!(nav.current_activity().is_none());
        assert_eq!(nav.dirty_activities().count(), 0);
    }

    #[test]
    fn test_choose_through_navigate_is_rejected() {
        let mut nav = linear(PackageFormat::V1p3);
        assert!(matches!(
            nav.navigate(NavigationCommand::Choose),
            Err(NavigatorError::InvalidCommand(NavigationCommand::Choose))
        ));
        assert!(matches!(
            nav.is_navigation_valid(NavigationCommand::Choose),
            Err(NavigatorError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_failed_navigation_commits_nothing() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        nav.navigate(NavigationCommand::Continue).unwrap();
        nav.navigate(NavigationCommand::Continue).unwrap();
        let before = nav.data().tree()[nav.data().current().unwrap()]
            .data_model()
            .clone();

        let err = nav.navigate(NavigationCommand::Continue).unwrap_err();
        assert_eq!(err.sequencing_code(), Some(SequencingCode::FlowPastLastActivity));
        assert_eq!(current_key(&nav), Some("c"));
        assert_eq!(nav.current_activity().unwrap().data_model(), &before);
    }

    #[test]
    fn test_navigate_to_unknown_key() {
        let mut nav = linear(PackageFormat::V1p3);
        assert!(matches!(
            nav.navigate_to("nope"),
            Err(NavigatorError::UnknownActivity(key)) if key == "nope"
        ));
        assert!(!nav.is_navigation_to_valid("nope").unwrap());
    }

    #[test]
    fn test_choice_start_skips_blocked_leaves() {
        let package = PackageDefinition {
            format: PackageFormat::V1p3,
            root: ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A").with_sequencing(
                        SequencingDefinition::default().with_pre_condition(SequencingRule::new(
                            RuleAction::Disabled,
                            vec![RuleCondition::new(RuleConditionKind::Always)],
                        )),
                    ),
                    ActivityDefinition::leaf("b", "B"),
                ],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        };
        let mut nav = Navigator::new(&package, config()).unwrap();
        nav.navigate(NavigationCommand::ChoiceStart).unwrap();
        assert_eq!(current_key(&nav), Some("b"));
    }

    #[test]
    fn test_exit_all_closes_the_attempt() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        nav.navigate(NavigationCommand::ExitAll).unwrap();
        assert_eq!(nav.attempt_status(), AttemptStatus::Completed);
        assert!(matches!(
            nav.navigate(NavigationCommand::Start),
            Err(NavigatorError::AttemptEnded(AttemptStatus::Completed))
        ));
    }

    #[test]
    fn test_suspend_all_keeps_attempt_open() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        nav.navigate(NavigationCommand::SuspendAll).unwrap();
        assert_eq!(nav.attempt_status(), AttemptStatus::Suspended);
        nav.navigate(NavigationCommand::ResumeAll).unwrap();
        assert_eq!(nav.attempt_status(), AttemptStatus::Active);
        assert_eq!(current_key(&nav), Some("a"));
    }

    #[test]
    fn test_content_requested_continue() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let a = nav.data().current().unwrap();
        nav.update_activity(a, |model| {
            model.navigation_request = Some(ContentNavigationRequest {
                command: NavigationCommand::Continue,
                destination: None,
            });
        })
        .unwrap();
        assert!(nav.process_data_model_navigation().unwrap());
        assert_eq!(current_key(&nav), Some("b"));
    }

    #[test]
    fn test_content_requested_choice() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let a = nav.data().current().unwrap();
        nav.update_activity(a, |model| {
            model.navigation_request = Some(ContentNavigationRequest {
                command: NavigationCommand::Choose,
                destination: Some("c".into()),
            });
        })
        .unwrap();
        assert!(nav.process_data_model_navigation().unwrap());
        assert_eq!(current_key(&nav), Some("c"));
    }

    #[test]
    fn test_suspended_exit_mode_only_suspends() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let a = nav.data().current().unwrap();
        nav.update_activity(a, |model| model.exit = Some(ExitMode::Suspended))
            .unwrap();
        assert!(!nav.process_data_model_navigation().unwrap());
        let model = nav.data().model(a);
        assert!(model.is_suspended);
        assert!(!model.is_active);
        assert_eq!(nav.data().current(), Some(a));
    }

    #[test]
    fn test_timeout_exit_mode_ends_attempt() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let a = nav.data().current().unwrap();
        nav.update_activity(a, |model| model.exit = Some(ExitMode::TimeOut))
            .unwrap();
        assert!(nav.process_data_model_navigation().unwrap());
        assert_eq!(nav.attempt_status(), AttemptStatus::Completed);
    }

    #[test]
    fn test_process_without_current_activity() {
        let mut nav = linear(PackageFormat::V1p3);
        assert!(matches!(
            nav.process_data_model_navigation(),
            Err(NavigatorError::NoCurrentActivity)
        ));
    }

    #[test]
    fn test_update_activity_rolls_up() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        for _ in 0..2 {
            let current = nav.data().current().unwrap();
            nav.update_activity(current, |m| m.completion_status = CompletionStatus::Completed)
                .unwrap();
            nav.navigate(NavigationCommand::Continue).unwrap();
        }
        let c = nav.data().current().unwrap();
        nav.update_activity(c, |m| m.completion_status = CompletionStatus::Completed)
            .unwrap();
        let root = nav.data().root().unwrap();
        assert_eq!(nav.data().model(root).completion_status, CompletionStatus::Completed);
    }

    #[test]
    fn test_scorm12_score_total() {
        let mut nav = linear(PackageFormat::V1p2);
        let a = nav.data().activity_key_to_activity("a").unwrap();
        let c = nav.data().activity_key_to_activity("c").unwrap();
        nav.set_evaluation_points(a, Some(10.0)).unwrap();
        nav.set_evaluation_points(c, Some(5.0)).unwrap();
        assert_eq!(nav.data().total_points(), Some(15.0));
        assert_eq!(nav.dirty_activities().count(), 2);
    }

    #[test]
    fn test_scorm12_lesson_status_on_exit() {
        let mut nav = linear(PackageFormat::V1p2);
        nav.navigate(NavigationCommand::Start).unwrap();
        nav.navigate(NavigationCommand::Continue).unwrap();
        let a = nav.activity("a").unwrap();
        assert_eq!(a.data_model().lesson_status, LessonStatus::Completed);
    }

    #[test]
    fn test_find_common_ancestor() {
        let nav = linear(PackageFormat::V1p3);
        let tree = nav.data().tree();
        let root = tree.root().unwrap();
        let a = nav.data().activity_key_to_activity("a").unwrap();
        let c = nav.data().activity_key_to_activity("c").unwrap();
        assert_eq!(nav.find_common_ancestor(Some(a), c).unwrap(), root);
        assert_eq!(nav.find_common_ancestor(None, c).unwrap(), c);
        assert_eq!(nav.find_common_ancestor(Some(a), a).unwrap(), a);
    }

    #[test]
    fn test_log_records_final_navigation() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let _ = nav.navigate(NavigationCommand::Previous);
        let finals: Vec<_> = nav
            .sequencing_log()
            .unwrap()
            .entries()
            .iter()
            .filter(|e| e.event == SequencingEventType::FinalNavigation)
            .collect();
        assert_eq!(finals.len(), 2);
        assert_eq!(finals[0].activity.as_deref(), Some("a"));
        assert!(finals[1].message.starts_with("rejected"));
    }

    #[tokio::test]
    async fn test_save_drains_dirty_set() {
        let mut nav = linear(PackageFormat::V1p3);
        let store = MemoryStore::new();
        assert_eq!(nav.save(&store).await.unwrap(), 0);

        nav.navigate(NavigationCommand::Start).unwrap();
        let written = nav.save(&store).await.unwrap();
        assert!(written > 0);
        assert_eq!(nav.dirty_activities().count(), 0);
        assert_eq!(store.len().await, written);

        let a = nav.activity("a").unwrap();
        let id = a.persistence_id().unwrap();
        let record = store.load_activity(id).await.unwrap().unwrap();
        assert_eq!(record.key, "a");
        assert!(record.data_model.is_active);
    }

    /// `m` (a, b disabled) then `c`; the cluster launches nothing.
    fn graded_course() -> Navigator {
        let package = PackageDefinition {
            format: PackageFormat::V1p3,
            root: ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::cluster(
                        "m",
                        "Module",
                        vec![
                            ActivityDefinition::leaf("a", "A"),
                            ActivityDefinition::leaf("b", "B").with_sequencing(
                                SequencingDefinition::default()
                                    .with_pre_condition(SequencingRule::always(RuleAction::Disabled)),
                            ),
                        ],
                    )
                    .with_sequencing(SequencingDefinition::choice_and_flow()),
                    ActivityDefinition::leaf("c", "C"),
                ],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        };
        let mut nav = Navigator::new(&package, config()).unwrap();
        nav.navigate(NavigationCommand::Start).unwrap();
        nav
    }

    #[test]
    fn test_auto_grading_needs_an_ended_attempt() {
        let mut nav = graded_course();
        assert!(matches!(
            nav.begin_auto_grading_mode(),
            Err(NavigatorError::AttemptNotEnded(AttemptStatus::Active))
        ));
        nav.navigate(NavigationCommand::SuspendAll).unwrap();
        assert!(matches!(
            nav.begin_auto_grading_mode(),
            Err(NavigatorError::AttemptNotEnded(AttemptStatus::Suspended))
        ));
        assert!(matches!(
            nav.end_auto_grading_mode(),
            Err(NavigatorError::AutoGradingNotBegun)
        ));
        assert!(!nav.is_auto_grading());
    }

    #[test]
    fn test_auto_grading_walks_resources_and_ignores_rules() {
        let mut nav = graded_course();
        nav.navigate(NavigationCommand::ExitAll).unwrap();
        nav.begin_auto_grading_mode().unwrap();
        assert!(matches!(
            nav.begin_auto_grading_mode(),
            Err(NavigatorError::AutoGradingActive)
        ));
        assert_eq!(current_key(&nav), Some("a"));

        nav.navigate(NavigationCommand::Continue).unwrap();
        assert_eq!(current_key(&nav), Some("b"));
        assert!(nav.current_activity().unwrap().data_model().is_active);
        nav.navigate(NavigationCommand::Continue).unwrap();
        assert_eq!(current_key(&nav), Some("c"));
        let err = nav.navigate(NavigationCommand::Continue).unwrap_err();
        assert_eq!(err.sequencing_code(), Some(SequencingCode::FlowPastLastActivity));
        assert_eq!(current_key(&nav), Some("c"));

        nav.navigate(NavigationCommand::Previous).unwrap();
        nav.navigate(NavigationCommand::Previous).unwrap();
        assert_eq!(current_key(&nav), Some("a"));
        let err = nav.navigate(NavigationCommand::Previous).unwrap_err();
        assert_eq!(err.sequencing_code(), Some(SequencingCode::FlowBeforeRoot));
        assert_eq!(current_key(&nav), Some("a"));
    }

    #[test]
    fn test_auto_grading_refuses_everything_else() {
        let mut nav = graded_course();
        nav.navigate(NavigationCommand::ExitAll).unwrap();
        nav.begin_auto_grading_mode().unwrap();

        assert!(matches!(
            nav.navigate(NavigationCommand::Start),
            Err(NavigatorError::AutoGradingActive)
        ));
        assert!(matches!(nav.navigate_to("c"), Err(NavigatorError::AutoGradingActive)));
        assert!(matches!(
            nav.is_navigation_valid(NavigationCommand::Continue),
            Err(NavigatorError::AutoGradingActive)
        ));
        assert!(matches!(
            nav.is_navigation_to_valid("c"),
            Err(NavigatorError::AutoGradingActive)
        ));

        let a = nav.data().current().unwrap();
        nav.end_auto_grading_mode().unwrap();
        assert_eq!(nav.data().current(), None);
        assert!(!nav.data().model(a).is_active);
        assert!(matches!(
            nav.navigate(NavigationCommand::Continue),
            Err(NavigatorError::AttemptEnded(AttemptStatus::Completed))
        ));
    }

    #[tokio::test]
    async fn test_save_is_refused_while_auto_grading() {
        let mut nav = graded_course();
        nav.navigate(NavigationCommand::ExitAll).unwrap();
        let store = MemoryStore::new();
        nav.save(&store).await.unwrap();

        nav.begin_auto_grading_mode().unwrap();
        nav.navigate(NavigationCommand::Continue).unwrap();
        assert!(matches!(
            nav.save(&store).await,
            Err(NavigatorError::AutoGradingActive)
        ));
        assert_eq!(nav.dirty_activities().count(), 0);

        nav.end_auto_grading_mode().unwrap();
        assert_eq!(nav.save(&store).await.unwrap(), 0);
        assert_eq!(store.batches().await, 1);
    }

    struct FailingStore;

    #[async_trait]
    impl ActivityStore for FailingStore {
        async fn save_activities(&self, _records: &[ActivityRecord]) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }

        async fn load_activity(&self, _id: Uuid) -> anyhow::Result<Option<ActivityRecord>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_failed_save_keeps_dirty_set() {
        let mut nav = linear(PackageFormat::V1p3);
        nav.navigate(NavigationCommand::Start).unwrap();
        let dirty = nav.dirty_activities().count();
        let err = nav.save(&FailingStore).await.unwrap_err();
        assert!(matches!(err, NavigatorError::Store(_)));
        assert_eq!(nav.dirty_activities().count(), dirty);
    }
}
