//! SCORM 2004 Overall Sequencing Process.
//!
//! The process is a pipeline: navigation request -> termination request ->
//! sequencing request -> delivery request -> content delivery environment.
//! Each stage either hands a request to the next one or fails with the
//! clause code of the violated condition. Rollup lives in `rollup.rs`.

use super::rules::{check_activity, pre_condition, rules_check, rules_check_action};
use super::{NavigationCommand, SequencingRequest, TerminationRequest, TraversalDirection};
use crate::activity::definition::{RandomizationTiming, RuleAction, SequencingDefinition};
use crate::activity::{ActivityId, CompletionStatus, SuccessStatus};
use crate::error::{InternalError, Result, SequencingCode};
use crate::navigator::data::NavigatorData;
use crate::navigator::log::SequencingEventType;

type Requests = (Option<SequencingRequest>, Option<TerminationRequest>);

/// Stateless entry point for the 2004 state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scorm2004SeqNav;

impl Scorm2004SeqNav {
    /// Returns true when the sequencing session ended.
    pub fn overall_sequencing_process(
        &self,
        data: &mut NavigatorData,
        command: NavigationCommand,
        destination: Option<ActivityId>,
    ) -> Result<bool> {
        Sequencer::new(data, Some(command)).overall(command, destination)
    }

    /// Finalize `activity` if it is a leaf, then roll its state up the tree.
    pub fn rollup(&self, data: &mut NavigatorData, activity: ActivityId) -> Result<()> {
        let mut sequencer = Sequencer::new(data, None);
        if sequencer.is_leaf(activity) {
            sequencer.finalize_data_model_prior_to_exit(activity)?;
        }
        sequencer.overall_rollup(activity)?;
        sequencer.extended_rollup(activity)
    }
}

/// One pass of the sequencing pipeline over a borrowed navigator state.
pub(crate) struct Sequencer<'a> {
    pub(super) data: &'a mut NavigatorData,
    pub(super) command: Option<NavigationCommand>,
}

impl<'a> Sequencer<'a> {
    pub(crate) fn new(data: &'a mut NavigatorData, command: Option<NavigationCommand>) -> Self {
        Self { data, command }
    }

    // ── Small accessors ──

    pub(super) fn seq(&self, id: ActivityId) -> &SequencingDefinition {
        self.data.tree()[id].sequencing()
    }

    pub(super) fn parent(&self, id: ActivityId) -> Option<ActivityId> {
        self.data.tree()[id].parent()
    }

    pub(super) fn children(&self, id: ActivityId) -> Vec<ActivityId> {
        self.data.tree()[id].children().to_vec()
    }

    pub(super) fn is_leaf(&self, id: ActivityId) -> bool {
        self.data.tree().is_leaf(id)
    }

    pub(super) fn root(&self) -> Result<ActivityId> {
        Ok(self.data.root()?)
    }

    fn is_active(&self, id: ActivityId) -> bool {
        self.data.model(id).is_active
    }

    fn is_suspended(&self, id: ActivityId) -> bool {
        self.data.model(id).is_suspended
    }

    /// `id` and its ancestors up to, but not including, `stop`.
    fn ancestors_until(&self, id: ActivityId, stop: Option<ActivityId>) -> Vec<ActivityId> {
        self.data
            .tree()
            .ancestors(id)
            .take_while(|a| Some(*a) != stop)
            .collect()
    }

    fn note(&mut self, activity: Option<ActivityId>, message: impl Into<String>) {
        self.data.record(
            SequencingEventType::IntermediateNavigation,
            self.command,
            activity,
            message,
        );
    }

    // ── Overall process ──

    fn overall(&mut self, command: NavigationCommand, destination: Option<ActivityId>) -> Result<bool> {
        let (mut sequencing, termination) = self.navigation_request(command, destination)?;

        if let Some(termination) = termination {
            if let Some(request) = self.termination_request(termination)? {
                sequencing = Some(request);
            }
        }

        let mut delivery = None;
        if let Some(request) = sequencing {
            let (target, end_session) = self.sequencing_request(request, destination)?;
            if end_session {
                self.note(None, "sequencing session ended");
                self.data.set_current(None);
                return Ok(true);
            }
            delivery = target;
        }

        if let Some(activity) = delivery {
            self.delivery_request(activity)?;
            self.content_delivery_environment(activity)?;
        }
        Ok(false)
    }

    // ── Navigation request process ──

    fn navigation_request(
        &mut self,
        command: NavigationCommand,
        destination: Option<ActivityId>,
    ) -> Result<Requests> {
        use SequencingRequest as S;
        use TerminationRequest as T;

        let current = self.data.current();
        let exit_if_active = |this: &Self, id: ActivityId| this.is_active(id).then_some(T::Exit);

        let requests = match command {
            NavigationCommand::Start => {
                if current.is_some() {
                    return Err(SequencingCode::SessionAlreadyBegun.into());
                }
                (Some(S::Start), None)
            }
            NavigationCommand::ResumeAll => {
                if current.is_some() {
                    return Err(SequencingCode::SessionAlreadyBegun.into());
                }
                if self.data.suspended().is_none() {
                    return Err(SequencingCode::NoSuspendedActivity.into());
                }
                (Some(S::ResumeAll), None)
            }
            NavigationCommand::Continue => {
                let current = current.ok_or(SequencingCode::SessionNotBegun)?;
                match self.parent(current) {
                    Some(parent) if self.seq(parent).control_mode.flow => {
                        (Some(S::Continue), exit_if_active(self, current))
                    }
                    _ => return Err(SequencingCode::ContinueFlowViolation.into()),
                }
            }
            NavigationCommand::Previous => {
                let current = current.ok_or(SequencingCode::SessionNotBegun)?;
                let parent = self.parent(current).ok_or(SequencingCode::PreviousFromRoot)?;
                let mode = self.seq(parent).control_mode;
                if !mode.flow || mode.forward_only {
                    return Err(SequencingCode::PreviousFlowViolation.into());
                }
                (Some(S::Previous), exit_if_active(self, current))
            }
            NavigationCommand::Choose => {
                let target = destination.ok_or(SequencingCode::TargetDoesNotExist)?;
                let allowed = match self.parent(target) {
                    None => true,
                    Some(parent) => self.seq(parent).control_mode.choice,
                };
                if !allowed {
                    return Err(SequencingCode::ChoiceViolation.into());
                }
                let Some(current) = current else {
                    return Ok((Some(S::Choice), None));
                };
                let ancestor = self.data.tree().find_common_ancestor(current, target)?;
                let stop = if ancestor == current {
                    self.parent(ancestor)
                } else {
                    Some(ancestor)
                };
                for activity in self.ancestors_until(current, stop) {
                    if self.is_active(activity) && !self.seq(activity).control_mode.choice_exit {
                        return Err(SequencingCode::ChoiceExitViolation.into());
                    }
                }
                (Some(S::Choice), exit_if_active(self, current))
            }
            NavigationCommand::UnqualifiedExit => {
                let current = current.ok_or(SequencingCode::SessionNotBegun)?;
                if !self.is_active(current) {
                    return Err(SequencingCode::CurrentAlreadyTerminated.into());
                }
                (Some(S::Exit), Some(T::Exit))
            }
            NavigationCommand::ExitAll => {
                current.ok_or(SequencingCode::SessionNotBegun)?;
                (Some(S::Exit), Some(T::ExitAll))
            }
            NavigationCommand::Abandon => {
                let current = current.ok_or(SequencingCode::SessionNotBegun)?;
                if !self.is_active(current) {
                    return Err(SequencingCode::CurrentAlreadyTerminated.into());
                }
                (Some(S::Exit), Some(T::Abandon))
            }
            NavigationCommand::AbandonAll => (Some(S::Exit), Some(T::AbandonAll)),
            NavigationCommand::SuspendAll => {
                current.ok_or(SequencingCode::SessionNotBegun)?;
                (Some(S::Exit), Some(T::SuspendAll))
            }
            NavigationCommand::ChoiceStart => {
                return Err(InternalError::UnsupportedCommand {
                    command,
                    variant: "scorm2004",
                }
                .into())
            }
        };
        Ok(requests)
    }

    // ── Termination request process ──

    fn termination_request(
        &mut self,
        request: TerminationRequest,
    ) -> Result<Option<SequencingRequest>> {
        let Some(current) = self.data.current() else {
            return match request {
                TerminationRequest::AbandonAll => self.abandon_all(None),
                _ => Err(SequencingCode::TerminateWithoutSession.into()),
            };
        };
        if matches!(request, TerminationRequest::Exit | TerminationRequest::Abandon)
            && !self.is_active(current)
        {
            return Err(SequencingCode::TerminateAlreadyTerminated.into());
        }

        match request {
            TerminationRequest::Exit => self.terminate_exit(current),
            TerminationRequest::ExitAll => self.terminate_exit_all(current, None),
            TerminationRequest::SuspendAll => self.terminate_suspend_all(current),
            TerminationRequest::Abandon => {
                self.data.model_mut(current).is_active = false;
                self.extended_rollup(current)?;
                Ok(None)
            }
            TerminationRequest::AbandonAll => self.abandon_all(Some(current)),
            // Only produced by post-condition rules inside `terminate_exit`.
            TerminationRequest::ExitParent => {
                Err(SequencingCode::UndefinedTerminationRequest.into())
            }
        }
    }

    fn terminate_exit(&mut self, current: ActivityId) -> Result<Option<SequencingRequest>> {
        self.end_attempt(current)?;
        self.exit_action_rules(current)?;

        loop {
            let current = self
                .data
                .current()
                .ok_or(SequencingCode::TerminateWithoutSession)?;
            let (sequencing, termination) = self.post_condition_rules(current)?;
            match termination {
                Some(TerminationRequest::ExitAll) => {
                    return self.terminate_exit_all(current, sequencing);
                }
                Some(TerminationRequest::ExitParent) => {
                    let parent = self
                        .parent(current)
                        .ok_or(SequencingCode::ExitParentFromRoot)?;
                    self.data.set_current(Some(parent));
                    self.end_attempt(parent)?;
                }
                _ => {
                    if current == self.root()? && sequencing != Some(SequencingRequest::Retry) {
                        return Ok(Some(SequencingRequest::Exit));
                    }
                    return Ok(sequencing);
                }
            }
        }
    }

    fn terminate_exit_all(
        &mut self,
        current: ActivityId,
        sequencing: Option<SequencingRequest>,
    ) -> Result<Option<SequencingRequest>> {
        if self.is_active(current) {
            self.end_attempt(current)?;
        }
        let root = self.root()?;
        self.terminate_descendent_attempts(current, root)?;
        self.end_attempt(root)?;
        self.data.set_current(Some(root));
        Ok(Some(sequencing.unwrap_or(SequencingRequest::Exit)))
    }

    fn terminate_suspend_all(&mut self, current: ActivityId) -> Result<Option<SequencingRequest>> {
        let suspended = if self.is_active(current) || self.is_suspended(current) {
            current
        } else {
            self.parent(current)
                .ok_or(SequencingCode::SuspendInactiveRoot)?
        };
        self.data.set_suspended(Some(suspended));

        for activity in self.ancestors_until(suspended, None) {
            let model = self.data.model_mut(activity);
            model.is_suspended = true;
            model.is_active = false;
            self.extended_rollup(activity)?;
        }
        if self.is_leaf(suspended) {
            self.finalize_data_model_prior_to_exit(suspended)?;
        }
        self.note(Some(suspended), "suspended");

        let root = self.root()?;
        self.data.set_current(Some(root));
        Ok(Some(SequencingRequest::Exit))
    }

    fn abandon_all(&mut self, current: Option<ActivityId>) -> Result<Option<SequencingRequest>> {
        if let Some(current) = current {
            for activity in self.ancestors_until(current, None) {
                self.data.model_mut(activity).is_active = false;
                self.extended_rollup(activity)?;
            }
        }
        let root = self.root()?;
        self.data.set_current(Some(root));
        Ok(Some(SequencingRequest::Exit))
    }

    fn post_condition_rules(&mut self, activity: ActivityId) -> Result<Requests> {
        use SequencingRequest as S;
        use TerminationRequest as T;

        if self.is_suspended(activity) {
            return Ok((None, None));
        }
        let rules = &self.seq(activity).post_condition_rules;
        let action = rules_check(self.data, activity, rules)?;
        let requests = match action {
            Some(RuleAction::Retry) => (Some(S::Retry), None),
            Some(RuleAction::Continue) => (Some(S::Continue), None),
            Some(RuleAction::Previous) => (Some(S::Previous), None),
            Some(RuleAction::ExitParent) => (None, Some(T::ExitParent)),
            Some(RuleAction::ExitAll) => (None, Some(T::ExitAll)),
            Some(RuleAction::RetryAll) => (Some(S::Retry), Some(T::ExitAll)),
            _ => (None, None),
        };
        if let Some(action) = action {
            self.note(Some(activity), format!("post-condition rule {action:?} applies"));
        }
        Ok(requests)
    }

    /// Exit the outermost ancestor of `current` whose exit rule applies.
    fn exit_action_rules(&mut self, current: ActivityId) -> Result<()> {
        let mut path = self.ancestors_until(current, None);
        path.remove(0);
        path.reverse();

        for activity in path {
            let rules = &self.seq(activity).exit_condition_rules;
            if rules_check_action(self.data, activity, rules, RuleAction::Exit)? {
                self.note(Some(activity), "exit rule applies");
                self.terminate_descendent_attempts(current, activity)?;
                self.end_attempt(activity)?;
                self.data.set_current(Some(activity));
                return Ok(());
            }
        }
        Ok(())
    }

    /// End the attempts of the ancestors of `current` below its common
    /// ancestor with `activity`.
    fn terminate_descendent_attempts(&mut self, current: ActivityId, activity: ActivityId) -> Result<()> {
        let common = self.data.tree().find_common_ancestor(current, activity)?;
        if common == current {
            return Ok(());
        }
        let mut ancestors = self.ancestors_until(current, Some(common));
        ancestors.remove(0);
        for ancestor in ancestors {
            self.end_attempt(ancestor)?;
        }
        Ok(())
    }

    pub(super) fn end_attempt(&mut self, activity: ActivityId) -> Result<()> {
        if self.is_leaf(activity) {
            self.finalize_data_model_prior_to_exit(activity)?;
        } else {
            let any_suspended = self
                .children(activity)
                .into_iter()
                .any(|child| self.is_suspended(child));
            self.data.model_mut(activity).is_suspended = any_suspended;
        }
        self.data.model_mut(activity).is_active = false;
        self.overall_rollup(activity)?;
        self.extended_rollup(activity)
    }

    /// Carry content-reported status into the sequencing view of a leaf.
    pub(super) fn finalize_data_model_prior_to_exit(&mut self, leaf: ActivityId) -> Result<()> {
        let is_root = leaf == self.root()?;
        let model = self.data.model(leaf);
        if model.tracked() {
            let success = model.success_status;
            let scaled = model.score.scaled;
            let suspended = model.is_suspended;

            if success != SuccessStatus::Unknown {
                self.data.model_mut(leaf).primary_objective_mut().success_status = success;
                if is_root {
                    self.data.set_success_status(success);
                }
            }
            if let Some(scaled) = scaled {
                self.data.model_mut(leaf).primary_objective_mut().scaled_score = Some(scaled);
                if is_root {
                    self.data.set_total_points(Some(scaled * 100.0));
                }
            }

            if !suspended {
                let model = self.data.model(leaf);
                if !model.attempt_progress_status() && !model.completion_set_by_content() {
                    self.data.model_mut(leaf).completion_status = CompletionStatus::Completed;
                    if is_root {
                        self.data.set_completion_status(CompletionStatus::Completed);
                    }
                }
                let model = self.data.model(leaf);
                if !model.primary_objective().progress_status(model.tracked())
                    && !model.objective_set_by_content()
                {
                    self.data.model_mut(leaf).primary_objective_mut().success_status =
                        SuccessStatus::Passed;
                    if is_root {
                        self.data.set_success_status(SuccessStatus::Passed);
                    }
                }
            }
        }
        self.data.model_mut(leaf).accumulate_session_time();
        Ok(())
    }

    // ── Sequencing request process ──

    /// Returns the activity to deliver, if any, and whether the session ends.
    fn sequencing_request(
        &mut self,
        request: SequencingRequest,
        destination: Option<ActivityId>,
    ) -> Result<(Option<ActivityId>, bool)> {
        let outcome = match request {
            SequencingRequest::Start => (Some(self.start()?), false),
            SequencingRequest::ResumeAll => (Some(self.resume_all()?), false),
            SequencingRequest::Continue => (Some(self.continue_()?), false),
            SequencingRequest::Previous => (Some(self.previous()?), false),
            SequencingRequest::Retry => (Some(self.retry()?), false),
            SequencingRequest::Exit => (None, self.exit()?),
            SequencingRequest::Choice => {
                let target = destination.ok_or(SequencingCode::ChoiceNoTarget)?;
                (Some(self.choice(target)?), false)
            }
        };
        Ok(outcome)
    }

    fn start(&mut self) -> Result<ActivityId> {
        if self.data.current().is_some() {
            return Err(SequencingCode::StartAfterBegun.into());
        }
        let root = self.root()?;
        if self.is_leaf(root) {
            return Ok(root);
        }
        self.flow(root, TraversalDirection::Forward, true)
    }

    fn resume_all(&mut self) -> Result<ActivityId> {
        if self.data.current().is_some() {
            return Err(SequencingCode::ResumeAfterBegun.into());
        }
        self.data
            .suspended()
            .ok_or_else(|| SequencingCode::ResumeWithoutSuspended.into())
    }

    fn continue_(&mut self) -> Result<ActivityId> {
        let current = self
            .data
            .current()
            .ok_or(SequencingCode::ContinueWithoutSession)?;
        if let Some(parent) = self.parent(current) {
            if !self.seq(parent).control_mode.flow {
                return Err(SequencingCode::ContinueFlowDisallowed.into());
            }
        }
        self.flow(current, TraversalDirection::Forward, false)
    }

    fn previous(&mut self) -> Result<ActivityId> {
        let current = self
            .data
            .current()
            .ok_or(SequencingCode::PreviousWithoutSession)?;
        if let Some(parent) = self.parent(current) {
            if !self.seq(parent).control_mode.flow {
                return Err(SequencingCode::PreviousFlowDisallowed.into());
            }
        }
        self.flow(current, TraversalDirection::Backward, false)
    }

    fn exit(&mut self) -> Result<bool> {
        let current = self
            .data
            .current()
            .ok_or(SequencingCode::ExitWithoutSession)?;
        if self.is_active(current) {
            return Err(SequencingCode::ExitActiveActivity.into());
        }
        Ok(current == self.root()?)
    }

    fn retry(&mut self) -> Result<ActivityId> {
        let current = self
            .data
            .current()
            .ok_or(SequencingCode::RetryWithoutSession)?;
        if self.is_active(current) || self.is_suspended(current) {
            return Err(SequencingCode::RetryActiveActivity.into());
        }
        if self.is_leaf(current) {
            return Ok(current);
        }
        self.flow(current, TraversalDirection::Forward, true)
            .map_err(|err| match err.sequencing_code() {
                Some(_) => SequencingCode::RetryNothingToDeliver.into(),
                None => err,
            })
    }

    // ── Flow ──

    fn flow(
        &mut self,
        activity: ActivityId,
        direction: TraversalDirection,
        consider_children: bool,
    ) -> Result<ActivityId> {
        let (next, _) = self.flow_tree_traversal(
            activity,
            direction,
            consider_children,
            TraversalDirection::NotApplicable,
        )?;
        self.flow_activity_traversal(next, direction, TraversalDirection::NotApplicable)
    }

    /// One step through the tree in `direction`. Returns the candidate and
    /// the direction the step actually took.
    fn flow_tree_traversal(
        &mut self,
        activity: ActivityId,
        direction: TraversalDirection,
        consider_children: bool,
        previous_direction: TraversalDirection,
    ) -> Result<(ActivityId, TraversalDirection)> {
        let mut activity = activity;
        let mut direction = direction;
        let mut reversed = false;

        if previous_direction == TraversalDirection::Backward {
            if let (Some(parent), None) = (self.parent(activity), self.data.tree()[activity].next()) {
                if let Some(first) = self.data.tree()[parent].children().first() {
                    direction = TraversalDirection::Backward;
                    activity = *first;
                    reversed = true;
                }
            }
        }

        if direction == TraversalDirection::Forward {
            if self.data.tree().is_last_activity_in_tree(activity) {
                return Err(SequencingCode::FlowPastLastActivity.into());
            }
            if self.is_leaf(activity) || !consider_children {
                return match self.data.tree()[activity].next() {
                    Some(next) => Ok((next, TraversalDirection::Forward)),
                    None => {
                        let parent = self
                            .parent(activity)
                            .ok_or(SequencingCode::FlowPastLastActivity)?;
                        self.flow_tree_traversal(
                            parent,
                            TraversalDirection::Forward,
                            false,
                            TraversalDirection::NotApplicable,
                        )
                    }
                };
            }
            self.apply_randomization(activity);
            let first = self
                .data
                .tree()[activity]
                .children()
                .first()
                .copied()
                .ok_or(SequencingCode::FlowClusterEmpty)?;
            return Ok((first, TraversalDirection::Forward));
        }

        let parent = self
            .parent(activity)
            .ok_or(SequencingCode::FlowBeforeRoot)?;
        if self.is_leaf(activity) || !consider_children {
            if !reversed && self.seq(parent).control_mode.forward_only {
                return Err(SequencingCode::FlowForwardOnlyViolation.into());
            }
            return match self.data.tree()[activity].previous() {
                Some(previous) => Ok((previous, TraversalDirection::Backward)),
                None => self.flow_tree_traversal(
                    parent,
                    TraversalDirection::Backward,
                    false,
                    TraversalDirection::NotApplicable,
                ),
            };
        }

        self.apply_randomization(activity);
        let children = self.data.tree()[activity].children();
        if self.seq(activity).control_mode.forward_only {
            let first = children.first().copied().ok_or(SequencingCode::FlowClusterEmpty)?;
            Ok((first, TraversalDirection::Forward))
        } else {
            let last = children.last().copied().ok_or(SequencingCode::FlowClusterEmpty)?;
            Ok((last, TraversalDirection::Backward))
        }
    }

    /// Settle on a deliverable leaf starting at `activity`, skipping and
    /// descending as the rules require.
    fn flow_activity_traversal(
        &mut self,
        activity: ActivityId,
        direction: TraversalDirection,
        previous_direction: TraversalDirection,
    ) -> Result<ActivityId> {
        if let Some(parent) = self.parent(activity) {
            if !self.seq(parent).control_mode.flow {
                return Err(SequencingCode::FlowDisallowed.into());
            }
        }

        if pre_condition(self.data, activity, RuleAction::Skip)? {
            self.note(Some(activity), "skipped");
            let (next, next_direction) =
                self.flow_tree_traversal(activity, direction, false, previous_direction)?;
            self.note(Some(next), "flowing past skipped activity");
            let carried = if previous_direction == TraversalDirection::Backward
                && next_direction == TraversalDirection::Backward
            {
                TraversalDirection::NotApplicable
            } else {
                previous_direction
            };
            return self.flow_activity_traversal(next, next_direction, carried);
        }

        if check_activity(self.data, activity)? {
            return Err(SequencingCode::FlowActivityUnavailable.into());
        }

        if !self.is_leaf(activity) {
            let (next, next_direction) = self.flow_tree_traversal(
                activity,
                direction,
                true,
                TraversalDirection::NotApplicable,
            )?;
            self.note(Some(next), "descending into cluster");
            return if direction == TraversalDirection::Backward
                && next_direction == TraversalDirection::Forward
            {
                self.flow_activity_traversal(
                    next,
                    TraversalDirection::Forward,
                    TraversalDirection::Backward,
                )
            } else {
                self.flow_activity_traversal(next, direction, TraversalDirection::NotApplicable)
            };
        }
        Ok(activity)
    }

    /// Re-order children for a cluster about to start a new attempt.
    fn apply_randomization(&mut self, cluster: ActivityId) {
        let controls = self.seq(cluster).randomization;
        let model = self.data.model(cluster);
        let new_attempt = !model.is_active && !model.is_suspended;
        if controls.randomization_timing == RandomizationTiming::OnEachNewAttempt
            && controls.reorder_children
            && model.attempt_count > 0
            && new_attempt
        {
            self.data.randomize_children(cluster);
            self.note(Some(cluster), "children re-ordered for new attempt");
        }
    }

    // ── Choice ──

    fn choice_activity_traversal(
        &mut self,
        activity: ActivityId,
        direction: TraversalDirection,
    ) -> Result<()> {
        match direction {
            TraversalDirection::Forward => {
                if pre_condition(self.data, activity, RuleAction::StopForwardTraversal)? {
                    return Err(SequencingCode::ChoiceForwardTraversalBlocked.into());
                }
            }
            TraversalDirection::Backward => match self.parent(activity) {
                Some(parent) if self.seq(parent).control_mode.forward_only => {
                    return Err(SequencingCode::ChoiceForwardOnlyViolation.into());
                }
                Some(_) => {}
                None => return Err(SequencingCode::ChoiceBeforeRoot.into()),
            },
            TraversalDirection::NotApplicable => {}
        }
        Ok(())
    }

    /// Where a constrained choice may reach from `activity`: its neighbour
    /// in `direction`, or itself at the edge of the tree.
    fn choice_flow(&self, activity: ActivityId, direction: TraversalDirection) -> Result<ActivityId> {
        Ok(self
            .choice_flow_tree_traversal(activity, direction)?
            .unwrap_or(activity))
    }

    fn choice_flow_tree_traversal(
        &self,
        activity: ActivityId,
        direction: TraversalDirection,
    ) -> Result<Option<ActivityId>> {
        let tree = self.data.tree();
        match direction {
            TraversalDirection::Forward => {
                if tree.is_last_activity_in_tree(activity) {
                    return Ok(None);
                }
                match (tree[activity].next(), tree[activity].parent()) {
                    (Some(next), _) => Ok(Some(next)),
                    (None, Some(parent)) => self.choice_flow_tree_traversal(parent, direction),
                    (None, None) => Ok(None),
                }
            }
            TraversalDirection::Backward => {
                if activity == self.root()? {
                    return Ok(None);
                }
                match (tree[activity].previous(), tree[activity].parent()) {
                    (Some(previous), _) => Ok(Some(previous)),
                    (None, Some(parent)) => self.choice_flow_tree_traversal(parent, direction),
                    (None, None) => Ok(None),
                }
            }
            TraversalDirection::NotApplicable => Ok(None),
        }
    }

    fn prevents_activation(&self, activity: ActivityId, ancestor: ActivityId) -> bool {
        activity != ancestor && !self.is_active(activity) && self.seq(activity).prevent_activation
    }

    fn choice(&mut self, target: ActivityId) -> Result<ActivityId> {
        for activity in self.data.tree().path_from_root(target) {
            if pre_condition(self.data, activity, RuleAction::HiddenFromChoice)? {
                return Err(SequencingCode::ChoiceTargetHidden.into());
            }
        }
        let root = self.root()?;
        if let Some(parent) = self.parent(target) {
            if !self.seq(parent).control_mode.choice {
                return Err(SequencingCode::ChoiceDisallowed.into());
            }
        }

        let current = self.data.current();
        let ancestor = match current {
            Some(current) => self.data.tree().find_common_ancestor(current, target)?,
            None => root,
        };
        let ancestor_parent = self.parent(ancestor);
        let target_parent = self.parent(target);

        // Activities from the common ancestor down to the target's parent.
        let mut path_to_target = match target_parent {
            Some(parent) => self.ancestors_until(parent, ancestor_parent),
            None => Vec::new(),
        };
        path_to_target.reverse();

        match current {
            Some(current) if current == target => {}
            Some(current)
                if target_parent.is_some() && self.parent(current) == target_parent =>
            {
                let siblings = target_parent
                    .map(|parent| self.children(parent))
                    .unwrap_or_default();
                let position = |id| siblings.iter().position(|s| *s == id);
                if let (Some(from), Some(to)) = (position(current), position(target)) {
                    let (direction, range): (_, Vec<usize>) = if from < to {
                        (TraversalDirection::Forward, (from..to).collect())
                    } else {
                        (TraversalDirection::Backward, ((to + 1)..=from).rev().collect())
                    };
                    for index in range {
                        self.choice_activity_traversal(siblings[index], direction)?;
                    }
                }
            }
            _ if current.is_none() || current == Some(ancestor) => {
                for &activity in &path_to_target {
                    self.choice_activity_traversal(activity, TraversalDirection::Forward)?;
                    if self.prevents_activation(activity, ancestor) {
                        return Err(SequencingCode::ChoicePreventActivation.into());
                    }
                }
            }
            Some(current) if target == ancestor => {
                for activity in self.ancestors_until(current, Some(ancestor)) {
                    if !self.seq(activity).control_mode.choice_exit {
                        return Err(SequencingCode::ChoiceExitDisallowed.into());
                    }
                }
            }
            Some(current) => {
                let mut constrained = None;
                for activity in self.ancestors_until(current, ancestor_parent) {
                    if activity != ancestor && !self.seq(activity).control_mode.choice_exit {
                        return Err(SequencingCode::ChoiceExitDisallowed.into());
                    }
                    if constrained.is_none() && self.seq(activity).constrain_choice {
                        constrained = Some(activity);
                    }
                }

                if let Some(constrained) = constrained.filter(|c| *c != target) {
                    let direction = if self.data.tree().precedes_in_preorder(constrained, target) {
                        TraversalDirection::Forward
                    } else {
                        TraversalDirection::Backward
                    };
                    let reachable = self.choice_flow(constrained, direction)?;
                    let within = target_parent
                        .map(|parent| self.data.tree().is_ancestor_or_self(reachable, parent))
                        .unwrap_or(false);
                    if target != reachable && !within {
                        return Err(SequencingCode::ChoiceConstrained.into());
                    }
                }

                let forward = self.data.tree().precedes_in_preorder(current, target);
                for &activity in &path_to_target {
                    if forward {
                        self.choice_activity_traversal(activity, TraversalDirection::Forward)?;
                    }
                    if self.prevents_activation(activity, ancestor) {
                        return Err(SequencingCode::ChoicePreventActivation.into());
                    }
                }
            }
            None => {}
        }

        if current == Some(target) || self.is_leaf(target) {
            return Ok(target);
        }
        self.flow(target, TraversalDirection::Forward, true)
            .map_err(|err| match err.sequencing_code() {
                Some(_) => SequencingCode::ChoiceNothingToDeliver.into(),
                None => err,
            })
    }

    // ── Delivery ──

    fn reset_attempt_data(&mut self, activity: ActivityId, objective_info: bool, progress_info: bool) {
        let model = self.data.model_mut(activity);
        if progress_info {
            model.clear_attempt_progress_info();
        }
        if objective_info {
            model.clear_attempt_objective_info();
        }
    }

    fn delivery_request(&mut self, activity: ActivityId) -> Result<()> {
        if !self.is_leaf(activity) {
            return Err(SequencingCode::DeliverCluster.into());
        }
        for node in self.data.tree().path_from_root(activity) {
            if !self.is_leaf(node) && !self.is_active(node) && !self.is_suspended(node) {
                let mode = self.seq(node).control_mode;
                let (objective, progress) = (
                    mode.use_current_attempt_objective_info,
                    mode.use_current_attempt_progress_info,
                );
                for child in self.children(node) {
                    self.reset_attempt_data(child, objective, progress);
                }
                self.reset_attempt_data(node, objective, progress);
            }
            if check_activity(self.data, node)? {
                return Err(SequencingCode::DeliverUnavailable.into());
            }
        }
        Ok(())
    }

    fn content_delivery_environment(&mut self, activity: ActivityId) -> Result<()> {
        let current = self.data.current();
        if let Some(current) = current {
            if self.is_active(current) {
                return Err(SequencingCode::DeliverAlreadyActive.into());
            }
        }

        if self.data.suspended() != Some(activity) {
            self.clear_suspended_activity(activity)?;
        } else {
            self.data.set_suspended(None);
        }
        if let Some(current) = current {
            self.terminate_descendent_attempts(current, activity)?;
        }
        self.data.set_current(Some(activity));

        for node in self.data.tree().path_from_root(activity) {
            if self.is_active(node) {
                continue;
            }
            self.data.model_mut(node).is_active = true;
            if !self.data.model(node).tracked() {
                continue;
            }
            if self.is_suspended(node) {
                let model = self.data.model_mut(node);
                model.is_suspended = false;
                model.initialize_for_delivery_after_suspend();
            } else {
                let model = self.data.model_mut(node);
                model.attempt_count += 1;
                if model.attempt_count == 1 {
                    model.activity_progress_status = true;
                }
                let mode = self.seq(node).control_mode;
                self.reset_attempt_data(
                    node,
                    mode.use_current_attempt_objective_info,
                    mode.use_current_attempt_progress_info,
                );
                self.perform_data_model_initialization(node)?;
            }
        }
        self.note(Some(activity), "delivered");
        Ok(())
    }

    fn perform_data_model_initialization(&mut self, activity: ActivityId) -> Result<()> {
        let is_root = activity == self.root()?;
        let definition = self.data.tree()[activity].definition().objectives.clone();
        self.data.model_mut(activity).initialize_for_delivery(&definition);
        if !self.data.model(activity).tracked() {
            return Ok(());
        }

        let reads: Vec<_> = self
            .data
            .model(activity)
            .objectives
            .iter()
            .map(|o| {
                (
                    o.is_primary,
                    self.data.read_global_satisfied(o),
                    self.data.read_global_measure(o),
                )
            })
            .collect();

        for (index, (is_primary, satisfied, measure)) in reads.into_iter().enumerate() {
            if let Some(satisfied) = satisfied {
                let status = if satisfied {
                    SuccessStatus::Passed
                } else {
                    SuccessStatus::Failed
                };
                self.data.model_mut(activity).objectives[index].success_status = status;
                if is_root && is_primary {
                    self.data.set_success_status(status);
                }
            }
            if let Some(measure) = measure {
                self.data.model_mut(activity).objectives[index].scaled_score = Some(measure);
                if is_root && is_primary {
                    self.data.set_total_points(Some(measure * 100.0));
                }
            }
        }
        Ok(())
    }

    /// Unsuspend the suspended branch up to where it meets `activity`.
    fn clear_suspended_activity(&mut self, activity: ActivityId) -> Result<()> {
        let Some(suspended) = self.data.suspended() else {
            return Ok(());
        };
        let common = self.data.tree().find_common_ancestor(activity, suspended)?;
        let stop = self.parent(common);
        for node in self.ancestors_until(suspended, stop) {
            let unsuspend = self.is_leaf(node)
                || !self
                    .children(node)
                    .into_iter()
                    .any(|child| self.is_suspended(child));
            if unsuspend {
                self.data.model_mut(node).is_suspended = false;
            }
        }
        self.data.set_suspended(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::definition::{
        ActivityDefinition, RuleCondition, RuleConditionKind, SequencingRule,
    };
    use crate::activity::{PackageDefinition, PackageFormat};
    use crate::config::NavigatorConfig;
    use crate::error::NavigatorError;

    fn data(root: ActivityDefinition) -> NavigatorData {
        let package = PackageDefinition {
            format: PackageFormat::V1p3,
            root,
        };
        let config = NavigatorConfig {
            random_seed: Some(7),
            ..NavigatorConfig::default()
        };
        NavigatorData::new(&package, &config).unwrap()
    }

    fn linear() -> NavigatorData {
        data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    ActivityDefinition::leaf("b", "B"),
                    ActivityDefinition::leaf("c", "C"),
                ],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        )
    }

    fn id(data: &NavigatorData, key: &str) -> ActivityId {
        data.activity_key_to_activity(key).unwrap()
    }

    fn run(data: &mut NavigatorData, command: NavigationCommand) -> Result<bool> {
        Scorm2004SeqNav.overall_sequencing_process(data, command, None)
    }

    fn code(err: NavigatorError) -> &'static str {
        err.sequencing_code().map(|c| c.code()).unwrap_or("not a sequencing failure")
    }

    #[test]
    fn test_start_delivers_first_leaf() {
        let mut data = linear();
        assert!(!run(&mut data, NavigationCommand::Start).unwrap());
        let a = id(&data, "a");
        assert_eq!(data.current(), Some(a));
        assert!(data.model(a).is_active);
        assert_eq!(data.model(a).attempt_count, 1);
        assert!(data.model(id(&data, "root")).is_active);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        let err = run(&mut data, NavigationCommand::Start).unwrap_err();
        assert_eq!(code(err), "NB.2.1-1");
    }

    #[test]
    fn test_continue_completes_and_moves() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();

        let (a, b) = (id(&data, "a"), id(&data, "b"));
        assert_eq!(data.current(), Some(b));
        assert!(!data.model(a).is_active);
        assert_eq!(data.model(a).completion_status, CompletionStatus::Completed);
        assert_eq!(
            data.model(a).primary_objective().success_status,
            SuccessStatus::Passed
        );
    }

    #[test]
    fn test_continue_past_last_leaf_fails() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        let err = run(&mut data, NavigationCommand::Continue).unwrap_err();
        assert_eq!(code(err), "SB.2.1-1");
    }

    #[test]
    fn test_previous_from_first_leaf_fails() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        let err = run(&mut data, NavigationCommand::Previous).unwrap_err();
        assert_eq!(code(err), "SB.2.1-3");
    }

    #[test]
    fn test_continue_without_flow_fails() {
        let mut data = data(ActivityDefinition::cluster(
            "root",
            "Root",
            vec![
                ActivityDefinition::leaf("a", "A"),
                ActivityDefinition::leaf("b", "B"),
            ],
        ));
        let a = id(&data, "a");
        Scorm2004SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(a))
            .unwrap();
        let err = run(&mut data, NavigationCommand::Continue).unwrap_err();
        assert_eq!(code(err), "NB.2.1-4");
    }

    #[test]
    fn test_skip_rule_is_flowed_past() {
        let skipped = ActivityDefinition::leaf("b", "B").with_sequencing(
            SequencingDefinition::default().with_pre_condition(SequencingRule::always(RuleAction::Skip)),
        );
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    skipped,
                    ActivityDefinition::leaf("c", "C"),
                ],
            )
            .with_sequencing(SequencingDefinition::flow()),
        );
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        assert_eq!(data.current(), Some(id(&data, "c")));
    }

    #[test]
    fn test_disabled_first_leaf_blocks_start() {
        let disabled = ActivityDefinition::leaf("a", "A").with_sequencing(
            SequencingDefinition::default()
                .with_pre_condition(SequencingRule::always(RuleAction::Disabled)),
        );
        let mut data = data(
            ActivityDefinition::cluster("root", "Root", vec![disabled])
                .with_sequencing(SequencingDefinition::flow()),
        );
        let err = run(&mut data, NavigationCommand::Start).unwrap_err();
        assert_eq!(code(err), "SB.2.2-2");
    }

    #[test]
    fn test_choose_hidden_target_fails() {
        let hidden = ActivityDefinition::leaf("b", "B").with_sequencing(
            SequencingDefinition::default()
                .with_pre_condition(SequencingRule::always(RuleAction::HiddenFromChoice)),
        );
        let mut data = data(ActivityDefinition::cluster(
            "root",
            "Root",
            vec![ActivityDefinition::leaf("a", "A"), hidden],
        ));
        let b = id(&data, "b");
        let err = Scorm2004SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(b))
            .unwrap_err();
        assert_eq!(code(err), "SB.2.9-3");
    }

    #[test]
    fn test_choose_under_choice_disabled_parent_fails() {
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    ActivityDefinition::leaf("b", "B"),
                ],
            )
            .with_sequencing(SequencingDefinition::flow()),
        );
        let b = id(&data, "b");
        let err = Scorm2004SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(b))
            .unwrap_err();
        assert_eq!(code(err), "NB.2.1-10");
    }

    #[test]
    fn test_choose_sibling_ends_current_attempt() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        let (a, c) = (id(&data, "a"), id(&data, "c"));
        Scorm2004SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(c))
            .unwrap();
        assert_eq!(data.current(), Some(c));
        assert!(!data.model(a).is_active);
    }

    #[test]
    fn test_stop_forward_traversal_blocks_choice_past_it() {
        let stop = ActivityDefinition::leaf("b", "B").with_sequencing(
            SequencingDefinition::default()
                .with_pre_condition(SequencingRule::always(RuleAction::StopForwardTraversal)),
        );
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    stop,
                    ActivityDefinition::leaf("c", "C"),
                ],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        );
        let (a, c) = (id(&data, "a"), id(&data, "c"));
        Scorm2004SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(a))
            .unwrap();
        // a itself has no stop rule; b is traversed on the way to c
        let err = Scorm2004SeqNav
            .overall_sequencing_process(&mut data, NavigationCommand::Choose, Some(c))
            .unwrap_err();
        assert_eq!(code(err), "SB.2.4-1");
    }

    #[test]
    fn test_exit_all_ends_session() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        assert!(run(&mut data, NavigationCommand::ExitAll).unwrap());
        assert_eq!(data.current(), None);
        assert!(!data.model(id(&data, "root")).is_active);
    }

    #[test]
    fn test_suspend_all_then_resume() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        let b = id(&data, "b");

        assert!(run(&mut data, NavigationCommand::SuspendAll).unwrap());
        assert_eq!(data.suspended(), Some(b));
        assert!(data.model(b).is_suspended);
        assert!(data.model(id(&data, "root")).is_suspended);

        run(&mut data, NavigationCommand::ResumeAll).unwrap();
        assert_eq!(data.current(), Some(b));
        assert_eq!(data.suspended(), None);
        assert!(!data.model(b).is_suspended);
        assert_eq!(data.model(b).attempt_count, 1);
        assert_eq!(data.model(b).entry, crate::activity::Entry::Resume);
    }

    #[test]
    fn test_resume_without_suspend_fails() {
        let mut data = linear();
        let err = run(&mut data, NavigationCommand::ResumeAll).unwrap_err();
        assert_eq!(code(err), "NB.2.1-3");
    }

    #[test]
    fn test_post_condition_retry_redelivers() {
        let retry_until_done = ActivityDefinition::leaf("a", "A").with_sequencing(
            SequencingDefinition::default().with_post_condition(SequencingRule::new(
                RuleAction::Retry,
                vec![RuleCondition::new(RuleConditionKind::Attempted)],
            )),
        );
        let mut data = data(
            ActivityDefinition::cluster("root", "Root", vec![retry_until_done])
                .with_sequencing(SequencingDefinition::choice_and_flow()),
        );
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::UnqualifiedExit).unwrap();
        let a = id(&data, "a");
        assert_eq!(data.current(), Some(a));
        assert_eq!(data.model(a).attempt_count, 2);
    }

    #[test]
    fn test_attempt_limit_blocks_redelivery() {
        let mut sequencing = SequencingDefinition::default();
        sequencing.limit_conditions.attempt_limit = Some(1);
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A").with_sequencing(sequencing),
                    ActivityDefinition::leaf("b", "B"),
                ],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        );
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        let err = run(&mut data, NavigationCommand::Previous).unwrap_err();
        assert_eq!(code(err), "SB.2.2-2");
    }

    #[test]
    fn test_abandon_leaves_status_untouched() {
        let mut data = linear();
        run(&mut data, NavigationCommand::Start).unwrap();
        let a = id(&data, "a");
        run(&mut data, NavigationCommand::Abandon).unwrap();
        assert!(!data.model(a).is_active);
        assert_eq!(data.model(a).completion_status, CompletionStatus::Unknown);
        assert_eq!(data.current(), Some(a));
    }

    #[test]
    fn test_forward_only_blocks_previous() {
        let mut sequencing = SequencingDefinition::flow();
        sequencing.control_mode.forward_only = true;
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    ActivityDefinition::leaf("b", "B"),
                ],
            )
            .with_sequencing(sequencing),
        );
        run(&mut data, NavigationCommand::Start).unwrap();
        run(&mut data, NavigationCommand::Continue).unwrap();
        let err = run(&mut data, NavigationCommand::Previous).unwrap_err();
        assert_eq!(code(err), "NB.2.1-5");
    }

    #[test]
    fn test_choice_start_is_not_a_state_machine_command() {
        let mut data = linear();
        let err = run(&mut data, NavigationCommand::ChoiceStart).unwrap_err();
        assert!(err.is_bug());
    }

    /// Root flows through cluster `m`, whose six leaves are re-ordered on each
    /// new attempt, and then leaf `z`.
    fn reshuffling_course() -> NavigatorData {
        let mut module = ActivityDefinition::cluster(
            "m",
            "Module",
            (0..6)
                .map(|i| ActivityDefinition::leaf(format!("l{i}"), format!("L{i}")))
                .collect(),
        )
        .with_sequencing(SequencingDefinition::choice_and_flow());
        module.sequencing.randomization.randomization_timing = RandomizationTiming::OnEachNewAttempt;
        module.sequencing.randomization.reorder_children = true;
        let package = PackageDefinition {
            format: PackageFormat::V1p3,
            root: ActivityDefinition::cluster(
                "root",
                "Root",
                vec![module, ActivityDefinition::leaf("z", "Z")],
            )
            .with_sequencing(SequencingDefinition::choice_and_flow()),
        };
        let config = NavigatorConfig {
            random_seed: Some(3),
            record_sequencing_log: true,
            ..NavigatorConfig::default()
        };
        NavigatorData::new(&package, &config).unwrap()
    }

    fn reshuffles(data: &NavigatorData) -> usize {
        data.sequencing_log()
            .unwrap()
            .entries()
            .iter()
            .filter(|e| e.message == "children re-ordered for new attempt")
            .count()
    }

    /// Start, then continue through every leaf of `m` onto `z`.
    fn flow_through_module(data: &mut NavigatorData) {
        run(data, NavigationCommand::Start).unwrap();
        for _ in 0..6 {
            run(data, NavigationCommand::Continue).unwrap();
        }
        assert_eq!(data.current(), Some(id(data, "z")));
    }

    #[test]
    fn test_child_order_is_stable_within_an_attempt() {
        let mut data = reshuffling_course();
        let m = id(&data, "m");
        run(&mut data, NavigationCommand::Start).unwrap();
        let order = data.tree()[m].children().to_vec();
        assert_eq!(data.current(), Some(order[0]));

        for expected in &order[1..] {
            run(&mut data, NavigationCommand::Continue).unwrap();
            assert_eq!(data.current(), Some(*expected));
            assert_eq!(data.tree()[m].children(), &order[..]);
        }
        assert_eq!(reshuffles(&data), 0);
    }

    #[test]
    fn test_flow_into_a_new_attempt_reorders_children() {
        let mut data = reshuffling_course();
        let m = id(&data, "m");
        flow_through_module(&mut data);
        assert!(!data.model(m).is_active);
        assert_eq!(reshuffles(&data), 0);

        run(&mut data, NavigationCommand::Previous).unwrap();
        assert_eq!(reshuffles(&data), 1);
        assert_eq!(data.model(m).attempt_count, 2);
        let order = data.tree()[m].children();
        assert_eq!(data.current(), order.last().copied());
        let placements: Vec<_> = order
            .iter()
            .map(|c| data.tree()[*c].random_placement().unwrap())
            .collect();
        assert_eq!(placements, (0..6).collect::<Vec<u32>>());
    }

    #[test]
    fn test_suspended_cluster_keeps_its_order() {
        let mut data = reshuffling_course();
        let m = id(&data, "m");
        flow_through_module(&mut data);
        let order = data.tree()[m].children().to_vec();
        data.model_mut(m).is_suspended = true;

        run(&mut data, NavigationCommand::Previous).unwrap();
        assert_eq!(reshuffles(&data), 0);
        assert_eq!(data.tree()[m].children(), &order[..]);
        assert_eq!(data.current(), order.last().copied());
        assert!(!data.model(m).is_suspended);
        assert_eq!(data.model(m).attempt_count, 1);
    }
}
