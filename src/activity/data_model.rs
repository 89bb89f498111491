//! Per-learner mutable tracking state of one activity.
//!
//! The sequencing flags (`tracked`, `completion_set_by_content`,
//! `objective_set_by_content`) are read once from the static delivery
//! controls at construction and never change afterwards.

use super::definition::{ActivityDefinition, ObjectiveDefinition, ObjectiveMap, PackageFormat};
use crate::sequencing::NavigationCommand;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── Status enumerations ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    #[default]
    Unknown,
    Completed,
    Incomplete,
    NotAttempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
}

/// SCORM 1.2 `cmi.core.lesson_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    NotAttempted,
    Browsed,
    Incomplete,
    Completed,
    Passed,
    Failed,
}

/// How the content is being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    #[default]
    AbInitio,
    Resume,
    AllOtherConditions,
}

/// How the content says it was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    Normal,
    Suspended,
    Logout,
    TimeOut,
}

/// A navigation request the content embedded in its data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNavigationRequest {
    pub command: NavigationCommand,
    /// Target key for [`NavigationCommand::Choose`].
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Score {
    pub raw: Option<f32>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub scaled: Option<f32>,
}

// ─── Objectives ───────────────────────────────────────────────

/// Tracking state of one objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveState {
    pub id: Option<String>,
    pub is_primary: bool,
    pub success_status: SuccessStatus,
    pub scaled_score: Option<f32>,
    pub satisfied_by_measure: bool,
    pub min_normalized_measure: f32,
    pub maps: Vec<ObjectiveMap>,
}

impl ObjectiveState {
    fn from_definition(def: &ObjectiveDefinition) -> Self {
        Self {
            id: def.id.clone(),
            is_primary: def.primary,
            success_status: SuccessStatus::Unknown,
            scaled_score: None,
            satisfied_by_measure: def.satisfied_by_measure,
            min_normalized_measure: def.min_normalized_measure,
            maps: def.maps.clone(),
        }
    }

    fn default_primary() -> Self {
        Self {
            id: None,
            is_primary: true,
            success_status: SuccessStatus::Unknown,
            scaled_score: None,
            satisfied_by_measure: false,
            min_normalized_measure: 1.0,
            maps: Vec::new(),
        }
    }

    /// Objective progress status. Always false for untracked activities.
    pub fn progress_status(&self, tracked: bool) -> bool {
        tracked && self.success_status != SuccessStatus::Unknown
    }

    pub fn satisfied_status(&self) -> bool {
        self.success_status == SuccessStatus::Passed
    }

    /// Objective measure status. Always false for untracked activities.
    pub fn measure_status(&self, tracked: bool) -> bool {
        tracked && self.scaled_score.is_some()
    }

    pub fn normalized_measure(&self) -> f32 {
        self.scaled_score.unwrap_or(0.0)
    }

    /// The first map reading from a global objective, if any.
    pub fn read_map(&self) -> Option<&ObjectiveMap> {
        self.maps.iter().find(|m| m.reads())
    }

    pub fn has_write_maps(&self) -> bool {
        self.maps.iter().any(|m| m.writes())
    }
}

// ─── Data model ───────────────────────────────────────────────

/// Learner tracking data for one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningDataModel {
    format: PackageFormat,
    tracked: bool,
    completion_set_by_content: bool,
    objective_set_by_content: bool,
    mastery_score: Option<f32>,
    evaluation_points: Option<f32>,

    pub completion_status: CompletionStatus,
    pub success_status: SuccessStatus,
    pub lesson_status: LessonStatus,
    pub score: Score,
    pub objectives: Vec<ObjectiveState>,

    /// Number of attempts on this activity.
    pub attempt_count: u32,
    pub is_active: bool,
    pub is_suspended: bool,
    /// True once the first attempt has begun.
    pub activity_progress_status: bool,

    pub entry: Entry,
    pub exit: Option<ExitMode>,
    pub navigation_request: Option<ContentNavigationRequest>,

    pub session_time: Duration,
    pub total_time: Duration,
    /// Whether this attempt counts for credit (SCORM 1.2 grading).
    pub credit: bool,
}

impl LearningDataModel {
    /// Build a fresh data model for an activity.
    ///
    /// Content-set flags only apply to leaves; clusters never receive
    /// content-reported status.
    pub fn new(format: PackageFormat, definition: &ActivityDefinition, is_leaf: bool) -> Self {
        let delivery = &definition.sequencing.delivery_controls;
        let tracking = definition.tracking.clone().unwrap_or_default();
        Self {
            format,
            tracked: delivery.tracked,
            completion_set_by_content: is_leaf && delivery.completion_set_by_content,
            objective_set_by_content: is_leaf && delivery.objective_set_by_content,
            mastery_score: definition.mastery_score,
            evaluation_points: tracking.evaluation_points,
            completion_status: CompletionStatus::Unknown,
            success_status: SuccessStatus::Unknown,
            lesson_status: LessonStatus::NotAttempted,
            score: Score::default(),
            objectives: Self::objectives_from(&definition.objectives),
            attempt_count: tracking.attempt_count,
            is_active: false,
            is_suspended: tracking.is_suspended,
            activity_progress_status: tracking.attempt_count > 0,
            entry: Entry::AbInitio,
            exit: None,
            navigation_request: None,
            session_time: Duration::ZERO,
            total_time: Duration::ZERO,
            credit: true,
        }
    }

    fn objectives_from(definitions: &[ObjectiveDefinition]) -> Vec<ObjectiveState> {
        let mut objectives: Vec<ObjectiveState> = definitions
            .iter()
            .map(ObjectiveState::from_definition)
            .collect();
        if !objectives.iter().any(|o| o.is_primary) {
            objectives.insert(0, ObjectiveState::default_primary());
        }
        objectives
    }

    pub fn format(&self) -> PackageFormat {
        self.format
    }

    pub fn tracked(&self) -> bool {
        self.tracked
    }

    pub fn completion_set_by_content(&self) -> bool {
        self.completion_set_by_content
    }

    pub fn objective_set_by_content(&self) -> bool {
        self.objective_set_by_content
    }

    pub fn mastery_score(&self) -> Option<f32> {
        self.mastery_score
    }

    /// Points this activity contributes to the tree-wide total.
    ///
    /// Written only through `NavigatorData::set_evaluation_points`, which keeps
    /// the aggregate in step.
    pub fn evaluation_points(&self) -> Option<f32> {
        self.evaluation_points
    }

    pub(crate) fn replace_evaluation_points(&mut self, points: Option<f32>) -> Option<f32> {
        std::mem::replace(&mut self.evaluation_points, points)
    }

    // ── Derived sequencing values ──

    pub fn attempt_progress_status(&self) -> bool {
        self.tracked && self.completion_status != CompletionStatus::Unknown
    }

    pub fn attempt_completion_status(&self) -> bool {
        self.completion_status == CompletionStatus::Completed
    }

    pub fn primary_objective(&self) -> &ObjectiveState {
        // objectives_from guarantees a primary objective
        self.objectives
            .iter()
            .find(|o| o.is_primary)
            .unwrap_or(&self.objectives[0])
    }

    pub fn primary_objective_mut(&mut self) -> &mut ObjectiveState {
        let index = self
            .objectives
            .iter()
            .position(|o| o.is_primary)
            .unwrap_or(0);
        &mut self.objectives[index]
    }

    /// Look an objective up by id.
    pub fn objective(&self, id: &str) -> Option<&ObjectiveState> {
        self.objectives.iter().find(|o| o.id.as_deref() == Some(id))
    }

    // ── Attempt lifecycle ──

    pub fn clear_attempt_progress_info(&mut self) {
        self.completion_status = CompletionStatus::Unknown;
    }

    pub fn clear_attempt_objective_info(&mut self) {
        for objective in &mut self.objectives {
            objective.scaled_score = None;
            objective.success_status = SuccessStatus::Unknown;
        }
        self.success_status = SuccessStatus::Unknown;
    }

    /// Prepare for a new attempt. Does not touch evaluation points; the caller
    /// clears those so the tree-wide total follows.
    pub fn initialize_for_delivery(&mut self, objectives: &[ObjectiveDefinition]) {
        self.entry = if !self.format.is_simplified() || self.attempt_count <= 1 {
            Entry::AbInitio
        } else {
            Entry::AllOtherConditions
        };
        self.success_status = SuccessStatus::Unknown;
        self.score = Score::default();
        self.exit = None;
        self.navigation_request = None;
        self.session_time = Duration::ZERO;
        self.objectives = Self::objectives_from(objectives);
    }

    pub fn initialize_for_delivery_after_suspend(&mut self) {
        self.entry = if self.format.is_simplified() && self.exit == Some(ExitMode::Logout) {
            Entry::AllOtherConditions
        } else {
            Entry::Resume
        };
        self.exit = None;
    }

    /// Fold the session time into the total and restart the session clock.
    pub fn accumulate_session_time(&mut self) {
        self.total_time += self.session_time;
        self.session_time = Duration::ZERO;
    }
}
