//! Static package description consumed by the tree builder.
//!
//! This is the read-only, package-derived half of an activity: structure,
//! resource reference, UI flags and the full sequencing vocabulary. It is
//! produced by the package-parsing collaborator (or deserialized from YAML/JSON)
//! and never written back by the engine.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

// ─── Package ──────────────────────────────────────────────────

/// Declared SCORM edition of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageFormat {
    /// SCORM 1.2.
    V1p2,
    /// Class-server learning resource. Sequenced like SCORM 1.2.
    Lrm,
    /// SCORM 2004.
    #[default]
    V1p3,
}

impl PackageFormat {
    /// Whether this format uses the simplified (1.2) state machine.
    pub fn is_simplified(&self) -> bool {
        matches!(self, PackageFormat::V1p2 | PackageFormat::Lrm)
    }
}

/// A whole package: one organization rooted at `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDefinition {
    #[serde(default)]
    pub format: PackageFormat,
    pub root: ActivityDefinition,
}

// ─── Activity ─────────────────────────────────────────────────

/// Kind of resource an activity launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Sco,
    Asset,
    #[default]
    None,
}

/// Reference to the launchable resource of an activity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub identifier: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub xml_base: Option<String>,
    #[serde(default)]
    pub resource_type: ResourceType,
}

/// LMS user-interface affordances an activity asks to hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HideLmsUi {
    pub previous: bool,
    #[serde(rename = "continue")]
    pub continue_: bool,
    pub exit: bool,
    pub abandon: bool,
}

/// One organization item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDefinition {
    /// Package-level identifier, unique within the tree.
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub resource: Option<ResourceReference>,
    /// Launch parameters appended to the resource location.
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(default)]
    pub hide_lms_ui: HideLmsUi,
    /// SCORM 1.2 prerequisite script.
    #[serde(default)]
    pub prerequisites: Option<String>,
    /// SCORM 1.2 mastery score (0..=100).
    #[serde(default)]
    pub mastery_score: Option<f32>,
    #[serde(default)]
    pub sequencing: SequencingDefinition,
    #[serde(default)]
    pub objectives: Vec<ObjectiveDefinition>,
    /// Prior tracking state, if the learner has history with this package.
    #[serde(default)]
    pub tracking: Option<TrackingSnapshot>,
    #[serde(default)]
    pub children: Vec<ActivityDefinition>,
}

impl ActivityDefinition {
    /// A leaf that launches an SCO with the same identifier as its key.
    pub fn leaf(key: impl Into<String>, title: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            resource: Some(ResourceReference {
                identifier: format!("res-{key}"),
                href: Some(format!("{key}.html")),
                xml_base: None,
                resource_type: ResourceType::Sco,
            }),
            ..Self::cluster(key, title, Vec::new())
        }
    }

    /// An item without a resource, grouping `children`.
    pub fn cluster(
        key: impl Into<String>,
        title: impl Into<String>,
        children: Vec<ActivityDefinition>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            is_visible: true,
            resource: None,
            parameters: None,
            hide_lms_ui: HideLmsUi::default(),
            prerequisites: None,
            mastery_score: None,
            sequencing: SequencingDefinition::default(),
            objectives: Vec::new(),
            tracking: None,
            children,
        }
    }

    pub fn with_sequencing(mut self, sequencing: SequencingDefinition) -> Self {
        self.sequencing = sequencing;
        self
    }

    pub fn with_objective(mut self, objective: ObjectiveDefinition) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn with_prerequisites(mut self, script: impl Into<String>) -> Self {
        self.prerequisites = Some(script.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_visible = false;
        self
    }
}

/// Tracking state recorded by an earlier session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSnapshot {
    pub attempt_count: u32,
    pub is_suspended: bool,
    pub evaluation_points: Option<f32>,
}

// ─── Sequencing ───────────────────────────────────────────────

/// The static sequencing rule set of one activity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencingDefinition {
    pub control_mode: ControlMode,
    pub pre_condition_rules: Vec<SequencingRule>,
    pub exit_condition_rules: Vec<SequencingRule>,
    pub post_condition_rules: Vec<SequencingRule>,
    pub limit_conditions: LimitConditions,
    pub rollup_rules: RollupRules,
    pub rollup_considerations: RollupConsiderations,
    pub randomization: RandomizationControls,
    pub delivery_controls: DeliveryControls,
    pub constrain_choice: bool,
    pub prevent_activation: bool,
}

impl SequencingDefinition {
    /// Flow-only sequencing: choice disabled, flow enabled.
    pub fn flow() -> Self {
        Self {
            control_mode: ControlMode {
                choice: false,
                flow: true,
                ..ControlMode::default()
            },
            ..Self::default()
        }
    }

    /// Both choice and flow enabled.
    pub fn choice_and_flow() -> Self {
        Self {
            control_mode: ControlMode {
                flow: true,
                ..ControlMode::default()
            },
            ..Self::default()
        }
    }

    pub fn with_pre_condition(mut self, rule: SequencingRule) -> Self {
        self.pre_condition_rules.push(rule);
        self
    }

    pub fn with_exit_condition(mut self, rule: SequencingRule) -> Self {
        self.exit_condition_rules.push(rule);
        self
    }

    pub fn with_post_condition(mut self, rule: SequencingRule) -> Self {
        self.post_condition_rules.push(rule);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlMode {
    pub choice: bool,
    pub choice_exit: bool,
    pub flow: bool,
    pub forward_only: bool,
    pub use_current_attempt_objective_info: bool,
    pub use_current_attempt_progress_info: bool,
}

impl Default for ControlMode {
    fn default() -> Self {
        Self {
            choice: true,
            choice_exit: true,
            flow: false,
            forward_only: false,
            use_current_attempt_objective_info: true,
            use_current_attempt_progress_info: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitConditions {
    pub attempt_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryControls {
    pub tracked: bool,
    pub completion_set_by_content: bool,
    pub objective_set_by_content: bool,
}

impl Default for DeliveryControls {
    fn default() -> Self {
        Self {
            tracked: true,
            completion_set_by_content: false,
            objective_set_by_content: false,
        }
    }
}

/// When selection or randomization happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RandomizationTiming {
    #[default]
    Never,
    Once,
    OnEachNewAttempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RandomizationControls {
    pub randomization_timing: RandomizationTiming,
    pub select_count: Option<u32>,
    pub reorder_children: bool,
    pub selection_timing: RandomizationTiming,
}

// ─── Sequencing rules ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionCombination {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    #[default]
    NoOp,
    Not,
}

/// Condition tested by a pre, exit or post condition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleConditionKind {
    Satisfied,
    ObjectiveStatusKnown,
    ObjectiveMeasureKnown,
    ObjectiveMeasureGreaterThan,
    ObjectiveMeasureLessThan,
    Completed,
    ActivityProgressKnown,
    Attempted,
    AttemptLimitExceeded,
    TimeLimitExceeded,
    OutsideAvailableTimeRange,
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub condition: RuleConditionKind,
    #[serde(default)]
    pub operator: ConditionOperator,
    /// Objective tested; the primary objective when absent.
    #[serde(default)]
    pub referenced_objective: Option<String>,
    #[serde(default)]
    pub measure_threshold: f32,
}

impl RuleCondition {
    pub fn new(condition: RuleConditionKind) -> Self {
        Self {
            condition,
            operator: ConditionOperator::NoOp,
            referenced_objective: None,
            measure_threshold: 0.0,
        }
    }

    pub fn not(mut self) -> Self {
        self.operator = ConditionOperator::Not;
        self
    }
}

/// Action of a sequencing rule. Which actions are meaningful depends on the
/// rule's family (pre, exit or post condition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleAction {
    // pre-condition
    Skip,
    Disabled,
    HiddenFromChoice,
    StopForwardTraversal,
    // exit
    Exit,
    // post-condition
    ExitParent,
    ExitAll,
    Retry,
    RetryAll,
    Continue,
    Previous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencingRule {
    #[serde(default)]
    pub condition_combination: ConditionCombination,
    pub conditions: Vec<RuleCondition>,
    pub action: RuleAction,
}

impl SequencingRule {
    pub fn new(action: RuleAction, conditions: Vec<RuleCondition>) -> Self {
        Self {
            condition_combination: ConditionCombination::All,
            conditions,
            action,
        }
    }

    /// A rule whose single condition is `always`.
    pub fn always(action: RuleAction) -> Self {
        Self::new(action, vec![RuleCondition::new(RuleConditionKind::Always)])
    }
}

// ─── Rollup ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollupChildActivitySet {
    #[default]
    All,
    Any,
    None,
    AtLeastCount,
    AtLeastPercent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollupConditionKind {
    Satisfied,
    ObjectiveStatusKnown,
    ObjectiveMeasureKnown,
    Completed,
    ActivityProgressKnown,
    Attempted,
    AttemptLimitExceeded,
    TimeLimitExceeded,
    OutsideAvailableTimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupCondition {
    pub condition: RollupConditionKind,
    #[serde(default)]
    pub operator: ConditionOperator,
}

impl RollupCondition {
    pub fn new(condition: RollupConditionKind) -> Self {
        Self {
            condition,
            operator: ConditionOperator::NoOp,
        }
    }

    pub fn not(mut self) -> Self {
        self.operator = ConditionOperator::Not;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollupAction {
    Satisfied,
    NotSatisfied,
    Completed,
    Incomplete,
}

impl RollupAction {
    /// Whether this action belongs to the satisfaction family.
    pub fn is_satisfaction(&self) -> bool {
        matches!(self, RollupAction::Satisfied | RollupAction::NotSatisfied)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupRule {
    #[serde(default)]
    pub child_activity_set: RollupChildActivitySet,
    #[serde(default)]
    pub minimum_count: u32,
    #[serde(default)]
    pub minimum_percent: f32,
    #[serde(default)]
    pub condition_combination: ConditionCombination,
    pub conditions: Vec<RollupCondition>,
    pub action: RollupAction,
}

impl RollupRule {
    pub fn new(
        child_activity_set: RollupChildActivitySet,
        condition_combination: ConditionCombination,
        conditions: Vec<RollupCondition>,
        action: RollupAction,
    ) -> Self {
        Self {
            child_activity_set,
            minimum_count: 0,
            minimum_percent: 0.0,
            condition_combination,
            conditions,
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollupRules {
    pub rollup_objective_satisfied: bool,
    pub rollup_progress_completion: bool,
    pub objective_measure_weight: f32,
    pub rules: Vec<RollupRule>,
}

impl Default for RollupRules {
    fn default() -> Self {
        Self {
            rollup_objective_satisfied: true,
            rollup_progress_completion: true,
            objective_measure_weight: 1.0,
            rules: Vec::new(),
        }
    }
}

/// When a child participates in a rollup family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollupConsideration {
    #[default]
    Always,
    IfAttempted,
    IfNotSkipped,
    IfNotSuspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollupConsiderations {
    pub required_for_satisfied: RollupConsideration,
    pub required_for_not_satisfied: RollupConsideration,
    pub required_for_completed: RollupConsideration,
    pub required_for_incomplete: RollupConsideration,
    pub measure_satisfaction_if_active: bool,
}

impl Default for RollupConsiderations {
    fn default() -> Self {
        Self {
            required_for_satisfied: RollupConsideration::Always,
            required_for_not_satisfied: RollupConsideration::Always,
            required_for_completed: RollupConsideration::Always,
            required_for_incomplete: RollupConsideration::Always,
            measure_satisfaction_if_active: true,
        }
    }
}

// ─── Objectives ───────────────────────────────────────────────

/// Mapping from a local objective to a global (shared) one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveMap {
    pub target_objective_id: String,
    #[serde(default = "default_true")]
    pub read_satisfied_status: bool,
    #[serde(default = "default_true")]
    pub read_normalized_measure: bool,
    #[serde(default)]
    pub write_satisfied_status: bool,
    #[serde(default)]
    pub write_normalized_measure: bool,
}

impl ObjectiveMap {
    /// Read both values from `target`.
    pub fn read(target: impl Into<String>) -> Self {
        Self {
            target_objective_id: target.into(),
            read_satisfied_status: true,
            read_normalized_measure: true,
            write_satisfied_status: false,
            write_normalized_measure: false,
        }
    }

    /// Write both values to `target`, read nothing.
    pub fn write(target: impl Into<String>) -> Self {
        Self {
            target_objective_id: target.into(),
            read_satisfied_status: false,
            read_normalized_measure: false,
            write_satisfied_status: true,
            write_normalized_measure: true,
        }
    }

    pub fn reads(&self) -> bool {
        self.read_satisfied_status || self.read_normalized_measure
    }

    pub fn writes(&self) -> bool {
        self.write_satisfied_status || self.write_normalized_measure
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveDefinition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub satisfied_by_measure: bool,
    #[serde(default = "default_one")]
    pub min_normalized_measure: f32,
    #[serde(default)]
    pub maps: Vec<ObjectiveMap>,
}

impl ObjectiveDefinition {
    pub fn primary(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            primary: true,
            satisfied_by_measure: false,
            min_normalized_measure: 1.0,
            maps: Vec::new(),
        }
    }

    pub fn secondary(id: impl Into<String>) -> Self {
        Self {
            primary: false,
            ..Self::primary(id)
        }
    }

    pub fn satisfied_by_measure(mut self, min_normalized_measure: f32) -> Self {
        self.satisfied_by_measure = true;
        self.min_normalized_measure = min_normalized_measure;
        self
    }

    pub fn with_map(mut self, map: ObjectiveMap) -> Self {
        self.maps.push(map);
        self
    }
}
