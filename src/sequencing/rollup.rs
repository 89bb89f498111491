//! SCORM 2004 rollup: measure, objective (by measure or by rules) and
//! activity progress, applied from a changed activity up to the root.
//!
//! Extended rollup additionally re-rolls the parents of activities that read
//! a shared objective the changed activity writes.

use super::rules::{evaluate_rollup_conditions, pre_condition};
use super::scorm2004::Sequencer;
use crate::activity::definition::{
    ConditionCombination, RollupAction, RollupChildActivitySet, RollupCondition,
    RollupConditionKind, RollupConsideration, RollupRule, RuleAction,
};
use crate::activity::{ActivityId, CompletionStatus, SuccessStatus};
use crate::error::Result;
use crate::navigator::data::NavigatorData;
use crate::navigator::log::SequencingEventType;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Rules used for a family (satisfaction or progress) when an activity
/// defines none of that family.
pub fn default_rollup_rules() -> &'static [RollupRule] {
    static RULES: OnceLock<Vec<RollupRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let attempted_and_not = |kind| {
            vec![
                RollupCondition::new(RollupConditionKind::Attempted),
                RollupCondition::new(kind).not(),
            ]
        };
        vec![
            RollupRule::new(
                RollupChildActivitySet::All,
                ConditionCombination::All,
                vec![RollupCondition::new(RollupConditionKind::Completed)],
                RollupAction::Completed,
            ),
            RollupRule::new(
                RollupChildActivitySet::All,
                ConditionCombination::Any,
                attempted_and_not(RollupConditionKind::Completed),
                RollupAction::Incomplete,
            ),
            RollupRule::new(
                RollupChildActivitySet::All,
                ConditionCombination::All,
                vec![RollupCondition::new(RollupConditionKind::Satisfied)],
                RollupAction::Satisfied,
            ),
            RollupRule::new(
                RollupChildActivitySet::All,
                ConditionCombination::Any,
                attempted_and_not(RollupConditionKind::Satisfied),
                RollupAction::NotSatisfied,
            ),
        ]
    })
}

/// Whether `child` participates in rollup of `action` for its parent.
fn check_child_for_rollup(data: &NavigatorData, child: ActivityId, action: RollupAction) -> Result<bool> {
    let sequencing = data.tree()[child].sequencing();
    let considerations = &sequencing.rollup_considerations;
    let (enabled, consideration) = match action {
        RollupAction::Satisfied => (
            sequencing.rollup_rules.rollup_objective_satisfied,
            considerations.required_for_satisfied,
        ),
        RollupAction::NotSatisfied => (
            sequencing.rollup_rules.rollup_objective_satisfied,
            considerations.required_for_not_satisfied,
        ),
        RollupAction::Completed => (
            sequencing.rollup_rules.rollup_progress_completion,
            considerations.required_for_completed,
        ),
        RollupAction::Incomplete => (
            sequencing.rollup_rules.rollup_progress_completion,
            considerations.required_for_incomplete,
        ),
    };
    if !enabled {
        return Ok(false);
    }

    let model = data.model(child);
    Ok(match consideration {
        RollupConsideration::Always => true,
        RollupConsideration::IfNotSuspended => !(model.attempt_count > 0 && model.is_suspended),
        RollupConsideration::IfAttempted => model.attempt_count > 0,
        RollupConsideration::IfNotSkipped => !pre_condition(data, child, RuleAction::Skip)?,
    })
}

fn child_set_satisfied(rule: &RollupRule, values: &[Option<bool>]) -> bool {
    let hits = values.iter().filter(|v| **v == Some(true)).count();
    match rule.child_activity_set {
        RollupChildActivitySet::All => values.iter().all(|v| *v == Some(true)),
        RollupChildActivitySet::Any => hits > 0,
        RollupChildActivitySet::None => values.iter().all(|v| *v == Some(false)),
        RollupChildActivitySet::AtLeastCount => hits >= rule.minimum_count as usize,
        RollupChildActivitySet::AtLeastPercent => {
            let percent = if values.is_empty() {
                0.0
            } else {
                hits as f32 / values.len() as f32
            };
            percent >= rule.minimum_percent
        }
    }
}

/// Whether any rule with `action` fires for `activity`. Leaves never fire.
pub fn rollup_rule_check(data: &NavigatorData, activity: ActivityId, action: RollupAction) -> Result<bool> {
    let node = &data.tree()[activity];
    if node.is_leaf() {
        return Ok(false);
    }
    let own = &node.sequencing().rollup_rules.rules;
    let family = action.is_satisfaction();
    let rules: &[RollupRule] = if own.iter().any(|r| r.action.is_satisfaction() == family) {
        own
    } else {
        default_rollup_rules()
    };

    for rule in rules.iter().filter(|r| r.action == action) {
        let mut values = Vec::new();
        for &child in node.children() {
            if data.model(child).tracked() && check_child_for_rollup(data, child, action)? {
                values.push(evaluate_rollup_conditions(data, child, rule)?);
            }
        }
        if child_set_satisfied(rule, &values) {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Sequencer<'_> {
    fn note_rollup(&mut self, activity: ActivityId, message: impl Into<String>) {
        self.data
            .record(SequencingEventType::Rollup, self.command, Some(activity), message);
    }

    /// Roll up from `activity` through every ancestor to the root.
    pub(super) fn overall_rollup(&mut self, activity: ActivityId) -> Result<()> {
        self.note_rollup(activity, "rollup initiated");
        let path: Vec<ActivityId> = self.data.tree().ancestors(activity).collect();
        for node in path {
            if !self.is_leaf(node) {
                self.measure_rollup(node)?;
            }
            if self.data.model(node).primary_objective().satisfied_by_measure {
                self.objective_rollup_by_measure(node)?;
            } else {
                self.objective_rollup_by_rules(node)?;
            }
            self.activity_progress_rollup(node)?;
            self.data.write_global_objectives(node);
        }
        Ok(())
    }

    /// Re-roll every activity whose parent reads a shared objective that
    /// `activity` writes.
    pub(super) fn extended_rollup(&mut self, activity: ActivityId) -> Result<()> {
        let mut satisfied_targets = BTreeSet::new();
        let mut measure_targets = BTreeSet::new();
        for objective in &self.data.model(activity).objectives {
            for map in &objective.maps {
                if map.write_satisfied_status {
                    satisfied_targets.insert(map.target_objective_id.clone());
                }
                if map.write_normalized_measure {
                    measure_targets.insert(map.target_objective_id.clone());
                }
            }
        }
        if satisfied_targets.is_empty() && measure_targets.is_empty() {
            return Ok(());
        }

        let mut rollup_set = Vec::new();
        let root = self.root()?;
        self.add_branch_to_rollup_set(root, &satisfied_targets, &measure_targets, &mut rollup_set);

        while let Some(&next) = rollup_set.first() {
            self.overall_rollup(next)?;
            let rolled: Vec<ActivityId> = self.data.tree().ancestors(next).collect();
            rollup_set.retain(|a| !rolled.contains(a));
        }
        Ok(())
    }

    /// Deepest activities first: clusters before leaves at each level.
    fn add_branch_to_rollup_set(
        &self,
        activity: ActivityId,
        satisfied_targets: &BTreeSet<String>,
        measure_targets: &BTreeSet<String>,
        rollup_set: &mut Vec<ActivityId>,
    ) {
        if !self.data.model(activity).tracked() {
            return;
        }
        let children = self.children(activity);
        let (leaves, clusters): (Vec<_>, Vec<_>) =
            children.into_iter().partition(|c| self.is_leaf(*c));
        for child in clusters.into_iter().chain(leaves) {
            self.add_branch_to_rollup_set(child, satisfied_targets, measure_targets, rollup_set);
        }

        let reads_written = self.data.model(activity).objectives.iter().any(|objective| {
            objective.maps.iter().any(|map| {
                (map.read_satisfied_status && satisfied_targets.contains(&map.target_objective_id))
                    || (map.read_normalized_measure
                        && measure_targets.contains(&map.target_objective_id))
            })
        });
        if reads_written {
            if let Some(parent) = self.parent(activity) {
                if !rollup_set.contains(&parent) {
                    rollup_set.push(parent);
                }
            }
        }
    }

    /// Weighted average of the children's measures.
    fn measure_rollup(&mut self, activity: ActivityId) -> Result<()> {
        let mut total = 0.0f32;
        let mut counted = 0.0f32;
        let mut valid = false;

        for child in self.children(activity) {
            let model = self.data.model(child);
            if !model.tracked() {
                continue;
            }
            let weight = self.seq(child).rollup_rules.objective_measure_weight;
            counted += weight;
            let primary = model.primary_objective();
            let measure = primary
                .scaled_score
                .or_else(|| self.data.read_global_measure(primary));
            if let Some(measure) = measure {
                total += measure * weight;
                valid = true;
            }
        }

        let is_root = activity == self.root()?;
        if !valid {
            self.data.model_mut(activity).primary_objective_mut().scaled_score = None;
            return Ok(());
        }
        if counted > 0.0 {
            let scaled = total / counted;
            self.data.model_mut(activity).primary_objective_mut().scaled_score = Some(scaled);
            if is_root {
                self.data.set_total_points(Some(scaled * 100.0));
            }
            self.note_rollup(activity, format!("measure rolled up to {scaled}"));
        }
        Ok(())
    }

    fn objective_rollup_by_measure(&mut self, activity: ActivityId) -> Result<()> {
        let model = self.data.model(activity);
        let tracked = model.tracked();
        let primary = model.primary_objective();
        let measure = if primary.measure_status(tracked) {
            Some(primary.normalized_measure())
        } else if tracked {
            self.data.read_global_measure(primary)
        } else {
            None
        };
        let measure_counts = !model.is_active
            || self
                .seq(activity)
                .rollup_considerations
                .measure_satisfaction_if_active;

        let status = match measure {
            Some(measure) if measure_counts => {
                if measure >= primary.min_normalized_measure {
                    SuccessStatus::Passed
                } else {
                    SuccessStatus::Failed
                }
            }
            _ => SuccessStatus::Unknown,
        };
        self.data.model_mut(activity).primary_objective_mut().success_status = status;
        if activity == self.root()? {
            self.data.set_success_status(status);
        }
        Ok(())
    }

    fn objective_rollup_by_rules(&mut self, activity: ActivityId) -> Result<()> {
        if rollup_rule_check(self.data, activity, RollupAction::NotSatisfied)? {
            self.data.model_mut(activity).primary_objective_mut().success_status =
                SuccessStatus::Failed;
        }
        if rollup_rule_check(self.data, activity, RollupAction::Satisfied)? {
            self.data.model_mut(activity).primary_objective_mut().success_status =
                SuccessStatus::Passed;
        }
        if activity == self.root()? {
            let status = self.data.model(activity).primary_objective().success_status;
            self.data.set_success_status(status);
        }
        Ok(())
    }

    fn activity_progress_rollup(&mut self, activity: ActivityId) -> Result<()> {
        if rollup_rule_check(self.data, activity, RollupAction::Incomplete)? {
            self.data.model_mut(activity).completion_status = CompletionStatus::Incomplete;
        }
        if rollup_rule_check(self.data, activity, RollupAction::Completed)? {
            self.data.model_mut(activity).completion_status = CompletionStatus::Completed;
        }
        if activity == self.root()? {
            let status = self.data.model(activity).completion_status;
            self.data.set_completion_status(status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::definition::{
        ActivityDefinition, ObjectiveDefinition, ObjectiveMap, SequencingDefinition,
    };
    use crate::activity::{PackageDefinition, PackageFormat};
    use crate::config::NavigatorConfig;

    fn data(root: ActivityDefinition) -> NavigatorData {
        let package = PackageDefinition {
            format: PackageFormat::V1p3,
            root,
        };
        NavigatorData::new(&package, &NavigatorConfig::default()).unwrap()
    }

    fn two_leaves(sequencing: SequencingDefinition) -> NavigatorData {
        data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    ActivityDefinition::leaf("b", "B"),
                ],
            )
            .with_sequencing(sequencing),
        )
    }

    fn id(data: &NavigatorData, key: &str) -> ActivityId {
        data.activity_key_to_activity(key).unwrap()
    }

    fn attempt(data: &mut NavigatorData, key: &str, completion: CompletionStatus) {
        let id = id(data, key);
        let model = data.model_mut(id);
        model.attempt_count = 1;
        model.completion_status = completion;
    }

    fn rollup(data: &mut NavigatorData, key: &str) {
        let id = id(data, key);
        Sequencer::new(data, None).overall_rollup(id).unwrap();
    }

    #[test]
    fn test_all_children_completed_completes_parent() {
        let mut data = two_leaves(SequencingDefinition::flow());
        attempt(&mut data, "a", CompletionStatus::Completed);
        attempt(&mut data, "b", CompletionStatus::Completed);
        rollup(&mut data, "b");

        let root = id(&data, "root");
        assert_eq!(data.model(root).completion_status, CompletionStatus::Completed);
        assert_eq!(data.completion_status(), CompletionStatus::Completed);
    }

    #[test]
    fn test_attempted_incomplete_child_marks_parent_incomplete() {
        let mut data = two_leaves(SequencingDefinition::flow());
        attempt(&mut data, "a", CompletionStatus::Completed);
        attempt(&mut data, "b", CompletionStatus::Incomplete);
        rollup(&mut data, "b");
        assert_eq!(data.completion_status(), CompletionStatus::Incomplete);
    }

    #[test]
    fn test_satisfaction_rolls_up_from_children() {
        let mut data = two_leaves(SequencingDefinition::flow());
        for key in ["a", "b"] {
            let leaf = id(&data, key);
            let model = data.model_mut(leaf);
            model.attempt_count = 1;
            model.primary_objective_mut().success_status = SuccessStatus::Passed;
        }
        rollup(&mut data, "a");
        assert_eq!(data.success_status(), SuccessStatus::Passed);

        let b = id(&data, "b");
        data.model_mut(b).primary_objective_mut().success_status = SuccessStatus::Failed;
        rollup(&mut data, "b");
        assert_eq!(data.success_status(), SuccessStatus::Failed);
    }

    #[test]
    fn test_measure_rollup_is_weighted_average() {
        let mut heavy = SequencingDefinition::default();
        heavy.rollup_rules.objective_measure_weight = 3.0;
        let mut data = data(ActivityDefinition::cluster(
            "root",
            "Root",
            vec![
                ActivityDefinition::leaf("a", "A").with_sequencing(heavy),
                ActivityDefinition::leaf("b", "B"),
            ],
        ));
        let (a, b) = (id(&data, "a"), id(&data, "b"));
        data.model_mut(a).primary_objective_mut().scaled_score = Some(1.0);
        data.model_mut(b).primary_objective_mut().scaled_score = Some(0.2);
        rollup(&mut data, "a");

        let root = id(&data, "root");
        let scaled = data.model(root).primary_objective().scaled_score.unwrap();
        assert!((scaled - 0.8).abs() < 1e-6);
        assert!((data.total_points().unwrap() - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_measure_rollup_without_measures_clears_parent() {
        let mut data = two_leaves(SequencingDefinition::flow());
        let root = id(&data, "root");
        data.model_mut(root).primary_objective_mut().scaled_score = Some(0.5);
        rollup(&mut data, "a");
        assert_eq!(data.model(root).primary_objective().scaled_score, None);
    }

    #[test]
    fn test_satisfied_by_measure_uses_threshold() {
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![ActivityDefinition::leaf("a", "A")],
            )
            .with_objective(ObjectiveDefinition::primary("course").satisfied_by_measure(0.6)),
        );
        let a = id(&data, "a");
        data.model_mut(a).primary_objective_mut().scaled_score = Some(0.7);
        rollup(&mut data, "a");
        assert_eq!(data.success_status(), SuccessStatus::Passed);

        data.model_mut(a).primary_objective_mut().scaled_score = Some(0.4);
        rollup(&mut data, "a");
        assert_eq!(data.success_status(), SuccessStatus::Failed);
    }

    #[test]
    fn test_at_least_count_rule_replaces_defaults() {
        let mut rule = RollupRule::new(
            RollupChildActivitySet::AtLeastCount,
            ConditionCombination::All,
            vec![RollupCondition::new(RollupConditionKind::Completed)],
            RollupAction::Completed,
        );
        rule.minimum_count = 1;
        let mut sequencing = SequencingDefinition::flow();
        sequencing.rollup_rules.rules.push(rule);

        let mut data = two_leaves(sequencing);
        attempt(&mut data, "a", CompletionStatus::Completed);
        rollup(&mut data, "a");
        assert_eq!(data.completion_status(), CompletionStatus::Completed);
    }

    #[test]
    fn test_if_attempted_excludes_unattempted_children() {
        let mut only_attempted = SequencingDefinition::default();
        only_attempted.rollup_considerations.required_for_completed = RollupConsideration::IfAttempted;
        let mut data = data(
            ActivityDefinition::cluster(
                "root",
                "Root",
                vec![
                    ActivityDefinition::leaf("a", "A"),
                    ActivityDefinition::leaf("b", "B").with_sequencing(only_attempted),
                ],
            )
            .with_sequencing(SequencingDefinition::flow()),
        );
        attempt(&mut data, "a", CompletionStatus::Completed);
        rollup(&mut data, "a");
        assert_eq!(data.completion_status(), CompletionStatus::Completed);
    }

    #[test]
    fn test_leaf_rules_never_fire() {
        let data = two_leaves(SequencingDefinition::flow());
        let a = id(&data, "a");
        assert!(!rollup_rule_check(&data, a, RollupAction::Completed).unwrap());
    }

    #[test]
    fn test_extended_rollup_reaches_reader_parent() {
        let writer = ActivityDefinition::leaf("w", "Writer")
            .with_objective(ObjectiveDefinition::primary("w-obj").with_map(ObjectiveMap::write("shared")));
        let reader = ActivityDefinition::leaf("r", "Reader")
            .with_objective(ObjectiveDefinition::primary("r-obj").with_map(ObjectiveMap::read("shared")));
        let mut data = data(ActivityDefinition::cluster(
            "root",
            "Root",
            vec![
                ActivityDefinition::cluster("left", "Left", vec![writer]),
                ActivityDefinition::cluster("right", "Right", vec![reader]),
            ],
        ));
        let w = id(&data, "w");
        data.model_mut(w).primary_objective_mut().success_status = SuccessStatus::Passed;
        data.write_global_objectives(w);

        let right = id(&data, "right");
        assert_eq!(
            data.model(right).primary_objective().success_status,
            SuccessStatus::Unknown
        );
        Sequencer::new(&mut data, None).extended_rollup(w).unwrap();
        assert_eq!(
            data.model(right).primary_objective().success_status,
            SuccessStatus::Passed
        );
    }
}
