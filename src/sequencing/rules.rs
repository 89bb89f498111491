//! Rule evaluation shared by sequencing and rollup.
//!
//! Conditions evaluate to `Option<bool>`: `None` means the value cannot be
//! determined from the tracking data. Conditions combine with three-valued
//! AND/OR and a rule applies only when the combination is `Some(true)`.

use crate::activity::definition::{
    ConditionCombination, ConditionOperator, RollupCondition, RollupConditionKind, RollupRule,
    RuleAction, RuleCondition, RuleConditionKind, SequencingRule,
};
use crate::activity::{ActivityId, ObjectiveState};
use crate::error::{InternalError, Result};
use crate::navigator::data::NavigatorData;

// ─── Three-valued logic ───────────────────────────────────────

pub fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn apply_operator(operator: ConditionOperator, value: Option<bool>) -> Option<bool> {
    match operator {
        ConditionOperator::NoOp => value,
        ConditionOperator::Not => value.map(|v| !v),
    }
}

/// Fold condition values with the rule's combination. No conditions is unknown.
pub fn combine(
    combination: ConditionCombination,
    values: impl IntoIterator<Item = Option<bool>>,
) -> Option<bool> {
    let mut values = values.into_iter();
    let first = values.next()?;
    values.fold(first, |acc, value| match combination {
        ConditionCombination::All => and3(acc, value),
        ConditionCombination::Any => or3(acc, value),
    })
}

// ─── Objective status ─────────────────────────────────────────

fn objective<'a>(
    data: &'a NavigatorData,
    activity: ActivityId,
    id: Option<&str>,
) -> Result<&'a ObjectiveState> {
    let model = data.model(activity);
    match id.filter(|id| !id.is_empty()) {
        None => Ok(model.primary_objective()),
        Some(id) => model.objective(id).ok_or_else(|| {
            InternalError::UnknownObjective {
                activity: data.tree()[activity].key().to_string(),
                objective: id.to_string(),
            }
            .into()
        }),
    }
}

/// `(progress status, satisfied status)` of an objective, falling back to
/// the shared objectives when the local status is unknown.
///
/// Read maps are not honored for untracked activities.
pub fn objective_satisfied_status(
    data: &NavigatorData,
    activity: ActivityId,
    objective_id: Option<&str>,
) -> Result<(bool, bool)> {
    let obj = objective(data, activity, objective_id)?;
    let model = data.model(activity);
    let tracked = model.tracked();
    let measure_counts = !model.is_active
        || data.tree()[activity]
            .sequencing()
            .rollup_considerations
            .measure_satisfaction_if_active;

    let (mut progress, mut satisfied) = if obj.satisfied_by_measure {
        if measure_counts {
            (
                obj.measure_status(tracked),
                obj.normalized_measure() >= obj.min_normalized_measure,
            )
        } else {
            (false, false)
        }
    } else {
        (obj.progress_status(tracked), obj.satisfied_status())
    };

    if !progress && tracked {
        if obj.satisfied_by_measure {
            if measure_counts {
                match data.read_global_measure(obj) {
                    Some(measure) => {
                        progress = true;
                        satisfied = measure >= obj.min_normalized_measure;
                    }
                    None => {
                        progress = false;
                        satisfied = false;
                    }
                }
            }
        } else if let Some(global) = data.read_global_satisfied(obj) {
            progress = true;
            satisfied = global;
        }
    }
    Ok((progress, satisfied))
}

/// `(measure status, normalized measure)` of an objective, with the same
/// shared-objective fallback.
pub fn objective_normalized_measure(
    data: &NavigatorData,
    activity: ActivityId,
    objective_id: Option<&str>,
) -> Result<(bool, f32)> {
    let obj = objective(data, activity, objective_id)?;
    let tracked = data.model(activity).tracked();
    if obj.measure_status(tracked) {
        return Ok((true, obj.normalized_measure()));
    }
    if tracked {
        if let Some(measure) = data.read_global_measure(obj) {
            return Ok((true, measure));
        }
    }
    Ok((false, obj.normalized_measure()))
}

fn attempt_limit_exceeded(data: &NavigatorData, activity: ActivityId) -> bool {
    let limit = data.tree()[activity]
        .sequencing()
        .limit_conditions
        .attempt_limit;
    matches!(limit, Some(limit) if data.model(activity).attempt_count >= limit)
}

// ─── Sequencing rules ─────────────────────────────────────────

fn evaluate_rule_condition(
    data: &NavigatorData,
    activity: ActivityId,
    condition: &RuleCondition,
) -> Result<Option<bool>> {
    let model = data.model(activity);
    let referenced = condition.referenced_objective.as_deref();
    let value = match condition.condition {
        RuleConditionKind::Always => Some(true),
        RuleConditionKind::Satisfied => {
            let (progress, satisfied) = objective_satisfied_status(data, activity, referenced)?;
            progress.then_some(satisfied)
        }
        RuleConditionKind::ObjectiveStatusKnown => {
            Some(objective_satisfied_status(data, activity, referenced)?.0)
        }
        RuleConditionKind::ObjectiveMeasureKnown => {
            Some(objective_normalized_measure(data, activity, referenced)?.0)
        }
        RuleConditionKind::ObjectiveMeasureGreaterThan => {
            let (known, measure) = objective_normalized_measure(data, activity, referenced)?;
            known.then_some(measure > condition.measure_threshold)
        }
        RuleConditionKind::ObjectiveMeasureLessThan => {
            let (known, measure) = objective_normalized_measure(data, activity, referenced)?;
            known.then_some(measure < condition.measure_threshold)
        }
        RuleConditionKind::Completed => model
            .attempt_progress_status()
            .then(|| model.attempt_completion_status()),
        RuleConditionKind::ActivityProgressKnown => {
            Some(model.activity_progress_status && model.attempt_progress_status())
        }
        RuleConditionKind::Attempted => Some(model.attempt_count > 0),
        RuleConditionKind::AttemptLimitExceeded => Some(attempt_limit_exceeded(data, activity)),
        // Time-based limits are not tracked.
        RuleConditionKind::TimeLimitExceeded | RuleConditionKind::OutsideAvailableTimeRange => {
            Some(false)
        }
    };
    Ok(apply_operator(condition.operator, value))
}

/// Whether a single sequencing rule applies to `activity`.
pub fn sequencing_rule_applies(
    data: &NavigatorData,
    activity: ActivityId,
    rule: &SequencingRule,
) -> Result<bool> {
    let values = rule
        .conditions
        .iter()
        .map(|c| evaluate_rule_condition(data, activity, c))
        .collect::<Result<Vec<_>>>()?;
    Ok(combine(rule.condition_combination, values) == Some(true))
}

/// Whether any rule with `action` applies.
pub fn rules_check_action(
    data: &NavigatorData,
    activity: ActivityId,
    rules: &[SequencingRule],
    action: RuleAction,
) -> Result<bool> {
    for rule in rules.iter().filter(|r| r.action == action) {
        if sequencing_rule_applies(data, activity, rule)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Action of the first rule that applies, in document order.
pub fn rules_check(
    data: &NavigatorData,
    activity: ActivityId,
    rules: &[SequencingRule],
) -> Result<Option<RuleAction>> {
    for rule in rules {
        if sequencing_rule_applies(data, activity, rule)? {
            return Ok(Some(rule.action));
        }
    }
    Ok(None)
}

/// Whether a pre-condition rule with `action` applies to `activity`.
pub fn pre_condition(data: &NavigatorData, activity: ActivityId, action: RuleAction) -> Result<bool> {
    let rules = &data.tree()[activity].sequencing().pre_condition_rules;
    rules_check_action(data, activity, rules, action)
}

/// Whether starting a new attempt would violate the attempt limit.
pub fn limit_conditions_violated(data: &NavigatorData, activity: ActivityId) -> bool {
    let model = data.model(activity);
    if !model.tracked() || model.is_active || model.is_suspended {
        return false;
    }
    attempt_limit_exceeded(data, activity)
}

/// Whether the activity is disabled or over its limits.
pub fn check_activity(data: &NavigatorData, activity: ActivityId) -> Result<bool> {
    Ok(pre_condition(data, activity, RuleAction::Disabled)?
        || limit_conditions_violated(data, activity))
}

// ─── Rollup conditions ────────────────────────────────────────

fn evaluate_rollup_condition(
    data: &NavigatorData,
    activity: ActivityId,
    condition: &RollupCondition,
) -> Result<Option<bool>> {
    let model = data.model(activity);
    let tracked = model.tracked();
    let value = match condition.condition {
        RollupConditionKind::ActivityProgressKnown => Some(model.attempt_progress_status()),
        RollupConditionKind::Attempted => Some(model.attempt_count > 0),
        RollupConditionKind::AttemptLimitExceeded => Some(attempt_limit_exceeded(data, activity)),
        RollupConditionKind::Completed => model
            .attempt_progress_status()
            .then(|| model.attempt_completion_status()),
        RollupConditionKind::ObjectiveMeasureKnown => {
            Some(model.primary_objective().measure_status(tracked))
        }
        RollupConditionKind::ObjectiveStatusKnown => {
            Some(model.primary_objective().progress_status(tracked))
        }
        RollupConditionKind::Satisfied => {
            let (progress, satisfied) = objective_satisfied_status(data, activity, None)?;
            progress.then_some(satisfied)
        }
        RollupConditionKind::TimeLimitExceeded | RollupConditionKind::OutsideAvailableTimeRange => {
            Some(false)
        }
    };
    Ok(apply_operator(condition.operator, value))
}

/// Evaluate a rollup rule's conditions against one child.
pub fn evaluate_rollup_conditions(
    data: &NavigatorData,
    child: ActivityId,
    rule: &RollupRule,
) -> Result<Option<bool>> {
    let values = rule
        .conditions
        .iter()
        .map(|c| evaluate_rollup_condition(data, child, c))
        .collect::<Result<Vec<_>>>()?;
    Ok(combine(rule.condition_combination, values))
}
