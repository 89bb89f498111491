//! Navigation state: the activity tree plus the session cursor and the
//! tree-wide aggregates.
//!
//! `NavigatorData` is the unit that gets cloned for validity simulation and
//! for transactional navigation. Everything a sequencing pass may write lives
//! here, so a discarded clone leaves no trace.

use crate::activity::{
    ActivityId, ActivityTree, CompletionStatus, LearningDataModel, ObjectiveState,
    PackageDefinition, PackageFormat, SuccessStatus,
};
use crate::config::NavigatorConfig;
use crate::error::{InternalError, Result};
use crate::navigator::log::{self, SequencingEventType, SequencingLog, SequencingLogEntry};
use crate::sequencing::NavigationCommand;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

// ─── Global objectives ────────────────────────────────────────

/// Values of one shared objective.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalObjective {
    pub satisfied_status: Option<bool>,
    pub normalized_measure: Option<f32>,
}

/// Shared objectives, keyed by target objective id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalObjectives {
    entries: BTreeMap<String, GlobalObjective>,
}

impl GlobalObjectives {
    pub fn get(&self, name: &str) -> Option<&GlobalObjective> {
        if name.is_empty() {
            return None;
        }
        self.entries.get(name)
    }

    pub fn satisfied_status(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|g| g.satisfied_status)
    }

    pub fn normalized_measure(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(|g| g.normalized_measure)
    }

    pub fn set_satisfied_status(&mut self, name: &str, status: Option<bool>) {
        self.entries.entry(name.to_string()).or_default().satisfied_status = status;
    }

    pub fn set_normalized_measure(&mut self, name: &str, measure: Option<f32>) {
        self.entries.entry(name.to_string()).or_default().normalized_measure = measure;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GlobalObjective)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ─── Navigator data ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NavigatorData {
    tree: ActivityTree,
    format: PackageFormat,
    current: Option<ActivityId>,
    suspended: Option<ActivityId>,

    /// Tree-wide score: sum of evaluation points (1.2) or the root's scaled
    /// measure x 100 (2004).
    total_points: Option<f32>,
    /// Activities currently holding evaluation points.
    scored_activities: usize,
    completion_status: CompletionStatus,
    success_status: SuccessStatus,

    key_index: OnceLock<HashMap<String, ActivityId>>,
    global_objectives: GlobalObjectives,
    /// Activities whose tracking data was written since the last drain.
    touched: BTreeSet<ActivityId>,
    rng: StdRng,
    /// Structured log, present only when recording is enabled.
    log: Option<SequencingLog>,
}

impl NavigatorData {
    /// Build the tree for `package` and an empty session over it.
    pub fn new(package: &PackageDefinition, config: &NavigatorConfig) -> Result<Self> {
        let mut rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tree = ActivityTree::build(package, &mut rng)?;
        let mut data = Self::from_tree(tree, package.format, rng);
        if config.record_sequencing_log {
            data.log = Some(SequencingLog::new());
        }
        Ok(data)
    }

    pub fn from_tree(tree: ActivityTree, format: PackageFormat, rng: StdRng) -> Self {
        let (scored_activities, total) = tree
            .preorder()
            .into_iter()
            .filter(|_| format.is_simplified())
            .filter_map(|id| tree[id].data_model().evaluation_points())
            .fold((0usize, 0.0f32), |(n, sum), points| (n + 1, sum + points));
        Self {
            tree,
            format,
            current: None,
            suspended: None,
            total_points: (scored_activities > 0).then_some(total),
            scored_activities,
            completion_status: CompletionStatus::Unknown,
            success_status: SuccessStatus::Unknown,
            key_index: OnceLock::new(),
            global_objectives: GlobalObjectives::default(),
            touched: BTreeSet::new(),
            rng,
            log: None,
        }
    }

    /// Copy for speculative navigation.
    ///
    /// Static definitions are shared; tracking state, cursor, aggregates and
    /// global objectives are duplicated. Ids are preserved, so the cursor and
    /// key index carry over unchanged. The copy starts with no touched set
    /// and an empty log.
    pub fn clone_for_navigation_test(&self) -> Self {
        let mut tree = self.tree.clone_for_navigation_test();
        tree.sort_activity_tree();
        Self {
            tree,
            format: self.format,
            current: self.current,
            suspended: self.suspended,
            total_points: self.total_points,
            scored_activities: self.scored_activities,
            completion_status: self.completion_status,
            success_status: self.success_status,
            key_index: self.key_index.clone(),
            global_objectives: self.global_objectives.clone(),
            touched: BTreeSet::new(),
            rng: self.rng.clone(),
            log: self.log.as_ref().map(|_| SequencingLog::new()),
        }
    }

    // ── Accessors ──

    pub fn tree(&self) -> &ActivityTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut ActivityTree {
        &mut self.tree
    }

    pub fn format(&self) -> PackageFormat {
        self.format
    }

    pub fn root(&self) -> Result<ActivityId, InternalError> {
        self.tree.require_root()
    }

    pub fn current(&self) -> Option<ActivityId> {
        self.current
    }

    pub fn suspended(&self) -> Option<ActivityId> {
        self.suspended
    }

    pub(crate) fn set_current(&mut self, id: Option<ActivityId>) {
        self.current = id;
    }

    pub(crate) fn set_suspended(&mut self, id: Option<ActivityId>) {
        self.suspended = id;
    }

    pub fn total_points(&self) -> Option<f32> {
        self.total_points
    }

    pub(crate) fn set_total_points(&mut self, points: Option<f32>) {
        self.total_points = points;
    }

    pub fn completion_status(&self) -> CompletionStatus {
        self.completion_status
    }

    pub(crate) fn set_completion_status(&mut self, status: CompletionStatus) {
        self.completion_status = status;
    }

    pub fn success_status(&self) -> SuccessStatus {
        self.success_status
    }

    pub(crate) fn set_success_status(&mut self, status: SuccessStatus) {
        self.success_status = status;
    }

    pub fn global_objectives(&self) -> &GlobalObjectives {
        &self.global_objectives
    }

    /// Re-shuffle the children of `id` with the session rng. The new
    /// placements are tracking state, so the children count as touched.
    pub(crate) fn randomize_children(&mut self, id: ActivityId) {
        self.tree.randomize_children(id, &mut self.rng);
        self.touched.extend(self.tree[id].children().iter().copied());
    }

    pub fn model(&self, id: ActivityId) -> &LearningDataModel {
        self.tree[id].data_model()
    }

    /// Mutable tracking data. Marks the activity as touched.
    pub(crate) fn model_mut(&mut self, id: ActivityId) -> &mut LearningDataModel {
        self.touched.insert(id);
        self.tree.node_mut(id).data_model_mut()
    }

    pub(crate) fn take_touched(&mut self) -> BTreeSet<ActivityId> {
        std::mem::take(&mut self.touched)
    }

    // ── Sequencing log ──

    /// Emit a sequencing event and keep it if recording is enabled.
    pub(crate) fn record(
        &mut self,
        event: SequencingEventType,
        command: Option<NavigationCommand>,
        activity: Option<ActivityId>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let key = activity.map(|id| self.tree[id].key().to_string());
        log::emit(event, command, key.as_deref(), &message);
        if let Some(log) = self.log.as_mut() {
            log.push(SequencingLogEntry {
                timestamp: Utc::now(),
                event,
                command,
                activity: key,
                message,
            });
        }
    }

    pub fn sequencing_log(&self) -> Option<&SequencingLog> {
        self.log.as_ref()
    }

    /// Replace this state with a working copy that completed successfully.
    ///
    /// The working copy's log entries are appended to this log. Returns the
    /// activities the working copy wrote to.
    pub(crate) fn commit(&mut self, mut working: NavigatorData) -> BTreeSet<ActivityId> {
        let touched = working.take_touched();
        let mut log = self.log.take();
        if let (Some(log), Some(new)) = (log.as_mut(), working.log.as_mut()) {
            log.append(new);
        }
        *self = working;
        self.log = log;
        touched
    }

    // ── Lookup ──

    /// Activity with the given package key. The index is built on first use.
    ///
    /// The index is never rebuilt, so it does not see activities added to or
    /// removed from the tree afterwards. Only crate code can reach
    /// `tree_mut`, and nothing in the crate reshapes a tree once it is loaded.
    pub fn activity_key_to_activity(&self, key: &str) -> Option<ActivityId> {
        self.key_index
            .get_or_init(|| {
                self.tree
                    .preorder()
                    .into_iter()
                    .map(|id| (self.tree[id].key().to_string(), id))
                    .collect()
            })
            .get(key)
            .copied()
    }

    /// Accept an id only if it belongs to this tree.
    pub fn activity_by_id(&self, id: ActivityId) -> Option<ActivityId> {
        self.tree.get(id).map(|a| a.id())
    }

    // ── Score aggregation ──

    /// Write an activity's evaluation points and keep the tree-wide total in step.
    ///
    /// 2004 packages get their total from measure rollup, so only the
    /// simplified formats aggregate here.
    pub(crate) fn set_evaluation_points(&mut self, id: ActivityId, points: Option<f32>) {
        let old = self.model_mut(id).replace_evaluation_points(points);
        if self.format.is_simplified() {
            self.update_score(old, points);
        }
    }

    /// Adjust the running total for one activity's score transition.
    ///
    /// Only the transition to absent can empty the total, and only when no
    /// other activity still holds points.
    fn update_score(&mut self, old: Option<f32>, new: Option<f32>) {
        match (old, new) {
            (Some(old), Some(new)) => {
                self.total_points = Some(self.total_points.unwrap_or(0.0) - old + new);
            }
            (None, Some(new)) => {
                self.scored_activities += 1;
                self.total_points = Some(self.total_points.unwrap_or(0.0) + new);
            }
            (Some(old), None) => {
                self.scored_activities = self.scored_activities.saturating_sub(1);
                self.total_points = if self.scored_activities == 0 {
                    None
                } else {
                    Some(self.total_points.unwrap_or(0.0) - old)
                };
            }
            (None, None) => {}
        }
        trace!(total = ?self.total_points, scored = self.scored_activities, "score updated");
    }

    // ── Global objectives ──

    /// Satisfied status from the first readable global map, if it has one.
    pub(crate) fn read_global_satisfied(&self, objective: &ObjectiveState) -> Option<bool> {
        objective
            .maps
            .iter()
            .filter(|m| m.read_satisfied_status)
            .find_map(|m| self.global_objectives.satisfied_status(&m.target_objective_id))
    }

    /// Normalized measure from the first readable global map, if it has one.
    pub(crate) fn read_global_measure(&self, objective: &ObjectiveState) -> Option<f32> {
        objective
            .maps
            .iter()
            .filter(|m| m.read_normalized_measure)
            .find_map(|m| self.global_objectives.normalized_measure(&m.target_objective_id))
    }

    /// Publish the activity's objectives through their write maps.
    pub(crate) fn write_global_objectives(&mut self, id: ActivityId) {
        let model = self.tree[id].data_model();
        let tracked = model.tracked();
        let mut writes = Vec::new();
        for objective in model.objectives.iter().filter(|o| o.has_write_maps()) {
            let satisfied = objective
                .progress_status(tracked)
                .then(|| objective.satisfied_status());
            let measure = objective
                .measure_status(tracked)
                .then(|| objective.normalized_measure());
            for map in &objective.maps {
                if map.write_satisfied_status {
                    writes.push((map.target_objective_id.clone(), Some(satisfied), None));
                }
                if map.write_normalized_measure {
                    writes.push((map.target_objective_id.clone(), None, Some(measure)));
                }
            }
        }
        for (name, satisfied, measure) in writes {
            if let Some(satisfied) = satisfied {
                self.global_objectives.set_satisfied_status(&name, satisfied);
            }
            if let Some(measure) = measure {
                self.global_objectives.set_normalized_measure(&name, measure);
            }
        }
    }

    /// Seed a global objective, e.g. from a previous session.
    pub fn set_global_objective(&mut self, name: &str, value: GlobalObjective) {
        self.global_objectives
            .set_satisfied_status(name, value.satisfied_status);
        self.global_objectives
            .set_normalized_measure(name, value.normalized_measure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::definition::{ActivityDefinition, ObjectiveDefinition, ObjectiveMap};

    fn data(children: Vec<ActivityDefinition>) -> NavigatorData {
        let package = PackageDefinition {
            format: PackageFormat::V1p2,
            root: ActivityDefinition::cluster("root", "Root", children),
        };
        let config = NavigatorConfig {
            random_seed: Some(1),
            ..NavigatorConfig::default()
        };
        NavigatorData::new(&package, &config).unwrap()
    }

    fn three_leaves() -> NavigatorData {
        data(vec![
            ActivityDefinition::leaf("a", "A"),
            ActivityDefinition::leaf("b", "B"),
            ActivityDefinition::leaf("c", "C"),
        ])
    }

    fn id(data: &NavigatorData, key: &str) -> ActivityId {
        data.activity_key_to_activity(key).unwrap()
    }

    #[test]
    fn test_score_total_sums_present_scores() {
        let mut data = three_leaves();
        let (a, c) = (id(&data, "a"), id(&data, "c"));
        assert_eq!(data.total_points(), None);

        data.set_evaluation_points(a, Some(10.0));
        data.set_evaluation_points(c, Some(5.0));
        assert_eq!(data.total_points(), Some(15.0));
    }

    #[test]
    fn test_score_total_clears_when_last_score_cleared() {
        let mut data = three_leaves();
        let a = id(&data, "a");

        data.set_evaluation_points(a, Some(10.0));
        data.set_evaluation_points(a, None);
        assert_eq!(data.total_points(), None);

        data.set_evaluation_points(a, Some(12.0));
        assert_eq!(data.total_points(), Some(12.0));
    }

    #[test]
    fn test_score_total_keeps_other_scores() {
        let mut data = three_leaves();
        let (a, c) = (id(&data, "a"), id(&data, "c"));
        data.set_evaluation_points(a, Some(10.0));
        data.set_evaluation_points(c, Some(5.0));
        data.set_evaluation_points(a, None);
        assert_eq!(data.total_points(), Some(5.0));

        data.set_evaluation_points(c, Some(7.5));
        assert_eq!(data.total_points(), Some(7.5));
    }

    #[test]
    fn test_prior_tracking_seeds_total() {
        let mut scored = ActivityDefinition::leaf("a", "A");
        scored.tracking = Some(crate::activity::definition::TrackingSnapshot {
            evaluation_points: Some(4.0),
            ..Default::default()
        });
        let data = data(vec![scored, ActivityDefinition::leaf("b", "B")]);
        assert_eq!(data.total_points(), Some(4.0));
    }

    #[test]
    fn test_key_lookup_returns_none_for_unknown() {
        let data = three_leaves();
        assert!(data.activity_key_to_activity("b").is_some());
        assert_eq!(data.activity_key_to_activity("missing"), None);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut data = three_leaves();
        let a = id(&data, "a");
        data.set_current(Some(a));
        data.set_evaluation_points(a, Some(3.0));
        data.take_touched();

        let mut clone = data.clone_for_navigation_test();
        assert_eq!(clone.current(), Some(a));
        assert_eq!(clone.activity_key_to_activity("a"), Some(a));

        clone.set_evaluation_points(a, Some(9.0));
        clone.model_mut(a).attempt_count = 4;
        clone.set_current(None);

        assert_eq!(data.total_points(), Some(3.0));
        assert_eq!(data.model(a).attempt_count, 0);
        assert_eq!(data.current(), Some(a));
        assert!(data.take_touched().is_empty());
    }

    #[test]
    fn test_model_mut_marks_touched() {
        let mut data = three_leaves();
        let b = id(&data, "b");
        data.model_mut(b).is_active = true;
        let touched = data.take_touched();
        assert!(touched.contains(&b));
        assert!(data.take_touched().is_empty());
    }

    #[test]
    fn test_global_objective_round_trip_through_maps() {
        let writer = ActivityDefinition::leaf("a", "A")
            .with_objective(ObjectiveDefinition::primary("p").with_map(ObjectiveMap::write("g1")));
        let reader = ActivityDefinition::leaf("b", "B")
            .with_objective(ObjectiveDefinition::primary("q").with_map(ObjectiveMap::read("g1")));
        let mut data = data(vec![writer, reader]);
        let (a, b) = (id(&data, "a"), id(&data, "b"));

        let primary = data.model_mut(a).primary_objective_mut();
        primary.success_status = SuccessStatus::Passed;
        primary.scaled_score = Some(0.75);
        data.write_global_objectives(a);

        assert_eq!(data.global_objectives().satisfied_status("g1"), Some(true));
        let objective = data.model(b).primary_objective().clone();
        assert_eq!(data.read_global_satisfied(&objective), Some(true));
        assert_eq!(data.read_global_measure(&objective), Some(0.75));
    }

    #[test]
    fn test_empty_global_name_reads_nothing() {
        let mut globals = GlobalObjectives::default();
        globals.set_satisfied_status("", Some(true));
        assert_eq!(globals.satisfied_status(""), None);
    }
}
