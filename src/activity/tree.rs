//! Activity arena.
//!
//! Activities live in a flat `Vec` owned by [`ActivityTree`] and refer to
//! each other by [`ActivityId`]. Parent, sibling and child links are plain
//! indices, so a tree can be cloned wholesale without fixing up pointers.
//!
//! # Invariants
//!
//! - Child-list order, sibling-link order and `position()` order agree after
//!   every `sort_children` call. Any child-list mutation goes through
//!   `add_child`/`remove_child`, which re-link siblings.
//! - The root is set exactly once.

use super::data_model::LearningDataModel;
use super::definition::{
    ActivityDefinition, HideLmsUi, PackageDefinition, PackageFormat, RandomizationTiming,
    ResourceReference, ResourceType, SequencingDefinition,
};
use crate::error::InternalError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Process-local activity identifier. Stable for the lifetime of a tree and
/// preserved by cloning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(pub u32);

impl ActivityId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Activity ─────────────────────────────────────────────────

/// A node in the activity tree.
#[derive(Debug, Clone)]
pub struct Activity {
    id: ActivityId,
    /// Read-only package data, shared between a tree and its clones.
    /// Children are held by the arena, not here.
    definition: Arc<ActivityDefinition>,
    orig_placement: u32,
    random_placement: Option<u32>,

    parent: Option<ActivityId>,
    next: Option<ActivityId>,
    previous: Option<ActivityId>,
    children: Vec<ActivityId>,

    data_model: LearningDataModel,
    is_valid_to_navigate_to: bool,
    persistence_id: Option<Uuid>,
}

impl Activity {
    fn new(
        id: ActivityId,
        definition: Arc<ActivityDefinition>,
        data_model: LearningDataModel,
        orig_placement: u32,
    ) -> Self {
        Self {
            id,
            definition,
            orig_placement,
            random_placement: None,
            parent: None,
            next: None,
            previous: None,
            children: Vec::new(),
            data_model,
            is_valid_to_navigate_to: false,
            persistence_id: None,
        }
    }

    /// Copy for speculative navigation: shares the static definition,
    /// duplicates links and tracking state.
    pub fn clone_for_navigation_test(&self) -> Self {
        Self {
            id: self.id,
            definition: Arc::clone(&self.definition),
            orig_placement: self.orig_placement,
            random_placement: self.random_placement,
            parent: self.parent,
            next: self.next,
            previous: self.previous,
            children: self.children.clone(),
            data_model: self.data_model.clone(),
            is_valid_to_navigate_to: self.is_valid_to_navigate_to,
            persistence_id: self.persistence_id,
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn title(&self) -> &str {
        &self.definition.title
    }

    pub fn is_visible(&self) -> bool {
        self.definition.is_visible
    }

    pub fn resource(&self) -> Option<&ResourceReference> {
        self.definition.resource.as_ref()
    }

    /// Identifier of the launched resource, empty when there is none.
    pub fn resource_key(&self) -> &str {
        self.resource().map(|r| r.identifier.as_str()).unwrap_or("")
    }

    /// Whether the activity launches anything.
    pub fn has_resource(&self) -> bool {
        !self.resource_key().is_empty()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource()
            .map(|r| r.resource_type)
            .unwrap_or(ResourceType::None)
    }

    pub fn default_resource_file(&self) -> Option<&str> {
        self.resource().and_then(|r| r.href.as_deref())
    }

    pub fn xml_base(&self) -> Option<&str> {
        self.resource().and_then(|r| r.xml_base.as_deref())
    }

    pub fn parameters(&self) -> Option<&str> {
        self.definition.parameters.as_deref()
    }

    pub fn hide_lms_ui(&self) -> HideLmsUi {
        self.definition.hide_lms_ui
    }

    pub fn prerequisites(&self) -> Option<&str> {
        self.definition.prerequisites.as_deref()
    }

    pub fn sequencing(&self) -> &SequencingDefinition {
        &self.definition.sequencing
    }

    pub fn definition(&self) -> &ActivityDefinition {
        &self.definition
    }

    /// Sort key within the parent: random placement if assigned, else the
    /// original package order.
    pub fn position(&self) -> u32 {
        self.random_placement.unwrap_or(self.orig_placement)
    }

    pub fn random_placement(&self) -> Option<u32> {
        self.random_placement
    }

    pub fn parent(&self) -> Option<ActivityId> {
        self.parent
    }

    pub fn next(&self) -> Option<ActivityId> {
        self.next
    }

    pub fn previous(&self) -> Option<ActivityId> {
        self.previous
    }

    pub fn children(&self) -> &[ActivityId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn data_model(&self) -> &LearningDataModel {
        &self.data_model
    }

    pub(crate) fn data_model_mut(&mut self) -> &mut LearningDataModel {
        &mut self.data_model
    }

    /// Snapshot flag computed by the last table-of-contents load.
    pub fn is_valid_to_navigate_to(&self) -> bool {
        self.is_valid_to_navigate_to
    }

    pub(crate) fn set_valid_to_navigate_to(&mut self, valid: bool) {
        self.is_valid_to_navigate_to = valid;
    }

    /// Identifier assigned by the persistence collaborator.
    pub fn persistence_id(&self) -> Option<Uuid> {
        self.persistence_id
    }

    pub fn set_persistence_id(&mut self, id: Uuid) {
        self.persistence_id = Some(id);
    }
}

// ─── Tree ─────────────────────────────────────────────────────

/// Arena owning every activity of one package.
#[derive(Debug, Clone, Default)]
pub struct ActivityTree {
    nodes: Vec<Activity>,
    root: Option<ActivityId>,
}

impl Index<ActivityId> for ActivityTree {
    type Output = Activity;

    fn index(&self, id: ActivityId) -> &Activity {
        &self.nodes[id.index()]
    }
}

impl ActivityTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a package description.
    ///
    /// Selection (`selectionTiming = once`) and randomization
    /// (`randomizationTiming = once | onEachNewAttempt` with `reorderChildren`)
    /// are resolved here, once, using `rng`.
    pub fn build<R: Rng + ?Sized>(
        package: &PackageDefinition,
        rng: &mut R,
    ) -> Result<Self, InternalError> {
        let mut tree = Self::new();
        let root = tree.insert_definition(None, &package.root, package.format, 0, rng);
        tree.set_root(root)?;
        Ok(tree)
    }

    fn insert_definition<R: Rng + ?Sized>(
        &mut self,
        parent: Option<ActivityId>,
        definition: &ActivityDefinition,
        format: PackageFormat,
        placement: u32,
        rng: &mut R,
    ) -> ActivityId {
        let controls = definition.sequencing.randomization;
        let mut children: Vec<&ActivityDefinition> = definition.children.iter().collect();

        if controls.selection_timing == RandomizationTiming::Once {
            if let Some(count) = controls.select_count.map(|c| c as usize) {
                if count > 0 && count < children.len() {
                    while children.len() > count {
                        let victim = rng.gen_range(0..children.len());
                        children.remove(victim);
                    }
                    debug!(activity = %definition.key, count, "selected child subset");
                }
            }
        }

        let id = self.push(parent, definition, format, placement);
        for (index, child) in children.into_iter().enumerate() {
            self.insert_definition(Some(id), child, format, index as u32, rng);
        }

        if controls.reorder_children
            && matches!(
                controls.randomization_timing,
                RandomizationTiming::Once | RandomizationTiming::OnEachNewAttempt
            )
        {
            self.randomize_children(id, rng);
        }
        id
    }

    fn push(
        &mut self,
        parent: Option<ActivityId>,
        definition: &ActivityDefinition,
        format: PackageFormat,
        placement: u32,
    ) -> ActivityId {
        let id = ActivityId(self.nodes.len() as u32);
        let data_model = LearningDataModel::new(format, definition, definition.children.is_empty());
        let shared = Arc::new(ActivityDefinition {
            children: Vec::new(),
            ..definition.clone()
        });
        let mut activity = Activity::new(id, shared, data_model, placement);
        activity.parent = parent;
        self.nodes.push(activity);

        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(id);
            self.relink_children(parent);
        }
        id
    }

    // ── Root ──

    pub fn root(&self) -> Option<ActivityId> {
        self.root
    }

    pub fn require_root(&self) -> Result<ActivityId, InternalError> {
        self.root.ok_or(InternalError::MissingRoot)
    }

    /// Set the root. Setting it a second time is a programming error.
    pub fn set_root(&mut self, id: ActivityId) -> Result<(), InternalError> {
        if self.root.is_some() {
            return Err(InternalError::RootAlreadySet);
        }
        self.root = Some(id);
        Ok(())
    }

    // ── Access ──

    pub fn get(&self, id: ActivityId) -> Option<&Activity> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: ActivityId) -> &mut Activity {
        &mut self.nodes[id.index()]
    }

    /// Number of activities ever added, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.nodes.iter()
    }

    /// Independent copy sharing only the static definitions.
    pub fn clone_for_navigation_test(&self) -> Self {
        Self {
            nodes: self
                .nodes
                .iter()
                .map(Activity::clone_for_navigation_test)
                .collect(),
            root: self.root,
        }
    }

    // ── Structure mutation ──

    /// Append a new child built from `definition` (its own children are ignored).
    pub fn add_child(
        &mut self,
        parent: ActivityId,
        definition: &ActivityDefinition,
        format: PackageFormat,
    ) -> ActivityId {
        let placement = self[parent].children.len() as u32;
        self.push(Some(parent), definition, format, placement)
    }

    /// Detach `child` from `parent`. Returns false when it was not a child.
    ///
    /// The detached activity stays in the arena but is unreachable from the root.
    pub fn remove_child(&mut self, parent: ActivityId, child: ActivityId) -> bool {
        let children = &mut self.nodes[parent.index()].children;
        let Some(index) = children.iter().position(|c| *c == child) else {
            return false;
        };
        children.remove(index);
        let detached = &mut self.nodes[child.index()];
        detached.parent = None;
        detached.next = None;
        detached.previous = None;
        self.relink_children(parent);
        true
    }

    pub(crate) fn set_random_placement(&mut self, id: ActivityId, placement: Option<u32>) {
        self.nodes[id.index()].random_placement = placement;
    }

    /// Sort the children of `id` by position and re-link siblings. Equal
    /// positions keep insertion order, which ids follow.
    pub fn sort_children(&mut self, id: ActivityId) {
        let mut children = std::mem::take(&mut self.nodes[id.index()].children);
        children.sort_by_key(|c| (self.nodes[c.index()].position(), *c));
        self.nodes[id.index()].children = children;
        self.relink_children(id);
    }

    /// Sort every reachable activity's children.
    pub fn sort_activity_tree(&mut self) {
        for id in self.preorder() {
            self.sort_children(id);
        }
    }

    fn relink_children(&mut self, id: ActivityId) {
        let children = self.nodes[id.index()].children.clone();
        for (i, child) in children.iter().enumerate() {
            let node = &mut self.nodes[child.index()];
            node.previous = i.checked_sub(1).map(|p| children[p]);
            node.next = children.get(i + 1).copied();
        }
    }

    /// Shuffle the children of `id`, record their new placements and re-sort.
    pub fn randomize_children<R: Rng + ?Sized>(&mut self, id: ActivityId, rng: &mut R) {
        let mut children = self.nodes[id.index()].children.clone();
        children.shuffle(rng);
        for (placement, child) in children.iter().enumerate() {
            self.set_random_placement(*child, Some(placement as u32));
        }
        self.sort_children(id);
        debug!(activity = %self[id].key(), "randomized child order");
    }

    // ── Traversal ──

    /// Every reachable activity, parents before children, children left to right.
    pub fn preorder(&self) -> Vec<ActivityId> {
        match self.root {
            Some(root) => self.preorder_from(root),
            None => Vec::new(),
        }
    }

    /// The subtree rooted at `top`, in preorder.
    pub fn preorder_from(&self, top: ActivityId) -> Vec<ActivityId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self[id].children.iter().rev().copied());
        }
        order
    }

    /// `id` followed by each of its ancestors up to the root.
    pub fn ancestors(&self, id: ActivityId) -> impl Iterator<Item = ActivityId> + '_ {
        std::iter::successors(Some(id), move |a| self[*a].parent)
    }

    /// Activities from the root down to `id`, both inclusive.
    pub fn path_from_root(&self, id: ActivityId) -> Vec<ActivityId> {
        let mut path: Vec<ActivityId> = self.ancestors(id).collect();
        path.reverse();
        path
    }

    /// True when `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: ActivityId, id: ActivityId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Nearest activity that is an ancestor-or-self of both `a` and `b`.
    ///
    /// Two activities of one tree always share the root; no hit means one of
    /// them was detached.
    pub fn find_common_ancestor(
        &self,
        a: ActivityId,
        b: ActivityId,
    ) -> Result<ActivityId, InternalError> {
        let seen: HashSet<ActivityId> = self.ancestors(a).collect();
        self.ancestors(b)
            .find(|id| seen.contains(id))
            .ok_or(InternalError::NoCommonAncestor(a, b))
    }

    pub fn is_leaf(&self, id: ActivityId) -> bool {
        self[id].is_leaf()
    }

    /// A leaf with no following sibling on any ancestor.
    pub fn is_last_activity_in_tree(&self, id: ActivityId) -> bool {
        self.is_leaf(id) && self.ancestors(id).all(|a| self[a].next.is_none())
    }

    pub fn next_in_preorder(&self, id: ActivityId) -> Option<ActivityId> {
        if let Some(first) = self[id].children.first() {
            return Some(*first);
        }
        self.ancestors(id).find_map(|a| self[a].next)
    }

    pub fn previous_in_preorder(&self, id: ActivityId) -> Option<ActivityId> {
        let Some(mut node) = self[id].previous else {
            return self[id].parent;
        };
        while let Some(last) = self[node].children.last() {
            node = *last;
        }
        Some(node)
    }

    /// Whether `a` comes before `b` in preorder.
    pub fn precedes_in_preorder(&self, a: ActivityId, b: ActivityId) -> bool {
        let order = self.preorder();
        let pos = |id| order.iter().position(|x| *x == id);
        matches!((pos(a), pos(b)), (Some(pa), Some(pb)) if pa < pb)
    }

    /// Whether any descendant is visible: a leaf counts by its own flag, a
    /// cluster by its descendants.
    pub fn has_visible_children(&self, id: ActivityId) -> bool {
        self[id].children.iter().any(|child| {
            if self.is_leaf(*child) {
                self[*child].is_visible()
            } else {
                self.has_visible_children(*child)
            }
        })
    }

    /// Activity with the given package key, by linear scan.
    pub fn find_by_key(&self, key: &str) -> Option<ActivityId> {
        self.preorder().into_iter().find(|id| self[*id].key() == key)
    }
}
