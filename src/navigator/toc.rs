//! Table of contents: a read-only view of the tree with a per-node
//! "valid to navigate to" flag.
//!
//! The flag is a snapshot. It holds until the next navigation or data-model
//! write.

use super::{AttemptStatus, Navigator};
use crate::activity::definition::ResourceType;
use crate::activity::{ActivityId, ActivityTree};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocNode {
    pub id: ActivityId,
    pub key: String,
    pub title: String,
    pub is_visible: bool,
    pub valid_to_navigate_to: bool,
    pub children: Vec<TocNode>,
}

impl TocNode {
    fn build(tree: &ActivityTree, id: ActivityId) -> Self {
        let activity = &tree[id];
        Self {
            id,
            key: activity.key().to_string(),
            title: activity.title().to_string(),
            is_visible: activity.is_visible(),
            valid_to_navigate_to: activity.is_valid_to_navigate_to(),
            children: activity
                .children()
                .iter()
                .map(|child| Self::build(tree, *child))
                .collect(),
        }
    }

    /// Depth-first search by package key.
    pub fn find(&self, key: &str) -> Option<&TocNode> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    /// Keys of every node flagged valid, in preorder.
    pub fn valid_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_valid(&mut keys);
        keys
    }

    fn collect_valid<'a>(&'a self, keys: &mut Vec<&'a str>) {
        if self.valid_to_navigate_to {
            keys.push(&self.key);
        }
        for child in &self.children {
            child.collect_valid(keys);
        }
    }
}

impl Navigator {
    /// Refresh every activity's navigability flag and return the view.
    ///
    /// With `evaluate_sequencing_rules`, each candidate runs one choice
    /// simulation; without, only static data decides.
    pub fn load_table_of_contents(&mut self, evaluate_sequencing_rules: bool) -> Result<TocNode> {
        let root = self.data.root()?;
        let flags: Vec<(ActivityId, bool)> = if self.format().is_simplified() {
            self.data
                .tree()
                .preorder()
                .into_iter()
                .map(|id| (id, self.data.tree()[id].resource_type() != ResourceType::None))
                .collect()
        } else {
            self.full_sequencing_flags(root, evaluate_sequencing_rules)?
        };

        let tree = self.data.tree_mut();
        for (id, valid) in flags {
            tree.node_mut(id).set_valid_to_navigate_to(valid);
        }
        debug!(evaluate_sequencing_rules, "table of contents loaded");
        Ok(TocNode::build(self.data.tree(), root))
    }

    fn full_sequencing_flags(
        &self,
        root: ActivityId,
        evaluate: bool,
    ) -> Result<Vec<(ActivityId, bool)>> {
        let tree = self.data.tree();
        let mut flags: BTreeMap<_, _> = tree.preorder().into_iter().map(|id| (id, false)).collect();
        if self.attempt_status != AttemptStatus::Active {
            return Ok(flags.into_iter().collect());
        }

        // Choice cannot leave the nearest ancestor that forbids choice exit.
        let top = self
            .data
            .current()
            .and_then(|current| {
                tree.ancestors(current)
                    .find(|a| !tree[*a].sequencing().control_mode.choice_exit)
            })
            .unwrap_or(root);

        for id in tree.preorder_from(top) {
            let parent_allows_choice = tree[id]
                .parent()
                .map_or(true, |parent| tree[parent].sequencing().control_mode.choice);
            let valid = if !parent_allows_choice {
                false
            } else if evaluate {
                self.is_navigation_to_valid_id(id)?
            } else {
                true
            };
            flags.insert(id, valid);
        }
        Ok(flags.into_iter().collect())
    }
}
