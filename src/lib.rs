//! SCORM sequencing and navigation engine
//!
//! Decides, for a learner working through a tree of learning activities,
//! which activity is current, whether a navigation request is legal, and how
//! completion, success and score roll up the tree.
//!
//! ## Architecture
//! Package description -> Activity tree -> Navigator -> Sequencing state machine
//!
//! - SCORM 2004 packages run the full Overall Sequencing Process with
//!   rule-based rollup.
//! - SCORM 1.2 and LRM packages run the simplified process: preorder flow,
//!   prerequisites and score aggregation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scorm_seqnav::activity::{ActivityDefinition, PackageDefinition, PackageFormat};
//! use scorm_seqnav::activity::definition::SequencingDefinition;
//! use scorm_seqnav::{NavigationCommand, Navigator, NavigatorConfig};
//!
//! let package = PackageDefinition {
//!     format: PackageFormat::V1p3,
//!     root: ActivityDefinition::cluster(
//!         "course",
//!         "Course",
//!         vec![
//!             ActivityDefinition::leaf("intro", "Introduction"),
//!             ActivityDefinition::leaf("quiz", "Quiz"),
//!         ],
//!     )
//!     .with_sequencing(SequencingDefinition::choice_and_flow()),
//! };
//! let mut navigator = Navigator::new(&package, NavigatorConfig::default())?;
//! navigator.navigate(NavigationCommand::Start)?;
//! assert!(navigator.is_navigation_valid(NavigationCommand::Continue)?);
//! # Ok::<(), scorm_seqnav::NavigatorError>(())
//! ```

// Error taxonomy and clause codes
pub mod error;

// Configuration
pub mod config;

// Static package data, learner data model, activity arena
pub mod activity;

// Orchestration, table of contents, persistence seam
pub mod navigator;

// State machines, rules, rollup, prerequisites
pub mod sequencing;

pub use activity::{ActivityId, PackageDefinition, PackageFormat};
pub use config::NavigatorConfig;
pub use error::{InternalError, NavigatorError, Result, SequencingCode, SequencingFailure};
pub use navigator::data::{GlobalObjective, NavigatorData};
pub use navigator::store::{ActivityRecord, ActivityStore, MemoryStore};
pub use navigator::toc::TocNode;
pub use navigator::{AttemptStatus, Navigator};
pub use sequencing::{NavigationCommand, SequencingStateMachine};
