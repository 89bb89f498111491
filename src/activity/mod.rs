//! Activity model: static package description, learner data model, and the
//! arena tree that ties them together.

pub mod data_model;
pub mod definition;
pub mod tree;

pub use data_model::{
    CompletionStatus, ContentNavigationRequest, Entry, ExitMode, LearningDataModel, LessonStatus,
    ObjectiveState, Score, SuccessStatus,
};
pub use definition::{ActivityDefinition, PackageDefinition, PackageFormat};
pub use tree::{Activity, ActivityId, ActivityTree};
