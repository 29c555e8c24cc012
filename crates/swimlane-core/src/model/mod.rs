pub mod item;
pub mod stage;
pub mod status;

pub use item::{ItemId, ItemPatch, Placement, SubcategoryUpdate, WorkItem};
pub use stage::{Stage, StageGroup, StageId, StagePatch};
pub use status::{ParseEnumError, Status};
