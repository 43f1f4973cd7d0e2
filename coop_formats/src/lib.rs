pub mod catalog;
pub mod section;

pub use catalog::{scan_missions, MissionFileEntry};
pub use section::{SectionError, SectionFile};
