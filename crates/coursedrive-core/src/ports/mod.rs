//! Port definitions (hexagonal architecture)

pub mod course_provider;
pub mod state_store;

pub use course_provider::{ByteStream, ICourseProvider};
pub use state_store::IStateStore;
