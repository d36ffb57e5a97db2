pub mod convert;
pub mod courses;
pub mod enrollments;
pub mod groups;
mod model;
mod pool;
pub mod users;

pub use model::{List, Pagination, ID};
pub use pool::connection_manager;
