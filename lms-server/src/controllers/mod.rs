pub mod enrollments;
pub mod groups;
pub mod permissions;
