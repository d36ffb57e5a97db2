pub mod clock;
pub mod enrollment;
pub mod groups;
