pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Health, Init, Migrate, Plan, Version};
