pub mod build;
pub mod diff;
pub mod validate;
