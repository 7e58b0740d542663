//! Route handlers, one module per resource.

pub mod analysts;
pub mod application;
pub mod groups;
pub mod lookups;
pub mod notes;
pub mod users;
