//! API endpoint handlers, one module per resource.

pub mod batch;
pub mod conversations;
pub mod edit;
pub mod findings;
pub mod forms;
pub mod health;
