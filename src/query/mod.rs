pub mod engine;
pub mod order;

pub use engine::{ListRequest, Page, QueryEngine};
pub use order::{Direction, OrderTerm};
