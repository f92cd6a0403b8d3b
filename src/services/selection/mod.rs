pub mod filter;
pub mod selector;

pub use filter::is_eligible;
pub use selector::{file_priority, select_next_batch};
