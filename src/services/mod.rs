pub mod audit;
pub mod checkpoint;
pub mod context;
pub mod dlq;
pub mod github;
pub mod selection;
pub mod workflow;
