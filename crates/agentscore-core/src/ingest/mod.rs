pub mod middleware;
pub mod processor;
pub mod store;
