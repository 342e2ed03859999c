pub mod call;
pub mod graph;
pub mod loader;
