pub mod conversation;
pub mod generator;
pub mod memory;
pub mod orchestrator;
