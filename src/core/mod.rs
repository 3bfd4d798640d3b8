pub mod ecs;
pub mod planner;
pub mod serialization;
