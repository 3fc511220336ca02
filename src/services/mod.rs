pub mod clock;
pub mod map;
pub mod markers;
pub mod orchestrator;
pub mod photoprism;
pub mod timeline;
