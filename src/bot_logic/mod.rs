// Modules
pub mod composer;
pub mod dispatcher;
pub mod models;
pub mod renderer;
pub mod sequencer;
pub mod states;

// Re-export the pipeline entry points
pub use dispatcher::{spawn_event_loop, DispatchSettings, Dispatcher};
