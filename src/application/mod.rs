//! Application layer: the `Orchestrator` facade that realizes the Command
//! Interface (§4.1) on top of the run-execution engine's services.

pub mod orchestrator;
pub mod storyboard_loader;

pub use orchestrator::{Orchestrator, OrchestratorError};
pub use storyboard_loader::{load_storyboard_file, StoryboardLoadError};
