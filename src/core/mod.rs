pub mod config;
pub mod config_loader;
pub mod error;
pub mod marker;
pub mod state_machine;
pub mod traits;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader};
pub use error::*;
pub use marker::ProgressMarker;
pub use state_machine::{RunState, RunStateMachine, StateTransition};
pub use traits::*;
