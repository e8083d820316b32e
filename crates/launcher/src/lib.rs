//! `launcher` crate — the `InstanceLauncher` trait and its implementations.
//!
//! The engine never runs a job itself: it hands a step's specification and
//! resolved variables to an [`InstanceLauncher`] and later learns about the
//! outcome from a `PodMessage`.

pub mod command;
pub mod error;
pub mod mock;
pub mod process;
pub mod traits;

pub use command::{render, CommandError};
pub use error::LaunchError;
pub use process::{ProcessLauncher, ProcessLauncherConfig};
pub use traits::{InstanceLauncher, LaunchParameters, Launched};
