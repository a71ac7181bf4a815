//! Test harness utilities shared by the supervisor suites.

mod doubles;
mod world;

pub use doubles::{
    FIRST_PID, LaunchBehaviour, RecordingLauncher, RecordingSignaller, StubStability,
    TestShutdownSignal,
};
pub use world::{SupervisorWorld, world};
