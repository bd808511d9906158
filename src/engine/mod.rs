//! Queue engine: intake on one side, the single dispatcher on the other.

pub mod dispatcher;
pub mod executor;
pub mod intake;

pub use dispatcher::{Dispatch, Dispatcher, DispatcherConfig, ShutdownHandle};
pub use executor::{ExecutionError, Executor, ShellExecutor, SimulatedExecutor};
pub use intake::{Intake, Submission};
