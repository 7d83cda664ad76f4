/// Platform-specific functionality: drive-letter queries, elevation checks,
/// autostart registration and OS process execution.
///
/// The Windows API is only linked on Windows; other hosts get inert fallbacks
/// so the engine and its tests build everywhere.

pub mod autostart;
pub mod drives;
pub mod permissions;
pub mod process;

pub use drives::{DriveQuery, SystemDrives};
pub use permissions::is_elevated;
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
