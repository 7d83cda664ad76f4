/// Data model: server profiles and application settings.
///
/// Both types serialise with camelCase keys so the registry document stays
/// readable by the front end that owns it.
pub mod server;
pub mod settings;

pub use server::{ServerProfile, DEFAULT_DRIVE_LETTER, DEFAULT_PORT, DEFAULT_REMOTE_PATH};
pub use settings::Settings;
