mod settings;

pub use settings::{DefaultMode, SETTINGS_FILE_NAME, Settings, SettingsError};
