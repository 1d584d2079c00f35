use std::path::PathBuf;

use bevy::prelude::*;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TerrainError>;

/// Everything that can abort the demo. There is no recovery path: errors bubble up
/// to the startup system that hit them and are reported once by [`report_fatal_errors`].
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("failed to load heightmap image {path}: {source}")]
    Heightmap {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("tile cache I/O failed for {path}: {source}")]
    TileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tile cache entry {name} could not be encoded or decoded: {source}")]
    TileCodec {
        name: String,
        #[source]
        source: bincode::Error,
    },

    #[error("tile cache entry {name} is unusable: {reason}")]
    TileMismatch { name: String, reason: String },

    #[error("tile cache entry {0} does not exist")]
    TileMissing(String),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Raised by startup systems; the app reports it and shuts down.
#[derive(Event, Debug)]
pub struct FatalError(pub String);

impl From<TerrainError> for FatalError {
    fn from(err: TerrainError) -> Self {
        Self(err.to_string())
    }
}

/// Reports fatal errors and exits. The exit status stays zero like the rest of the
/// demo's shutdown paths.
pub fn report_fatal_errors(
    mut fatal_errors: EventReader<FatalError>,
    mut app_exit: EventWriter<AppExit>,
) {
    let mut failed = false;
    for FatalError(description) in fatal_errors.read() {
        error!("Fatal error: {}", description);
        eprintln!("An exception has occurred: {description}");
        failed = true;
    }

    if failed {
        app_exit.send(AppExit::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_error_sends_success_exit() {
        let mut app = App::new();
        app.add_event::<FatalError>()
            .add_event::<AppExit>()
            .add_systems(Update, report_fatal_errors);

        app.world_mut()
            .send_event(FatalError::from(TerrainError::TileMissing("a.dat".into())));
        app.update();

        let exits: Vec<AppExit> = app
            .world_mut()
            .resource_mut::<Events<AppExit>>()
            .drain()
            .collect();
        assert_eq!(exits, vec![AppExit::Success]);
    }

    #[test]
    fn no_errors_keeps_running() {
        let mut app = App::new();
        app.add_event::<FatalError>()
            .add_event::<AppExit>()
            .add_systems(Update, report_fatal_errors);

        app.update();

        assert!(app.world().resource::<Events<AppExit>>().is_empty());
    }
}
