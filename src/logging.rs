//! Process-wide `tracing` subscriber driven by [`LogConfig`].

use crate::{Error, Result, config::LogConfig, utils::try_create_dir};
use std::{fs::OpenOptions, sync::Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber at the configured level, writing to the configured file or stdout.
///
/// `RUST_LOG` directives, when set, refine the configured level. Returns `Ok(false)` when a global
/// subscriber was already installed, leaving it in place.
pub fn init(config: &LogConfig) -> Result<bool> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.loglevel.level_filter().into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match &config.log {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                try_create_dir(parent)?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::IOWriteFailure {
                    path: path.display().to_string(),
                    reason: e,
                })?;

            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None => builder.try_init().is_ok(),
    };

    if installed {
        info!("Logging initialised at [{}].", config.loglevel);
    }

    return Ok(installed);
}
