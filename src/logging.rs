use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::core::config::settings::LoggingConfig;
use crate::core::config::AppPaths;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Resolved log directory: the configured one (relative paths sit under the
/// user data dir) or the default `logs` dir.
pub fn log_dir(config: &LoggingConfig, paths: &AppPaths) -> PathBuf {
    match &config.log_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => paths.user_data_dir.join(dir),
        None => paths.log_dir.clone(),
    }
}

pub fn init(config: &LoggingConfig, paths: &AppPaths) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = if config.file {
        let dir = log_dir(config, paths);
        let _ = std::fs::create_dir_all(&dir);
        let file_appender = tracing_appender::rolling::daily(&dir, "pipeline.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed(),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_log_dir_sits_under_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_dirs(tmp.path().to_path_buf(), tmp.path().join("data"));

        let mut config = LoggingConfig::default();
        assert_eq!(log_dir(&config, &paths), paths.log_dir);

        config.log_dir = Some(PathBuf::from("custom"));
        assert_eq!(log_dir(&config, &paths), tmp.path().join("data").join("custom"));

        config.log_dir = Some(tmp.path().join("abs"));
        assert_eq!(log_dir(&config, &paths), tmp.path().join("abs"));
    }
}
