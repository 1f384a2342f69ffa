//! Logging Infrastructure
//!
//! Structured logging setup for development and production.
//! Features:
//! - Console output (pretty for development, JSON for production)
//! - Daily rotating application logs (deleted after 14 days)
//! - Permanent dead-letter log: every permanently rejected message (never deleted)

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Tracing target of permanently rejected messages
pub const DEAD_LETTER_TARGET: &str = "dead_letter";

/// Days an application log file is kept
const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Clean up old application log files (older than 14 days)
///
/// Dead-letter logs are never touched.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);

    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        // Rolling appender names files app.YYYY-MM-DD
        let Some(date_part) = name.strip_prefix("app.") else {
            continue;
        };
        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(())
}

fn console_layer(json_format: bool) -> BoxedLayer {
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    }
}

/// File layer receiving only events whose target matches (or not) `dead_letter`
fn file_layer(appender: RollingFileAppender, json_format: bool, dead_letter: bool) -> BoxedLayer {
    let filter = tracing_subscriber::filter::filter_fn(move |meta| {
        (meta.target() == DEAD_LETTER_TARGET) == dead_letter
    });
    let writer = std::sync::Mutex::new(appender);

    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

/// Daily rotating `app/` and `dead_letter/` file layers under `log_dir`
pub(crate) fn file_layers(log_dir: &Path, json_format: bool) -> anyhow::Result<Vec<BoxedLayer>> {
    let app_log_dir = log_dir.join("app");
    let dead_letter_dir = log_dir.join(DEAD_LETTER_TARGET);
    fs::create_dir_all(&app_log_dir)?;
    fs::create_dir_all(&dead_letter_dir)?;

    let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app");
    let dead_letter_log =
        RollingFileAppender::new(Rotation::DAILY, dead_letter_dir, DEAD_LETTER_TARGET);

    Ok(vec![
        file_layer(app_log, json_format, false),
        file_layer(dead_letter_log, json_format, true),
    ])
}

/// Initialize the logging system with daily rotating logs
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug", "warn"); `RUST_LOG` wins when set
/// * `json_format` - Whether to use JSON format (true for production)
/// * `log_dir` - Optional directory for file logging (e.g., Some("./logs"))
///
/// # Examples
/// ```no_run
/// // Development setup (console only)
/// orders_service::utils::logger::init_logger_with_file("debug", false, None)?;
///
/// // Production setup (console + files)
/// orders_service::utils::logger::init_logger_with_file("info", true, Some("./logs"))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(json_format)];

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        layers.extend(file_layers(log_dir, json_format)?);

        // Only spawn when a runtime exists (the binary always has one)
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(periodic_cleanup(log_dir.to_path_buf()));
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

/// Periodic cleanup task - runs every hour to clean old logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Dead-letter log helper - records a permanently rejected message
///
/// Written to the `dead_letter` target, which gets its own permanent log file.
///
/// # Examples
/// ```ignore
/// dead_letter_log!(delivery_tag, "payload is not valid JSON", body.len());
/// ```
#[macro_export]
macro_rules! dead_letter_log {
    ($delivery_tag:expr, $reason:expr, $payload_len:expr) => {
        tracing::error!(
            target: "dead_letter",
            delivery_tag = $delivery_tag,
            reason = %$reason,
            payload_len = $payload_len,
            timestamp = chrono::Local::now().to_rfc3339(),
            "DEAD_LETTER"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_expired_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("app");
        let dl_dir = dir.path().join(DEAD_LETTER_TARGET);
        fs::create_dir_all(&app_dir).unwrap();
        fs::create_dir_all(&dl_dir).unwrap();

        let today = chrono::Local::now().date_naive();
        let old = today - chrono::Duration::days(30);
        let old_app = app_dir.join(format!("app.{}", old.format("%Y-%m-%d")));
        let fresh_app = app_dir.join(format!("app.{}", today.format("%Y-%m-%d")));
        let old_dead_letter = dl_dir.join(format!("dead_letter.{}", old.format("%Y-%m-%d")));
        let unrelated = app_dir.join("notes.txt");
        for path in [&old_app, &fresh_app, &old_dead_letter, &unrelated] {
            fs::write(path, b"x").unwrap();
        }

        cleanup_old_logs(dir.path()).unwrap();

        assert!(!old_app.exists());
        assert!(fresh_app.exists());
        assert!(old_dead_letter.exists());
        assert!(unrelated.exists());
    }

    /// Concatenated contents of every file in `dir`
    fn read_logs(dir: &Path) -> String {
        let mut contents = String::new();
        for entry in fs::read_dir(dir).unwrap() {
            contents.push_str(&fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        contents
    }

    #[test]
    fn test_dead_letter_events_get_their_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let layers = file_layers(dir.path(), false).unwrap();
        let subscriber = tracing_subscriber::registry().with(layers);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(order_id = "ORD-1", "Order processed");
            crate::dead_letter_log!(7u64, "payload is not valid JSON", 8usize);
        });

        let app = read_logs(&dir.path().join("app"));
        let dead_letter = read_logs(&dir.path().join(DEAD_LETTER_TARGET));

        assert!(app.contains("Order processed"));
        assert!(!app.contains("DEAD_LETTER"));
        assert!(dead_letter.contains("DEAD_LETTER"));
        assert!(dead_letter.contains("payload is not valid JSON"));
        assert!(!dead_letter.contains("Order processed"));
    }

    #[test]
    fn test_cleanup_without_app_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cleanup_old_logs(dir.path()).is_ok());
    }
}
