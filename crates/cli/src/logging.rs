//! Tracing setup for the command-line tool.
//!
//! Console output goes through the default fmt layer. When a log folder is
//! configured, the same events are appended to `acacore.log` in the archival
//! log format `YYYY-MM-DD HH:MM:SS LEVEL: message`.

use std::fmt;
use std::fs::{create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "acacore.log";
const DEFAULT_FILTER: &str = "acacore=info";

/// Event format of the log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivalFormat;

impl<S, N> FormatEvent<S, N> for ArchivalFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let time = Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(writer, "{time} {}: ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber. Returns the path of the log file, if any.
///
/// The filter comes from `RUST_LOG`, defaulting to `acacore=info`.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let (file_layer, log_file_path) = match log_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let path = dir.join(LOG_FILE_NAME);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = tracing_subscriber::fmt::layer()
                .event_format(ArchivalFormat)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(log_file_path)
}
