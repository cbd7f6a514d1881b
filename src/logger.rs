use std::{
    collections::HashMap,
    fmt::Write as _,
    fs::OpenOptions,
    path::PathBuf,
};
use nu_ansi_term::{Color, Style};
use serde::Deserialize;
use termcolor::ColorChoice;
use tracing::{field::{Field, Visit}, Level};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::{FilterFn, LevelFilter},
    fmt::FormatEvent,
    prelude::*,
};

use crate::prelude::*;


#[derive(Debug, confique::Config)]
pub(crate) struct LogConfig {
    /// Specifies what log messages to emit, based on the module path and log level.
    ///
    /// This is a map where the key specifies a module path prefix, and the
    /// value specifies a minimum log level. For each log message, the map
    /// entry with the longest prefix matching the log's module path is chosen.
    /// If no such entry exists, the log is not emitted. Otherwise, that
    /// entry's level is used to check whether the log message should be
    /// emitted.
    ///
    /// Example: only "info" and up from farmstand generally, but every SQL
    /// query (logged by `farmstand::db`) and "debug" from `tokio_postgres`:
    ///
    ///    [log]
    ///    filters.farmstand = "info"
    ///    filters."farmstand::db" = "trace"
    ///    filters.tokio_postgres = "debug"
    #[config(default = { "farmstand": "debug" })]
    pub(crate) filters: Filters,

    /// If this is set, log messages are also written to this file. The string
    /// `${cmd}` in this value is replaced by the subcommand name, e.g. `serve`.
    /// Example: "/var/log/farmstand-${cmd}.log".
    pub(crate) file: Option<PathBuf>,

    /// If this is set to `false`, log messages are not written to stdout.
    #[config(default = true)]
    pub(crate) stdout: bool,
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "HashMap<String, String>")]
pub(crate) struct Filters(HashMap<String, LevelFilter>);

impl TryFrom<HashMap<String, String>> for Filters {
    type Error = String;
    fn try_from(value: HashMap<String, String>) -> Result<Self, Self::Error> {
        value.into_iter()
            .map(|(target_prefix, level)| Ok((target_prefix, parse_level_filter(&level)?)))
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl Filters {
    /// Returns whether an event with `target` and `level` passes the filters.
    fn allows(&self, target: &str, level: &Level) -> bool {
        self.0.iter()
            .filter(|(target_prefix, _)| target.starts_with(target_prefix.as_str()))
            .max_by_key(|(target_prefix, _)| target_prefix.len())
            .map(|(_, level_filter)| level <= level_filter)
            .unwrap_or(false)
    }
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    match s {
        "off" => Ok(LevelFilter::OFF),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(format!("invalid log level '{other}'")),
    }
}

/// Installs our own logger globally. Must only be called once!
pub(crate) fn init(config: &LogConfig, color: ColorChoice, cmd: &str) -> Result<()> {
    let filter = {
        let filters = Filters(config.filters.0.clone());
        let max_level = filters.0.values().max().copied().unwrap_or(LevelFilter::OFF);
        FilterFn::new(move |metadata| filters.allows(metadata.target(), metadata.level()))
            .with_max_level_hint(max_level)
    };

    let stdout_output = config.stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(EventFormatter(color))
            .with_writer(std::io::stdout)
    });

    let file_output = config.file.as_ref()
        .map(|path| -> Result<std::fs::File> {
            use std::io::Write;

            let new_path = path.to_str()
                .ok_or_else(|| anyhow!("log file path is not valid UTF-8"))?
                .replace("${cmd}", cmd);

            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(new_path)
                .with_context(|| format!("failed to open/create log file '{}'", path.display()))?;

            // Add an empty line separator to see process restarts easier.
            file.write_all(b"\n").context("could not write to log file")?;

            Ok(file)
        })
        .transpose()?
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .event_format(EventFormatter(color))
                .with_writer(file)
                .with_ansi(color == ColorChoice::Always)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_output)
        .with(stdout_output)
        .try_init()
        .context("failed to install logger")?;

    Ok(())
}

type TracingWriter<'a> = tracing_subscriber::fmt::format::Writer<'a>;

/// Formats each event as a single line: time, level, target, message and
/// then all other fields as `key=value`.
#[derive(Clone, Copy)]
struct EventFormatter(ColorChoice);

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: TracingWriter<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let use_ansi = self.0 == ColorChoice::Always
            || (writer.has_ansi_escapes() && self.0 != ColorChoice::Never);

        // Events coming from the `log` crate (e.g. from `tokio_postgres`) carry
        // their real metadata in special fields.
        let normalized_metadata = event.normalized_metadata();
        let metadata = normalized_metadata.as_ref().unwrap_or(event.metadata());

        let dim_style = Style::new().dimmed();
        let (level_style, body_style) = match *metadata.level() {
            Level::ERROR => (Style::new().fg(Color::Red).bold(), Style::new().fg(Color::Red)),
            Level::WARN => (Style::new().fg(Color::Yellow).bold(), Style::new().fg(Color::Yellow)),
            Level::INFO => (Style::new().fg(Color::Green), Style::new()),
            Level::DEBUG => (Style::new().fg(Color::Blue), Style::new().dimmed()),
            Level::TRACE => (Style::new().fg(Color::Magenta), Style::new().fg(Color::DarkGray)),
        };

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S.%3f");
        with_style(&mut writer, use_ansi, dim_style, |w| write!(w, "{time} "))?;
        with_style(&mut writer, use_ansi, level_style, |w| write!(w, "{:5}", metadata.level()))?;
        with_style(&mut writer, use_ansi, dim_style, |w| write!(w, " {} >  ", metadata.target()))?;
        with_style(&mut writer, use_ansi, body_style, |w| {
            write!(w, "{}", fields.message)?;
            if !fields.rest.is_empty() {
                if !fields.message.is_empty() {
                    write!(w, " ~~")?;
                }
                write!(w, "{}", fields.rest)?;
            }
            Ok(())
        })?;

        writeln!(writer)
    }
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    rest: String,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let name = field.name();
        if name == "message" {
            let _ = write!(self.message, "{value:?}");
        } else if !name.starts_with("log.") {
            let _ = write!(self.rest, " {name}={value:?}");
        }
    }
}

fn with_style(
    out: &mut TracingWriter<'_>,
    use_ansi: bool,
    style: Style,
    f: impl FnOnce(&mut TracingWriter<'_>) -> std::fmt::Result,
) -> std::fmt::Result {
    if use_ansi {
        write!(out, "{}", style.prefix())?;
    }
    f(out)?;
    if use_ansi {
        write!(out, "{}", style.suffix())?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use tracing::Level;
    use super::Filters;

    fn filters(entries: &[(&str, &str)]) -> Filters {
        let map = entries.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Filters::try_from(map).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let f = filters(&[
            ("farmstand", "info"),
            ("farmstand::db", "trace"),
            ("farmstand::db::tx", "off"),
        ]);

        assert!(f.allows("farmstand::http", &Level::INFO));
        assert!(!f.allows("farmstand::http", &Level::DEBUG));
        assert!(f.allows("farmstand::db", &Level::TRACE));
        assert!(!f.allows("farmstand::db::tx", &Level::ERROR));
    }

    #[test]
    fn unknown_targets_are_dropped() {
        let f = filters(&[("farmstand", "trace")]);
        assert!(!f.allows("hyper::proto", &Level::ERROR));
    }

    #[test]
    fn invalid_level() {
        let map = HashMap::from([("farmstand".to_owned(), "loud".to_owned())]);
        assert!(Filters::try_from(map).is_err());
    }
}
