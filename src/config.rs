use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use confique::Config as _;
use serde::Deserialize;

use crate::prelude::*;


/// The locations where farmstand will look for a configuration file. The
/// first existing file in this list is used.
const DEFAULT_PATHS: &[&str] = &[
    // For better DX, we include this special path here, but just in debug mode.
    #[cfg(debug_assertions)]
    "util/dev-config/config.toml",

    "config.toml",
    "/etc/farmstand/config.toml",
];

const CONFIG_PATH_ENV: &str = "FARMSTAND_CONFIG_PATH";

/// Configuration for farmstand.
///
/// All relative paths are relative to the location of this configuration file.
/// Duration values are specified as string with a unit, e.g. "27s". Valid
/// units: 'ms', 's', 'min', 'h' and 'd'.
///
/// Most values can also be set via environment variables, which take
/// precedence over values in this file. The variable names are noted next to
/// the respective options.
#[derive(Debug, confique::Config)]
pub(crate) struct Config {
    #[config(nested)]
    pub(crate) db: crate::db::DbConfig,

    #[config(nested)]
    pub(crate) http: crate::http::HttpConfig,

    #[config(nested)]
    pub(crate) log: crate::logger::LogConfig,
}

impl Config {
    /// Loads the configuration. If `path` is given, that file has to exist.
    /// Otherwise `FARMSTAND_CONFIG_PATH` and a list of default locations are
    /// checked. If no file is found, the configuration is loaded from
    /// environment variables and defaults alone. Returns the loaded config and
    /// the path of the file that was used, if any.
    pub(crate) fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match path {
            Some(p) => Some(p.to_owned()),
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(p) => Some(PathBuf::from(p)),
                None => DEFAULT_PATHS.iter().map(PathBuf::from).find(|p| p.exists()),
            },
        };

        let config = match &path {
            Some(path) => Self::load_from(path)?,
            None => {
                let config = Config::builder()
                    .env()
                    .load()
                    .context("failed to load configuration from environment")?;
                config.validate()?;
                config
            }
        };

        Ok((config, path))
    }

    /// Loads the configuration from a specific TOML file, with environment
    /// variables overriding values from the file.
    pub(crate) fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("config file '{}' does not exist", path.display());
        }

        let mut config = Config::builder()
            .env()
            .file(path)
            .load()
            .context(format!("failed to read config file '{}'", path.display()))?;

        config.fix_paths(path)?;
        config.validate()?;

        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.db.validate()?;
        self.http.validate()?;
        Ok(())
    }

    /// Goes through all paths in the configuration and changes relative paths
    /// to be absolute based on the path of the configuration file itself.
    fn fix_paths(&mut self, config_path: &Path) -> Result<()> {
        fn fix_path(base_path: &Path, path: &mut PathBuf) {
            if path.is_relative() {
                *path = base_path.join(&path);
            }
        }

        let absolute_config_path = config_path.canonicalize()
            .context("failed to canonicalize config path")?;
        let base = absolute_config_path.parent()
            .ok_or_else(|| anyhow!("config file path has no parent"))?;

        if let Some(p) = &mut self.log.file {
            fix_path(base, p);
        }
        if let Some(p) = &mut self.db.server_cert {
            fix_path(base, p);
        }

        Ok(())
    }
}

/// Writes the generated TOML config template file to the given destination or
/// stdout.
pub(crate) fn write_template(path: Option<&PathBuf>) -> Result<()> {
    use confique::toml::FormatOptions;

    info!(
        "Writing configuration template to '{}'",
        path.map(|p| p.display().to_string()).unwrap_or("<stdout>".into()),
    );

    let mut options = FormatOptions::default();
    options.general.nested_field_gap = 2;
    let template = confique::toml::template::<Config>(options);
    match path {
        Some(path) => fs::write(path, template)?,
        None => io::stdout().write_all(template.as_bytes())?,
    }

    Ok(())
}

/// Our custom format for durations. We allow a couple useful units and required
/// a unit to increase readability of config files.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(D::Error::custom)
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Allow unit-less zeroes
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let start_unit = s.find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "no time unit for duration".to_owned())?;
    let (num, unit) = s.split_at(start_unit);
    let num: u32 = num.parse()
        .map_err(|e| format!("invalid integer for duration: {}", e))?;
    let num: u64 = num.into();

    match unit {
        "ms" => Ok(Duration::from_millis(num)),
        "s" => Ok(Duration::from_secs(num)),
        "min" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 60 * 60)),
        "d" => Ok(Duration::from_secs(num * 60 * 60 * 24)),
        _ => Err("invalid unit of time for duration".into()),
    }
}
