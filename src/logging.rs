use std::collections::HashMap;
use std::fs;
use std::path::Path;
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use env_logger::{Builder, Target, WriteStyle};
use std::io::Write;

/// Available logging subsystems
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LoggingSubsystem {
    /// Host harness and binaries
    #[serde(rename = "main")]
    Main,
    /// Host event bus
    #[serde(rename = "events")]
    Events,
    /// Event routing and dispatch decisions
    #[serde(rename = "router")]
    Router,
    /// Last.fm API client
    #[serde(rename = "lastfm")]
    Lastfm,
    /// HTTP transport
    #[serde(rename = "http")]
    Http,
    /// Configuration loading and parsing
    #[serde(rename = "config")]
    Config,
    /// Plugin lifecycle
    #[serde(rename = "plugins")]
    Plugins,
    /// Third-party dependencies
    #[serde(rename = "deps")]
    Dependencies,
}

impl LoggingSubsystem {
    /// Get the module prefix for this subsystem
    pub fn module_prefix(&self) -> &'static str {
        match self {
            LoggingSubsystem::Main => "lastfm_scrobbler",
            LoggingSubsystem::Events => "lastfm_scrobbler::host::eventbus",
            LoggingSubsystem::Router => "lastfm_scrobbler::plugins::scrobbler::router,lastfm_scrobbler::plugins::scrobbler::resolver",
            LoggingSubsystem::Lastfm => "lastfm_scrobbler::helpers::lastfm",
            LoggingSubsystem::Http => "lastfm_scrobbler::helpers::http_client,ureq",
            LoggingSubsystem::Config => "lastfm_scrobbler::config",
            LoggingSubsystem::Plugins => "lastfm_scrobbler::plugins",
            LoggingSubsystem::Dependencies => "tokio,rustls,serde",
        }
    }

    /// Get all available subsystems
    pub fn all() -> Vec<LoggingSubsystem> {
        vec![
            LoggingSubsystem::Main,
            LoggingSubsystem::Events,
            LoggingSubsystem::Router,
            LoggingSubsystem::Lastfm,
            LoggingSubsystem::Http,
            LoggingSubsystem::Config,
            LoggingSubsystem::Plugins,
            LoggingSubsystem::Dependencies,
        ]
    }

    fn parse(name: &str) -> Option<LoggingSubsystem> {
        match name.to_lowercase().as_str() {
            "main" => Some(LoggingSubsystem::Main),
            "events" => Some(LoggingSubsystem::Events),
            "router" => Some(LoggingSubsystem::Router),
            "lastfm" => Some(LoggingSubsystem::Lastfm),
            "http" => Some(LoggingSubsystem::Http),
            "config" => Some(LoggingSubsystem::Config),
            "plugins" => Some(LoggingSubsystem::Plugins),
            "deps" | "dependencies" => Some(LoggingSubsystem::Dependencies),
            _ => None,
        }
    }
}

/// Logging configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Target for log output (stdout, stderr)
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_timestamps")]
    pub timestamps: bool,

    #[serde(default = "default_colors")]
    pub colors: bool,

    /// Subsystem-specific log levels; unknown names are used as module paths
    #[serde(default, deserialize_with = "deserialize_subsystems")]
    pub subsystems: HashMap<String, String>,

    #[serde(default)]
    pub include_module_path: bool,

    #[serde(default)]
    pub include_line_numbers: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target() -> String {
    "stderr".to_string()
}

fn default_timestamps() -> bool {
    true
}

fn default_colors() -> bool {
    true
}

/// Custom deserializer for subsystems that filters out keys starting with underscore
fn deserialize_subsystems<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw_map = HashMap::<String, String>::deserialize(deserializer)?;
    let filtered_map = raw_map
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .collect();
    Ok(filtered_map)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            target: default_target(),
            timestamps: default_timestamps(),
            colors: default_colors(),
            subsystems: HashMap::new(),
            include_module_path: false,
            include_line_numbers: false,
        }
    }
}

impl LoggingConfig {
    /// Load logging configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read logging config file: {}", e))?;

        Self::from_json(&content)
    }

    /// Load logging configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json)
            .map_err(|e| format!("Failed to parse logging config JSON: {}", e))
    }

    /// Convert string log level to LevelFilter
    fn parse_log_level(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => {
                eprintln!("Warning: Unknown log level '{}', defaulting to 'info'", level);
                LevelFilter::Info
            }
        }
    }

    /// Module filters resolved from the subsystem table, shorter paths first
    fn module_filters(&self) -> Vec<(String, String)> {
        let mut all_filters = Vec::new();

        for (subsystem_name, level) in &self.subsystems {
            if let Some(subsystem) = LoggingSubsystem::parse(subsystem_name) {
                for prefix in subsystem.module_prefix().split(',') {
                    all_filters.push((prefix.trim().to_string(), level.clone()));
                }
            } else {
                all_filters.push((subsystem_name.clone(), level.clone()));
            }
        }

        let mut sorted_filters: Vec<_> = resolve_filter_conflicts(all_filters).into_iter().collect();
        // Sort by module path length so more specific paths are applied last
        sorted_filters.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        sorted_filters
    }

    /// Build the environment filter string for env_logger
    pub fn build_filter_string(&self) -> String {
        let mut filter_parts = vec![self.level.clone()];
        for (path, level) in self.module_filters() {
            filter_parts.push(format!("{}={}", path, level));
        }
        filter_parts.join(",")
    }

    /// Initialize the logger with this configuration
    pub fn initialize_logger(&self) -> Result<(), String> {
        let filter_string = self.build_filter_string();

        let mut builder = Builder::new();
        builder.filter(None, Self::parse_log_level(&self.level));
        for (path, level) in self.module_filters() {
            builder.filter(Some(path.as_str()), Self::parse_log_level(&level));
        }

        // RUST_LOG wins over the file configuration
        builder.parse_env("RUST_LOG");

        builder.write_style(if self.colors { WriteStyle::Auto } else { WriteStyle::Never });

        match self.target.to_lowercase().as_str() {
            "stdout" => {
                builder.target(Target::Stdout);
            }
            "stderr" => {
                builder.target(Target::Stderr);
            }
            _ => {
                return Err(format!("Unknown logging target: {}", self.target));
            }
        }

        let include_module_path = self.include_module_path;
        let include_line_numbers = self.include_line_numbers;
        let timestamps = self.timestamps;

        builder.format(move |buf, record| {
            let mut output = String::new();

            if timestamps {
                output.push_str(&format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
            }

            output.push_str(&format!("[{}] ", record.level()));

            if include_module_path {
                if let Some(module) = record.module_path() {
                    output.push_str(&format!("[{}] ", module));
                }
            }

            if include_line_numbers {
                if let (Some(file), Some(line)) = (record.file(), record.line()) {
                    output.push_str(&format!("[{}:{}] ", file, line));
                }
            }

            output.push_str(&format!("{}", record.args()));

            writeln!(buf, "{}", output)
        });

        builder.try_init()
            .map_err(|e| format!("Failed to initialize logger: {}", e))?;

        info!("Logging initialized with filter: {}", filter_string);
        Ok(())
    }
}

/// Resolve conflicts when the same module path has multiple log levels.
/// The most verbose level wins.
fn resolve_filter_conflicts(filters: Vec<(String, String)>) -> HashMap<String, String> {
    let mut path_levels: HashMap<String, Vec<String>> = HashMap::new();

    for (path, level) in filters {
        path_levels.entry(path).or_default().push(level);
    }

    let mut resolved = HashMap::new();
    for (path, levels) in path_levels {
        if levels.len() > 1 {
            let most_verbose = find_most_verbose_level(&levels);
            warn!("Conflicting log levels for module '{}': {:?}. Using most verbose: '{}'",
                  path, levels, most_verbose);
            resolved.insert(path, most_verbose);
        } else if let Some(level) = levels.into_iter().next() {
            resolved.insert(path, level);
        }
    }

    resolved
}

/// Find the most verbose log level from a list of levels
fn find_most_verbose_level(levels: &[String]) -> String {
    // Order from least to most verbose
    let verbosity_order = ["off", "error", "warn", "info", "debug", "trace"];

    let mut most_verbose_index = 0;
    let mut most_verbose_level = "off".to_string();

    for level in levels {
        let level_lower = level.to_lowercase();
        if let Some(index) = verbosity_order.iter().position(|&l| l == level_lower) {
            if index >= most_verbose_index {
                most_verbose_index = index;
                most_verbose_level = level_lower;
            }
        }
    }

    most_verbose_level
}

/// Initialize logging from command line arguments and optional config file
pub fn initialize_logging_with_args(args: &[String], config_file: Option<&Path>) -> Result<(), String> {
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");
    let verbose_mode = args.iter().any(|arg| arg == "--verbose" || arg == "-v");

    let mut config = match config_file {
        Some(config_path) if config_path.exists() => LoggingConfig::from_file(config_path)?,
        Some(config_path) => return Err(format!("Logging config file {:?} not found", config_path)),
        None => LoggingConfig::default(),
    };

    if debug_mode || verbose_mode {
        config.level = "debug".to_string();
    }

    config.initialize_logger()?;
    debug!("Log level set to {}", config.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_string() {
        let config = LoggingConfig::default();
        assert_eq!(config.build_filter_string(), "info");
    }

    #[test]
    fn test_subsystems_expand_to_module_prefixes() {
        let config = LoggingConfig::from_json(
            r#"{"level": "warn", "subsystems": {"lastfm": "debug", "_comment": "ignored"}}"#,
        )
        .unwrap();

        assert_eq!(config.subsystems.len(), 1);
        assert_eq!(
            config.build_filter_string(),
            "warn,lastfm_scrobbler::helpers::lastfm=debug"
        );
    }

    #[test]
    fn test_conflicting_levels_use_most_verbose() {
        let mut config = LoggingConfig::default();
        config.subsystems.insert("http".to_string(), "warn".to_string());
        config.subsystems.insert("ureq".to_string(), "trace".to_string());

        let filters = config.module_filters();
        assert!(filters.contains(&("ureq".to_string(), "trace".to_string())));
        assert!(filters.contains(&(
            "lastfm_scrobbler::helpers::http_client".to_string(),
            "warn".to_string()
        )));
    }

    #[test]
    fn test_find_most_verbose_level() {
        let levels = vec!["info".to_string(), "DEBUG".to_string(), "error".to_string()];
        assert_eq!(find_most_verbose_level(&levels), "debug");
        assert_eq!(find_most_verbose_level(&["bogus".to_string()]), "off");
    }

    #[test]
    fn test_every_subsystem_parses_back() {
        for subsystem in LoggingSubsystem::all() {
            let name = serde_json::to_value(&subsystem).unwrap();
            let parsed = LoggingSubsystem::parse(name.as_str().unwrap());
            assert_eq!(parsed, Some(subsystem));
        }
    }

    #[test]
    fn test_missing_logging_file_is_an_error() {
        let result = initialize_logging_with_args(&[], Some(Path::new("/nonexistent/logging.json")));
        assert!(result.is_err());
    }
}
