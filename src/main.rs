use lastfm_scrobbler::config::PluginConfiguration;
use lastfm_scrobbler::data::HostEvent;
use lastfm_scrobbler::host::EventBus;
use lastfm_scrobbler::logging;
use lastfm_scrobbler::plugins::PluginRegistry;
use log::{debug, error, info, warn};
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return;
    }

    let config_file_path = find_config_file_in_args(&args);
    let log_config_path = find_log_config_in_args(&args);

    if let Err(e) = logging::initialize_logging_with_args(&args, log_config_path.as_deref()) {
        eprintln!("Error: Failed to initialize logging configuration: {}", e);
        std::process::exit(1);
    }

    info!("Last.fm scrobbler host starting");

    let config_path = config_file_path.unwrap_or_else(|| {
        info!("No configuration file specified, using default: lastfm_scrobbler.json");
        PathBuf::from("lastfm_scrobbler.json")
    });

    let config = match PluginConfiguration::from_file(&config_path) {
        Ok(config) => {
            info!("Loaded configuration from {}", config_path.display());
            config
        }
        Err(e) => {
            error!("Failed to load configuration from {}: {}", config_path.display(), e);
            eprintln!("Error: Failed to load configuration from {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("lastfm-dispatch")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            eprintln!("Error: Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let event_bus = EventBus::new();
    let registry = PluginRegistry::new(event_bus.clone(), runtime.handle().clone());

    if let Err(e) = registry.start_from_config(config) {
        error!("Failed to start the scrobbler plugin: {}", e);
        eprintln!("Error: Failed to start the scrobbler plugin: {}", e);
        std::process::exit(1);
    }

    info!("Reading host events from stdin, one JSON object per line");
    let published = publish_events(io::stdin().lock(), &event_bus);
    info!("End of input after {} events, shutting down", published);

    // Events published before EOF were accepted and are sent before the gate closes
    registry.shutdown_with_drain();
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("Exiting");
}

/// Publish every event read from `input` and return how many were published.
/// Blank lines and lines starting with '#' are skipped.
fn publish_events<R: BufRead>(input: R, event_bus: &EventBus) -> usize {
    let mut published = 0;

    for (index, line) in input.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<HostEvent>(trimmed) {
            Ok(event) => {
                debug!("Publishing {} for {}", event.name(), event.item().label());
                event_bus.publish(event);
                published += 1;
            }
            Err(e) => warn!("Ignoring malformed event on line {}: {}", index + 1, e),
        }
    }

    published
}

/// Find config file path from command line arguments (-c option)
fn find_config_file_in_args(args: &[String]) -> Option<PathBuf> {
    let mut i = 1;
    while i < args.len() {
        if args[i] == "-c" && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        i += 1;
    }
    None
}

/// Find logging config file path from command line arguments (--log-config option)
fn find_log_config_in_args(args: &[String]) -> Option<PathBuf> {
    let mut i = 1;
    while i < args.len() {
        if (args[i] == "--log-config" || args[i] == "--logging-config") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        i += 1;
    }

    let default_paths = ["/etc/lastfm_scrobbler/logging.json", "logging.json"];
    default_paths
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn print_help() {
    println!("Last.fm scrobbler host");
    println!("======================");
    println!();
    println!("Reads host events as JSON lines from stdin and forwards them to Last.fm.");
    println!();
    println!("USAGE:");
    println!("    lastfm_scrobbler [OPTIONS] < events.jsonl");
    println!();
    println!("OPTIONS:");
    println!("    -c <FILE>                   Specify configuration file path");
    println!("                                (default: lastfm_scrobbler.json)");
    println!();
    println!("    --log-config <FILE>         Specify logging configuration file");
    println!("                                Defaults searched in order:");
    println!("                                - /etc/lastfm_scrobbler/logging.json");
    println!("                                - logging.json");
    println!();
    println!("    -d, --debug                 Enable debug logging");
    println!();
    println!("    -h, --help                  Show this help message");
    println!();
    println!("EVENTS:");
    println!(r#"    {{"type":"playback_start","item":{{"id":"1","kind":"audio","name":"Teardrop","artists":["Massive Attack"]}},"users":["u1"]}}"#);
    println!(r#"    {{"type":"playback_stopped","item":{{...}},"users":["u1"],"played_to_completion":true}}"#);
    println!(r#"    {{"type":"user_data_saved","item":{{...}},"user_id":"u1","reason":"update_user_rating","user_data":{{"is_favorite":true}}}}"#);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastfm_scrobbler::host::EventSubscription;

    #[test]
    fn test_publish_events_skips_comments_and_garbage() {
        let bus = EventBus::new();
        let (_, receiver) = bus.subscribe(vec![EventSubscription::All]);

        let input = r#"
# a comment
{"type":"playback_start","item":{"id":"1","kind":"audio","name":"Song","artists":["A"]},"users":["u1"]}
not json
{"type":"user_data_saved","item":{"id":"1"},"user_id":"u1","reason":"update_user_rating"}
"#;

        assert_eq!(publish_events(input.as_bytes(), &bus), 2);
        assert!(matches!(receiver.try_recv(), Ok(HostEvent::PlaybackStart(_))));
        assert!(matches!(receiver.try_recv(), Ok(HostEvent::UserDataSaved(_))));
    }

    #[test]
    fn test_config_path_from_args() {
        let args: Vec<String> = ["prog", "-d", "-c", "/tmp/x.json"].iter().map(|s| s.to_string()).collect();
        assert_eq!(find_config_file_in_args(&args), Some(PathBuf::from("/tmp/x.json")));
        assert_eq!(find_config_file_in_args(&args[..2]), None);
    }
}
