use clap::Parser;
use log::{error, info};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use lastfm_scrobbler::config::PluginConfiguration;
use lastfm_scrobbler::data::{ScrobbleUser, UserId};
use lastfm_scrobbler::helpers::lastfm::LastfmApiClient;
use lastfm_scrobbler::logging;

/// Link a host user to a Last.fm account and print the configuration entry
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Host configuration file holding the Last.fm API key and secret
    #[clap(short, long, default_value = "lastfm_scrobbler.json")]
    config: PathBuf,

    /// Host user id to link
    #[clap(short = 'u', long)]
    host_user: String,

    /// Create the entry with scrobbling disabled (loves are still synced)
    #[clap(long)]
    no_scrobble: bool,

    /// Enable debug logging for troubleshooting
    #[clap(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let log_args = if cli.debug { vec!["--debug".to_string()] } else { Vec::new() };
    if let Err(e) = logging::initialize_logging_with_args(&log_args, None) {
        eprintln!("Error: Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("Linking failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = PluginConfiguration::from_file(&cli.config)?;
    let client = LastfmApiClient::from_config(&config)?;

    let token = client.get_auth_token()?;
    info!("Received authentication token");

    println!("Open this URL in a browser and allow access:");
    println!();
    println!("    {}", client.auth_url(&token));
    println!();
    print!("Press Enter once access has been granted...");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let (session_key, username) = client.get_session(&token)?;
    info!("Linked host user {} to Last.fm user {}", cli.host_user, username);

    let mut user = ScrobbleUser::new(&username, &session_key, UserId::new(cli.host_user.as_str()));
    user.scrobble_enabled = !cli.no_scrobble;

    println!();
    println!("Add this entry to the \"users\" list of the lastfm_scrobbler configuration:");
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}
