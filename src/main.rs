//! Pokedex CLI - Explore PokeAPI from an interactive prompt
//!
//! Pages through location areas, explores them for Pokemon, and keeps a local
//! collection of caught Pokemon for the lifetime of the session.

use std::io;
use std::process;

use clap::Parser;
use crossterm::tty::IsTty;
use tokio::io::BufReader;
use tracing::info;

use pokedex::cache::ResponseCache;
use pokedex::cli::{resolve_config, Cli};
use pokedex::commands::Session;
use pokedex::data::PokeApiClient;
use pokedex::logging;
use pokedex::repl::Repl;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(2);
        }
    };

    logging::init(config.log_filter())?;
    info!(
        cache_interval_secs = config.cache_interval_secs,
        base_url = %config.base_url,
        "starting pokedex"
    );

    let cache = ResponseCache::new(config.cache_interval())?;
    let client = PokeApiClient::new(cache.clone(), config.base_url.as_str());
    let session = Session::new(client).with_throw_delay(config.throw_delay());

    let mut stdout = io::stdout();
    let mut repl = Repl::new(session).with_color(stdout.is_tty());
    repl.run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await?;

    cache.shutdown().await;
    Ok(())
}
