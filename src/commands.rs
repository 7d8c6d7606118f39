//! Command table and per-session state for the Pokedex REPL
//!
//! A [`Session`] owns the location-area page cursor, the caught collection and the
//! API client. Commands write their output to any `io::Write` so the REPL can target
//! stdout while tests capture into a buffer.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::data::{ApiError, LocationAreaPage, PokeApiClient, Pokemon};

/// Upper bound (exclusive) of the catch roll; a Pokemon escapes when its base
/// experience beats the roll
pub const CATCH_DIFFICULTY: u32 = 400;

/// Pause between throwing the ball and revealing the outcome
pub const DEFAULT_THROW_DELAY: Duration = Duration::from_millis(500);

/// Errors a command can report back to the REPL
#[derive(Debug, Error)]
pub enum CommandError {
    /// A required argument was not supplied
    #[error("{command} command requires a {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },

    /// `mapb` was used on the first page
    #[error("no previous locations")]
    NoPreviousPage,

    /// `inspect` was used on a Pokemon that is not in the collection
    #[error("you have not caught {0}")]
    NotCaught(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Whether the REPL should keep reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Every command the REPL understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    Map,
    MapBack,
    Explore,
    Catch,
    Inspect,
    Pokedex,
}

impl Command {
    /// All commands in the order `help` lists them
    pub const ALL: [Command; 8] = [
        Command::Help,
        Command::Exit,
        Command::Map,
        Command::MapBack,
        Command::Explore,
        Command::Catch,
        Command::Inspect,
        Command::Pokedex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Exit => "exit",
            Command::Map => "map",
            Command::MapBack => "mapb",
            Command::Explore => "explore",
            Command::Catch => "catch",
            Command::Inspect => "inspect",
            Command::Pokedex => "pokedex",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Help => "Prints the help message",
            Command::Exit => "Exits the Pokedex",
            Command::Map => "Shows the next 20 location areas",
            Command::MapBack => "Shows the previous 20 location areas",
            Command::Explore => "Lists the Pokemon found in a location area",
            Command::Catch => "Throws a Pokeball at a Pokemon",
            Command::Inspect => "Shows details of a caught Pokemon",
            Command::Pokedex => "Lists every Pokemon you have caught",
        }
    }

    /// Looks up a command by its (already lowercased) name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }
}

/// Source of catch rolls
pub trait CatchRoll: Send {
    /// Returns a value in `0..upper`
    fn roll(&mut self, upper: u32) -> u32;
}

/// Draws rolls from random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct EntropyRoll;

impl CatchRoll for EntropyRoll {
    fn roll(&mut self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        (Uuid::new_v4().as_u128() % u128::from(upper)) as u32
    }
}

/// A Pokemon in the collection together with when it was caught
#[derive(Debug, Clone)]
pub struct CaughtPokemon {
    pub pokemon: Pokemon,
    pub caught_at: DateTime<Local>,
}

/// State carried across commands for one REPL session
pub struct Session {
    client: PokeApiClient,
    next: Option<String>,
    previous: Option<String>,
    pokedex: BTreeMap<String, CaughtPokemon>,
    roller: Box<dyn CatchRoll>,
    throw_delay: Duration,
}

impl Session {
    pub fn new(client: PokeApiClient) -> Self {
        Self {
            client,
            next: None,
            previous: None,
            pokedex: BTreeMap::new(),
            roller: Box::new(EntropyRoll),
            throw_delay: DEFAULT_THROW_DELAY,
        }
    }

    /// Replaces the catch roller (used by tests to force an outcome)
    pub fn with_roller(mut self, roller: impl CatchRoll + 'static) -> Self {
        self.roller = Box::new(roller);
        self
    }

    pub fn with_throw_delay(mut self, throw_delay: Duration) -> Self {
        self.throw_delay = throw_delay;
        self
    }

    /// Caught Pokemon keyed by name
    pub fn pokedex(&self) -> &BTreeMap<String, CaughtPokemon> {
        &self.pokedex
    }

    /// Runs one command
    ///
    /// # Arguments
    /// * `command` - The command to run
    /// * `args` - Remaining tokens from the input line
    /// * `out` - Destination for user-facing output
    ///
    /// # Returns
    /// * `Ok(Flow::Exit)` for `exit`, `Ok(Flow::Continue)` otherwise
    /// * `Err(CommandError)` if the command could not complete
    pub async fn execute<W: Write>(
        &mut self,
        command: Command,
        args: &[String],
        out: &mut W,
    ) -> Result<Flow, CommandError> {
        debug!(command = command.name(), ?args, "executing command");
        match command {
            Command::Help => self.help(out)?,
            Command::Exit => return Ok(Flow::Exit),
            Command::Map => self.map(out).await?,
            Command::MapBack => self.map_back(out).await?,
            Command::Explore => {
                let area = required(args, command, "location name")?;
                self.explore(area, out).await?;
            }
            Command::Catch => {
                let name = required(args, command, "pokemon name")?;
                self.catch(name, out).await?;
            }
            Command::Inspect => {
                let name = required(args, command, "pokemon name")?;
                self.inspect(name, out)?;
            }
            Command::Pokedex => self.list_pokedex(out)?,
        }
        Ok(Flow::Continue)
    }

    fn help<W: Write>(&self, out: &mut W) -> Result<(), CommandError> {
        writeln!(out, "Welcome to the Pokedex!")?;
        writeln!(out, "Usage:")?;
        writeln!(out)?;
        for command in Command::ALL {
            writeln!(out, "{} - {}", command.name(), command.description())?;
        }
        writeln!(out)?;
        Ok(())
    }

    async fn map<W: Write>(&mut self, out: &mut W) -> Result<(), CommandError> {
        // After the last page `next` is empty, so this wraps to the first page
        let page = self.client.location_areas(self.next.as_deref()).await?;
        self.show_page(page, out)
    }

    async fn map_back<W: Write>(&mut self, out: &mut W) -> Result<(), CommandError> {
        let url = self.previous.clone().ok_or(CommandError::NoPreviousPage)?;
        let page = self.client.location_areas(Some(&url)).await?;
        self.show_page(page, out)
    }

    fn show_page<W: Write>(
        &mut self,
        page: LocationAreaPage,
        out: &mut W,
    ) -> Result<(), CommandError> {
        self.next = page.next;
        self.previous = page.previous;
        for area in page.results {
            writeln!(out, "{}", area.name)?;
        }
        Ok(())
    }

    async fn explore<W: Write>(&self, area: &str, out: &mut W) -> Result<(), CommandError> {
        let detail = self.client.location_area(area).await?;
        writeln!(out, "Exploring {}...", area)?;
        writeln!(out, "Found Pokemon:")?;
        for encounter in &detail.pokemon_encounters {
            writeln!(out, " - {}", encounter.pokemon.name)?;
        }
        Ok(())
    }

    async fn catch<W: Write>(&mut self, name: &str, out: &mut W) -> Result<(), CommandError> {
        let pokemon = self.client.pokemon(name).await?;
        writeln!(out, "Throwing a Pokeball at {}...", pokemon.name)?;
        out.flush()?;

        if !self.throw_delay.is_zero() {
            tokio::time::sleep(self.throw_delay).await;
        }

        let roll = self.roller.roll(CATCH_DIFFICULTY);
        debug!(
            pokemon = %pokemon.name,
            base_experience = pokemon.base_experience,
            roll,
            "catch roll"
        );
        if pokemon.base_experience > roll {
            writeln!(out, "{} got away!", pokemon.name)?;
            return Ok(());
        }

        writeln!(out, "{} was caught!", pokemon.name)?;
        writeln!(out, "You may now inspect it.")?;
        self.pokedex.insert(
            pokemon.name.clone(),
            CaughtPokemon {
                pokemon,
                caught_at: Local::now(),
            },
        );
        Ok(())
    }

    fn inspect<W: Write>(&self, name: &str, out: &mut W) -> Result<(), CommandError> {
        let caught = self
            .pokedex
            .get(name)
            .ok_or_else(|| CommandError::NotCaught(name.to_string()))?;
        let pokemon = &caught.pokemon;

        writeln!(out, "Name: {}", pokemon.name)?;
        writeln!(out, "Height: {}", pokemon.height)?;
        writeln!(out, "Weight: {}", pokemon.weight)?;
        writeln!(out, "Stats:")?;
        for stat in &pokemon.stats {
            writeln!(out, " -{}: {}", stat.stat.name, stat.base_stat)?;
        }
        writeln!(out, "Types:")?;
        for kind in &pokemon.types {
            writeln!(out, " - {}", kind.kind.name)?;
        }
        writeln!(out, "Abilities:")?;
        for ability in &pokemon.abilities {
            let hidden = if ability.is_hidden { " (hidden)" } else { "" };
            writeln!(
                out,
                " -slot-{}: {}{}",
                ability.slot, ability.ability.name, hidden
            )?;
        }
        writeln!(
            out,
            "Caught: {}",
            caught.caught_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        Ok(())
    }

    fn list_pokedex<W: Write>(&self, out: &mut W) -> Result<(), CommandError> {
        if self.pokedex.is_empty() {
            writeln!(
                out,
                "Your Pokedex is empty. Catch some Pokemon to get started!"
            )?;
            return Ok(());
        }

        writeln!(out, "Your Pokedex:")?;
        for name in self.pokedex.keys() {
            writeln!(out, " - {}", name)?;
        }
        Ok(())
    }
}

fn required<'a>(
    args: &'a [String],
    command: Command,
    what: &'static str,
) -> Result<&'a str, CommandError> {
    args.first()
        .map(String::as_str)
        .ok_or(CommandError::MissingArgument {
            command: command.name(),
            what,
        })
}
