//! Core data models for the Pokedex CLI
//!
//! This module contains the PokeAPI response types used by the command layer
//! for location areas, their encounters, and individual Pokemon.

pub mod pokeapi;

pub use pokeapi::{ApiError, PokeApiClient, DEFAULT_BASE_URL};

use serde::Deserialize;

/// A name/URL pair as returned by PokeAPI list and reference fields
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedResource {
    /// Resource name, e.g. "canalave-city-area"
    pub name: String,
    /// Absolute URL of the full resource
    pub url: String,
}

/// One page of the location-area listing
#[derive(Debug, Clone, Deserialize)]
pub struct LocationAreaPage {
    /// Total number of location areas
    pub count: u32,
    /// URL of the next page, absent on the last page
    pub next: Option<String>,
    /// URL of the previous page, absent on the first page
    pub previous: Option<String>,
    /// Location areas on this page
    pub results: Vec<NamedResource>,
}

/// A single location area and the Pokemon that can be encountered there
#[derive(Debug, Clone, Deserialize)]
pub struct LocationAreaDetail {
    pub name: String,
    #[serde(default)]
    pub pokemon_encounters: Vec<PokemonEncounter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonEncounter {
    pub pokemon: NamedResource,
}

/// A Pokemon as returned by the `/pokemon/{name}` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Pokemon {
    pub name: String,
    /// Experience gained for defeating it; also drives catch difficulty.
    /// PokeAPI reports `null` for some forms, which is treated as 0.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub base_experience: u32,
    /// Height in decimetres
    pub height: u32,
    /// Weight in hectograms
    pub weight: u32,
    #[serde(default)]
    pub stats: Vec<PokemonStat>,
    #[serde(default)]
    pub types: Vec<PokemonType>,
    #[serde(default)]
    pub abilities: Vec<PokemonAbility>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonStat {
    pub base_stat: u32,
    pub stat: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonType {
    pub slot: u32,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokemonAbility {
    pub slot: u32,
    #[serde(default)]
    pub is_hidden: bool,
    pub ability: NamedResource,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}
