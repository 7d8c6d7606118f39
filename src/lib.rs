//! Pokedex CLI Library
//!
//! This module exposes the cache, API client, command layer and REPL for use by the
//! binary and in integration tests.

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod logging;
pub mod repl;
