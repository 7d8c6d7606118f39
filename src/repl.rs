//! Interactive read-eval-print loop
//!
//! Reads one line at a time, dispatches it through the command table and reports
//! failures without ending the session.

use std::io::{self, Write};

use crossterm::style::Stylize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::commands::{Command, Flow, Session};

const PROMPT: &str = "pokedex > ";

/// Splits an input line into lowercase whitespace-separated tokens
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}

/// The REPL driving a [`Session`]
pub struct Repl {
    session: Session,
    color: bool,
}

impl Repl {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            color: false,
        }
    }

    /// Enables ANSI styling of the prompt and error messages
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until `exit` or end of input
    ///
    /// Command errors are printed and the loop continues; only I/O failures on
    /// `reader` or `out` end it early.
    pub async fn run<R, W>(&mut self, reader: R, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = reader.lines();

        loop {
            self.prompt(out)?;

            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                break;
            };

            let tokens = tokenize(&line);
            let Some((name, args)) = tokens.split_first() else {
                continue;
            };

            let Some(command) = Command::from_name(name) else {
                writeln!(out, "Sorry, I couldn't understand that. Try again.")?;
                continue;
            };

            match self.session.execute(command, args, out).await {
                Ok(Flow::Exit) => break,
                Ok(Flow::Continue) => {}
                Err(err) => {
                    debug!(command = command.name(), error = %err, "command failed");
                    self.report(out, &err)?;
                }
            }
        }

        Ok(())
    }

    fn prompt<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.color {
            write!(out, "{}", PROMPT.cyan())?;
        } else {
            write!(out, "{}", PROMPT)?;
        }
        out.flush()
    }

    fn report<W: Write>(&self, out: &mut W, err: &dyn std::error::Error) -> io::Result<()> {
        let message = format!("Encountered an error: {}", err);
        if self.color {
            writeln!(out, "{}", message.red())
        } else {
            writeln!(out, "{}", message)
        }
    }
}
