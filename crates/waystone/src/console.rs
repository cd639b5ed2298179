//! Stdin command console.
//!
//! Each line either drives the simulated world (players joining, leaving,
//! moving, dying) or runs a chat command, as a named player or as the
//! console itself.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use waystone_events::{
    Caller, CommandResult, EntityPos, EventError, LocalServer, PlayerId, ServerError,
};

pub const HELP: &str = "\
join <name>                     connect a player
leave <name>                    disconnect a player
die <name>                      kill a player
move <name> <x> <y> <z> [yaw]   move a player
<name> /<command> [args]        run a command as a player
/<command> [args]               run a command as the console
help                            show this text
quit                            save and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Join(String),
    Leave(String),
    Die(String),
    Move { name: String, position: EntityPos },
    AsPlayer { name: String, line: String },
    AsConsole(String),
    Help,
    Quit,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a number: {0}")]
    BadNumber(String),

    #[error("No online player named {0}")]
    UnknownPlayer(String),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Event(#[from] EventError),
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, ConsoleError> {
    word.parse()
        .map_err(|_| ConsoleError::BadNumber(word.to_string()))
}

/// Parses one input line; blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.starts_with('/') {
        return Ok(Some(ConsoleCommand::AsConsole(line.to_string())));
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["quit"] | ["exit"] => ConsoleCommand::Quit,
        ["help"] => ConsoleCommand::Help,
        ["join", name] => ConsoleCommand::Join(name.to_string()),
        ["join", ..] => return Err(ConsoleError::Usage("join <name>")),
        ["leave", name] => ConsoleCommand::Leave(name.to_string()),
        ["leave", ..] => return Err(ConsoleError::Usage("leave <name>")),
        ["die", name] => ConsoleCommand::Die(name.to_string()),
        ["die", ..] => return Err(ConsoleError::Usage("die <name>")),
        ["move", name, x, y, z, rest @ ..] if rest.len() <= 1 => {
            let yaw = match rest.first() {
                Some(yaw) => number(yaw)?,
                None => 0.0,
            };
            ConsoleCommand::Move {
                name: name.to_string(),
                position: EntityPos::new(number(x)?, number(y)?, number(z)?, yaw),
            }
        }
        ["move", ..] => return Err(ConsoleError::Usage("move <name> <x> <y> <z> [yaw]")),
        [name, first, ..] if first.starts_with('/') => {
            let line = line[name.len()..].trim_start().to_string();
            ConsoleCommand::AsPlayer {
                name: name.to_string(),
                line,
            }
        }
        _ => return Err(ConsoleError::Usage("type `help` for the list of commands")),
    };

    Ok(Some(command))
}

pub struct Console {
    server: Arc<LocalServer>,
    operators: HashSet<String>,
}

impl Console {
    pub fn new(server: Arc<LocalServer>, operators: impl IntoIterator<Item = String>) -> Self {
        Self {
            server,
            operators: operators.into_iter().collect(),
        }
    }

    fn online(&self, name: &str) -> Result<PlayerId, ConsoleError> {
        self.server
            .find_player(name)
            .ok_or_else(|| ConsoleError::UnknownPlayer(name.to_string()))
    }

    /// Runs `command` and returns the lines to show.
    pub async fn execute(&self, command: ConsoleCommand) -> Result<Vec<String>, ConsoleError> {
        debug!("Console: {:?}", command);
        match command {
            ConsoleCommand::Join(name) => {
                let player_id = self
                    .server
                    .known_player(&name)
                    .unwrap_or_else(|| PlayerId::new(format!("local-{}", name)));
                if self.operators.contains(&name) {
                    self.server.grant_operator(&player_id);
                }
                self.server
                    .connect_player(&player_id, &name, EntityPos::default())
                    .await?;
                Ok(vec![format!("{} joined", name)])
            }
            ConsoleCommand::Leave(name) => {
                let player_id = self.online(&name)?;
                self.server.disconnect_player(&player_id).await?;
                Ok(vec![format!("{} left", name)])
            }
            ConsoleCommand::Die(name) => {
                let player_id = self.online(&name)?;
                self.server.kill_player(&player_id, None).await?;
                Ok(self.drain(&name, &player_id, None))
            }
            ConsoleCommand::Move { name, position } => {
                let player_id = self.online(&name)?;
                self.server.move_player(&player_id, position)?;
                Ok(Vec::new())
            }
            ConsoleCommand::AsPlayer { name, line } => {
                let player_id = self.online(&name)?;
                let result = self
                    .server
                    .run_command(Caller::Player(player_id.clone()), &line);
                Ok(self.drain(&name, &player_id, Some(result)))
            }
            ConsoleCommand::AsConsole(line) => {
                let result = self.server.run_command(Caller::Console, &line);
                Ok(render_result(&result).into_iter().collect())
            }
            ConsoleCommand::Help => Ok(HELP.lines().map(str::to_string).collect()),
            ConsoleCommand::Quit => Ok(Vec::new()),
        }
    }

    /// Chat the player received, then the command result.
    fn drain(&self, name: &str, player_id: &PlayerId, result: Option<CommandResult>) -> Vec<String> {
        let mut lines: Vec<String> = self
            .server
            .take_messages(player_id)
            .into_iter()
            .map(|message| format!("[{}] {}", name, message))
            .collect();
        if let Some(line) = result.as_ref().and_then(render_result) {
            lines.push(format!("[{}] {}", name, line));
        }
        lines
    }
}

fn render_result(result: &CommandResult) -> Option<String> {
    match result {
        CommandResult::Success(Some(message)) => Some(message.clone()),
        CommandResult::Success(None) => None,
        CommandResult::Error(message) => Some(format!("Error: {}", message)),
    }
}
