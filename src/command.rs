//! Line commands accepted by the `hapticd` binary on stdin.
//!
//! ```text
//! health <current_hp> <max_hp> [dead]
//! hurt <damage> <max_hp>
//! death <respawn_ticks>
//! respawn <current_hp> <max_hp>
//! potion
//! debuff <duration_ticks>
//! vibrate <priority> <duration_ms> <strength> [front] [clear]
//! status | reload | reset | halt | quit
//! ```

use std::str::FromStr;

use crate::vibration::{Priority, UnknownPriority};

#[derive(Debug, Clone, PartialEq)]
pub enum GameCommand {
    Health { current_hp: u32, max_hp: u32, dead: bool },
    Hurt { damage: u32, max_hp: u32 },
    Death { respawn_ticks: u32 },
    Respawn { current_hp: u32, max_hp: u32 },
    Potion,
    Debuff { duration_ticks: u32 },
    Vibrate {
        priority: Priority,
        duration_ms: u64,
        strength: f32,
        insert_at_front: bool,
        clear_others: bool,
    },
    Status,
    /// Re-read the config file
    Reload,
    Reset,
    Halt,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Invalid value for <{argument}>: {value}")]
    InvalidValue {
        argument: &'static str,
        value: String,
    },

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error(transparent)]
    Priority(#[from] UnknownPriority),
}

struct Args<'a> {
    command: &'static str,
    rest: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn required<T: FromStr>(&mut self, argument: &'static str) -> Result<T, CommandError> {
        let raw = self.rest.next().ok_or(CommandError::MissingArgument {
            command: self.command,
            argument,
        })?;
        raw.parse().map_err(|_| CommandError::InvalidValue {
            argument,
            value: raw.to_string(),
        })
    }

    /// Consumes the remaining words as flags, all of which must be in `allowed`.
    fn flags(&mut self, allowed: &[&str]) -> Result<Vec<&'a str>, CommandError> {
        self.rest
            .by_ref()
            .map(|flag| {
                if allowed.contains(&flag) {
                    Ok(flag)
                } else {
                    Err(CommandError::UnexpectedArgument(flag.to_string()))
                }
            })
            .collect()
    }

    fn finish(&mut self) -> Result<(), CommandError> {
        self.flags(&[]).map(|_| ())
    }
}

impl FromStr for GameCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?.to_ascii_lowercase();

        let command = match name.as_str() {
            "health" => "health",
            "hurt" => "hurt",
            "death" => "death",
            "respawn" => "respawn",
            "potion" => "potion",
            "debuff" => "debuff",
            "vibrate" => "vibrate",
            "status" => "status",
            "reload" => "reload",
            "reset" => "reset",
            "halt" => "halt",
            "quit" | "exit" => "quit",
            _ => return Err(CommandError::UnknownCommand(name.to_string())),
        };
        let mut args = Args {
            command,
            rest: words,
        };

        let parsed = match command {
            "health" => {
                let current_hp = args.required("current_hp")?;
                let max_hp = args.required("max_hp")?;
                let dead = !args.flags(&["dead"])?.is_empty();
                return Ok(GameCommand::Health {
                    current_hp,
                    max_hp,
                    dead,
                });
            }
            "hurt" => GameCommand::Hurt {
                damage: args.required("damage")?,
                max_hp: args.required("max_hp")?,
            },
            "death" => GameCommand::Death {
                respawn_ticks: args.required("respawn_ticks")?,
            },
            "respawn" => GameCommand::Respawn {
                current_hp: args.required("current_hp")?,
                max_hp: args.required("max_hp")?,
            },
            "potion" => GameCommand::Potion,
            "debuff" => GameCommand::Debuff {
                duration_ticks: args.required("duration_ticks")?,
            },
            "vibrate" => {
                let priority: Priority = match args.rest.next() {
                    Some(raw) => raw.parse()?,
                    None => {
                        return Err(CommandError::MissingArgument {
                            command,
                            argument: "priority",
                        })
                    }
                };
                let duration_ms = args.required("duration_ms")?;
                let strength = args.required("strength")?;
                let flags = args.flags(&["front", "clear"])?;
                return Ok(GameCommand::Vibrate {
                    priority,
                    duration_ms,
                    strength,
                    insert_at_front: flags.contains(&"front"),
                    clear_others: flags.contains(&"clear"),
                });
            }
            "status" => GameCommand::Status,
            "reload" => GameCommand::Reload,
            "reset" => GameCommand::Reset,
            "halt" => GameCommand::Halt,
            _ => GameCommand::Quit,
        };

        args.finish()?;
        Ok(parsed)
    }
}
