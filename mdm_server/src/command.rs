//! Operator shell commands.

use crate::channels::ChannelSelector;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start every device loop
    Start,
    /// Stop every device loop
    Stop,
    /// Reallocate every DM with this many channels
    SetChannelCount(usize),
    /// Report the channel count
    GetChannelCount,
    /// Zero one channel or all of them
    Reset(ChannelSelector),
    /// Print the command summary
    Help,
    /// Release the devices and exit
    Quit,
}

/// Malformed operator input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Blank line
    #[error("empty command")]
    Empty,

    /// First word is not a known command
    #[error("Unknown command: {0}")]
    Unknown(String),

    /// Command needs an argument
    #[error("{command} expects an integer argument")]
    MissingArgument {
        /// Command name
        command: &'static str,
    },

    /// Argument is not acceptable
    #[error("wrong command? {command} {value}")]
    InvalidArgument {
        /// Command name
        command: &'static str,
        /// Offending argument
        value: String,
    },
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(CommandError::Empty);
        };

        match name {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "get_nch" => Ok(Self::GetChannelCount),
            "help" => Ok(Self::Help),
            "quit" => Ok(Self::Quit),
            "set_nch" => {
                let value = argument("set_nch", words.next())?;
                match value.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Self::SetChannelCount(n)),
                    _ => Err(CommandError::InvalidArgument {
                        command: "set_nch",
                        value: value.to_string(),
                    }),
                }
            }
            "reset" => {
                let value = argument("reset", words.next())?;
                match value.parse::<i64>() {
                    Ok(-1) => Ok(Self::Reset(ChannelSelector::All)),
                    Ok(k) if k >= 0 => Ok(Self::Reset(ChannelSelector::Channel(k as usize))),
                    _ => Err(CommandError::InvalidArgument {
                        command: "reset",
                        value: value.to_string(),
                    }),
                }
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn argument<'a>(command: &'static str, word: Option<&'a str>) -> Result<&'a str, CommandError> {
    word.ok_or(CommandError::MissingArgument { command })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::SetChannelCount(n) => write!(f, "set_nch {n}"),
            Self::GetChannelCount => write!(f, "get_nch"),
            Self::Reset(ChannelSelector::All) => write!(f, "reset -1"),
            Self::Reset(ChannelSelector::Channel(k)) => write!(f, "reset {k}"),
            Self::Help => write!(f, "help"),
            Self::Quit => write!(f, "quit"),
        }
    }
}

const HELP_ROWS: [(&str, &str, &str); 7] = [
    ("help", "", "prints this help message"),
    ("quit", "", "stops the DM!"),
    ("set_nch", "integer", "sets the number of channels to val"),
    ("start", "", "starts the DM (set_nch first!)"),
    ("stop", "", "stops the DM control loop"),
    ("get_nch", "", "returns the current number of channels"),
    ("reset", "integer", "reset channel #k (-1 for all channels)"),
];

/// Command summary printed by `help`.
pub fn help_text() -> String {
    let mut text = String::from("DM control shell help menu\n\n");
    text.push_str(&format!("{:<10} {:<10} {}\n", "command", "argument", "description"));
    for (command, argument, description) in HELP_ROWS {
        text.push_str(&format!("{command:<10} {argument:<10} {description}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(Command::parse("start").unwrap(), Command::Start);
        assert_eq!(Command::parse("  stop  ").unwrap(), Command::Stop);
        assert_eq!(Command::parse("set_nch 6").unwrap(), Command::SetChannelCount(6));
        assert_eq!(Command::parse("get_nch").unwrap(), Command::GetChannelCount);
        assert_eq!(
            Command::parse("reset -1").unwrap(),
            Command::Reset(ChannelSelector::All)
        );
        assert_eq!(
            Command::parse("reset 2").unwrap(),
            Command::Reset(ChannelSelector::Channel(2))
        );
        assert_eq!(Command::parse("help").unwrap(), Command::Help);
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(Command::parse("   "), Err(CommandError::Empty));
        assert!(matches!(Command::parse("launch"), Err(CommandError::Unknown(_))));
        assert!(matches!(
            Command::parse("set_nch"),
            Err(CommandError::MissingArgument { command: "set_nch" })
        ));
        assert!(matches!(
            Command::parse("set_nch 0"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("set_nch four"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("reset -2"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(Command::parse("starting").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for command in [
            Command::SetChannelCount(3),
            Command::Reset(ChannelSelector::All),
            Command::Reset(ChannelSelector::Channel(0)),
        ] {
            assert_eq!(Command::parse(&command.to_string()).unwrap(), command);
        }
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for name in ["help", "quit", "set_nch", "start", "stop", "get_nch", "reset"] {
            assert!(help.contains(name), "missing {name}");
        }
    }
}
