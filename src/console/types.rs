use std::str::FromStr;

use crate::desk::alerts::AlertId;
use crate::desk::state::RgbColor;
use crate::error::ConsoleParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect,
    Disconnect,
    Desk(Option<bool>),
    Heater(Option<bool>),
    Rgb(RgbColor),
    Alert(String),
    Alerts,
    Clear(AlertId),
    ClearAll,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  connect              choose and connect to the desk device
  disconnect           close the connection
  desk [on|off]        switch the desk power (toggles without argument)
  heater [on|off]      switch the heater (toggles without argument)
  rgb R G B            set the mood light, 0-255 per channel
  alert MESSAGE        add a custom alert
  alerts               list alerts, newest first
  clear ID | clear all remove one or all alerts
  status               show connection, device state and latest reading
  quit";

fn parse_switch(argument: Option<&str>) -> Result<Option<bool>, ConsoleParseError> {
    match argument {
        None => Ok(None),
        Some("on") => Ok(Some(true)),
        Some("off") => Ok(Some(false)),
        Some(other) => Err(ConsoleParseError::InvalidArgument(other.to_string())),
    }
}

fn parse_channel(argument: Option<&str>) -> Result<i32, ConsoleParseError> {
    let argument = argument.ok_or(ConsoleParseError::MissingArgument("rgb R G B"))?;
    argument
        .parse()
        .map_err(|_| ConsoleParseError::InvalidArgument(argument.to_string()))
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let mut arguments = rest.split_whitespace();

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Err(ConsoleParseError::Empty),
            "connect" => ConsoleCommand::Connect,
            "disconnect" => ConsoleCommand::Disconnect,
            "desk" => ConsoleCommand::Desk(parse_switch(arguments.next())?),
            "heater" => ConsoleCommand::Heater(parse_switch(arguments.next())?),
            "rgb" => {
                let r = parse_channel(arguments.next())?;
                let g = parse_channel(arguments.next())?;
                let b = parse_channel(arguments.next())?;
                ConsoleCommand::Rgb(RgbColor { r, g, b })
            },
            "alert" => {
                if rest.is_empty() {
                    return Err(ConsoleParseError::MissingArgument("alert MESSAGE"));
                }
                return Ok(ConsoleCommand::Alert(rest.to_string()));
            },
            "alerts" => ConsoleCommand::Alerts,
            "clear" => match arguments.next() {
                None => return Err(ConsoleParseError::MissingArgument("clear ID | clear all")),
                Some("all") => ConsoleCommand::ClearAll,
                Some(id) => ConsoleCommand::Clear(AlertId(
                    id.parse().map_err(|_| ConsoleParseError::InvalidArgument(id.to_string()))?,
                )),
            },
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleParseError::UnknownCommand(other.to_string())),
        };

        match arguments.next() {
            Some(extra) => Err(ConsoleParseError::InvalidArgument(extra.to_string())),
            None => Ok(command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<ConsoleCommand, ConsoleParseError> {
        line.parse()
    }

    #[test]
    fn switches() {
        assert_eq!(parse("desk"), Ok(ConsoleCommand::Desk(None)));
        assert_eq!(parse("  DESK on "), Ok(ConsoleCommand::Desk(Some(true))));
        assert_eq!(parse("heater off"), Ok(ConsoleCommand::Heater(Some(false))));
        assert_eq!(parse("heater maybe"), Err(ConsoleParseError::InvalidArgument("maybe".to_string())));
    }

    #[test]
    fn rgb_keeps_out_of_range_values() {
        assert_eq!(parse("rgb 300 -5 10"), Ok(ConsoleCommand::Rgb(RgbColor { r: 300, g: -5, b: 10 })));
        assert_eq!(parse("rgb 1 2"), Err(ConsoleParseError::MissingArgument("rgb R G B")));
        assert_eq!(parse("rgb 1 2 x"), Err(ConsoleParseError::InvalidArgument("x".to_string())));
        assert_eq!(parse("rgb 1 2 3 4"), Err(ConsoleParseError::InvalidArgument("4".to_string())));
    }

    #[test]
    fn alerts_and_clearing() {
        assert_eq!(parse("alert water the plants"), Ok(ConsoleCommand::Alert("water the plants".to_string())));
        assert_eq!(parse("alert"), Err(ConsoleParseError::MissingArgument("alert MESSAGE")));
        assert_eq!(parse("clear 12"), Ok(ConsoleCommand::Clear(AlertId(12))));
        assert_eq!(parse("clear all"), Ok(ConsoleCommand::ClearAll));
        assert_eq!(parse("clear"), Err(ConsoleParseError::MissingArgument("clear ID | clear all")));
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(parse(""), Err(ConsoleParseError::Empty));
        assert_eq!(parse("jump"), Err(ConsoleParseError::UnknownCommand("jump".to_string())));
        assert_eq!(parse("exit"), Ok(ConsoleCommand::Quit));
    }
}
