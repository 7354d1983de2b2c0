use std::fmt;

use crate::desk::state::{RgbColor, Switch};

/// Text commands understood by the desk controller firmware, one per write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand {
    Switch { switch: Switch, on: bool },
    Rgb(RgbColor),
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireCommand::Switch { switch: Switch::Desk, on: true } => write!(f, "D_ON"),
            WireCommand::Switch { switch: Switch::Desk, on: false } => write!(f, "D_OFF"),
            WireCommand::Switch { switch: Switch::Heater, on: true } => write!(f, "H_ON"),
            WireCommand::Switch { switch: Switch::Heater, on: false } => write!(f, "H_OFF"),
            // channels are written as given, range checks are up to the caller
            WireCommand::Rgb(RgbColor { r, g, b }) => write!(f, "RGB:{},{},{}", r, g, b),
        }
    }
}
