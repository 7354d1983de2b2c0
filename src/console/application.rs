use log::{debug, error, info, warn};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::console::render::{ChangeReporter, format_alerts, format_status};
use crate::console::types::{ConsoleCommand, HELP};
use crate::desk::coordinator::DeskCoordinator;
use crate::error::{CommandError, ConsoleParseError};

enum Flow {
    Continue,
    Quit,
}

fn report_command_error(action: &str, err: &CommandError) {
    warn!("{} failed: {:?}", action, err);
    println!("{} failed: {}", action, err);
}

async fn execute(coordinator: &DeskCoordinator, command: ConsoleCommand) -> Flow {
    match command {
        ConsoleCommand::Connect => {
            println!("Scanning for a desk device...");
            if let Err(err) = coordinator.connect().await {
                println!("Connect failed: {}", err);
            }
        },
        ConsoleCommand::Disconnect => coordinator.disconnect().await,
        ConsoleCommand::Desk(on) => match coordinator.toggle_desk(on).await {
            Ok(on) => println!("desk is now {}", if on { "ON" } else { "OFF" }),
            Err(err) => report_command_error("Switching the desk", &err),
        },
        ConsoleCommand::Heater(on) => match coordinator.toggle_heater(on).await {
            Ok(on) => println!("heater is now {}", if on { "ON" } else { "OFF" }),
            Err(err) => report_command_error("Switching the heater", &err),
        },
        ConsoleCommand::Rgb(color) => {
            if let Err(err) = coordinator.set_color(color).await {
                report_command_error("Setting the light", &err);
            }
        },
        ConsoleCommand::Alert(message) => {
            if let Err(err) = coordinator.raise_alert(message).await {
                report_command_error("Adding the alert", &err);
            }
        },
        ConsoleCommand::Alerts => println!("{}", format_alerts(&coordinator.snapshot())),
        ConsoleCommand::Clear(id) => match coordinator.clear_alert(id).await {
            Ok(true) => println!("Cleared alert #{}", id),
            Ok(false) => println!("No alert #{}", id),
            Err(err) => report_command_error("Clearing the alert", &err),
        },
        ConsoleCommand::ClearAll => {
            if let Err(err) = coordinator.clear_all_alerts().await {
                report_command_error("Clearing alerts", &err);
            }
        },
        ConsoleCommand::Status => println!("{}", format_status(&coordinator.snapshot(), Instant::now())),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => return Flow::Quit,
    }

    Flow::Continue
}

/// Line based front end: reads commands from stdin and prints connection changes and new alerts
/// as the coordinator publishes them. Returns on `quit`, end of input or cancellation.
pub async fn run_console(coordinator: DeskCoordinator, cancel: CancellationToken) {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut snapshots = coordinator.subscribe();
    let mut reporter = ChangeReporter::new(&snapshots.borrow_and_update());

    println!("Type \"help\" for a list of commands");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("End of input");
                        break;
                    },
                    Err(err) => {
                        error!("Failed to read from stdin: {:?}", err);
                        break;
                    },
                };

                let command = match line.parse::<ConsoleCommand>() {
                    Ok(command) => command,
                    Err(ConsoleParseError::Empty) => continue,
                    Err(err) => {
                        println!("{}", err);
                        continue;
                    },
                };

                debug!("Console command {:?}", command);
                if let Flow::Quit = execute(&coordinator, command).await {
                    break;
                }
            },

            changed = snapshots.changed() => {
                if changed.is_err() {
                    info!("Coordinator stopped, closing console");
                    break;
                }

                let snapshot = snapshots.borrow_and_update().clone();
                for line in reporter.changes(&snapshot) {
                    println!("{}", line);
                }
            },
        }
    }
}
