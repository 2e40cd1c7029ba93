use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use stockpile::service::Warehouse;

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Get { item: String, amount: u32 },
    Deposit,
    Load,
    Search(String),
    List,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse a console line. Arguments are whitespace-separated; `get` needs an item and
/// a numeric amount, `search` needs a query.
pub fn parse_command(line: &str) -> ConsoleCommand {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return ConsoleCommand::Empty;
    };
    let first = parts.next();
    let second = parts.next();

    match (command, first, second) {
        ("get", Some(item), Some(amount)) => match amount.parse::<u32>() {
            Ok(amount) => ConsoleCommand::Get {
                item: item.to_string(),
                amount,
            },
            Err(_) => ConsoleCommand::Unknown(line.trim().to_string()),
        },
        ("deposit", _, _) => ConsoleCommand::Deposit,
        ("load", _, _) => ConsoleCommand::Load,
        ("search", Some(query), _) => ConsoleCommand::Search(query.to_string()),
        ("list", _, _) => ConsoleCommand::List,
        ("quit" | "exit", _, _) => ConsoleCommand::Quit,
        _ => ConsoleCommand::Unknown(line.trim().to_string()),
    }
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(warehouse: Arc<Warehouse>) -> Result<()> {
    println!("Commands: get <item> <amount>, deposit, load, search <query>, list, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Quit => break,
            ConsoleCommand::Unknown(_) => println!("Unknown command"),
            command => {
                if let Err(e) = execute(&warehouse, command).await {
                    println!("Error: {e}");
                }
            }
        }
    }

    Ok(())
}

async fn execute(warehouse: &Warehouse, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Get { item, amount } => {
            let response = warehouse.request_withdraw(&item, amount).await?;
            let report = &response.report;
            println!(
                "{}: fulfilled {} of {} ({:?})",
                report.item, report.fulfilled, report.requested, report.outcome
            );
            for step in &report.steps {
                match &step.error {
                    Some(error) => println!("  {}  took {}  ({error})", step.location, step.taken),
                    None => println!("  {}  took {}", step.location, step.taken),
                }
            }
            if let Some(delivery) = &response.delivery {
                match &delivery.returned_to_storage {
                    Some(_) => println!(
                        "{} is not around, items went back into storage",
                        delivery.recipient
                    ),
                    None => println!("Delivered {} to {}", delivery.delivered, delivery.recipient),
                }
            }
        }
        ConsoleCommand::Deposit => {
            let report = warehouse.request_deposit_all().await?;
            println!(
                "Deposited {} item(s), {} left ({:?})",
                report.deposited, report.remaining, report.outcome
            );
        }
        ConsoleCommand::Load => {
            let report = warehouse.request_reload(None).await?;
            println!(
                "Indexed {} of {} container(s)",
                report.containers_indexed, report.discovered
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.location, skipped.reason);
            }
        }
        ConsoleCommand::Search(query) => {
            let result = warehouse.request_search(&query)?;
            super::print_aggregate(&result.matches, result.total);
        }
        ConsoleCommand::List => {
            let listing = warehouse.request_listing()?;
            super::list::print_listing(&listing);
        }
        ConsoleCommand::Quit | ConsoleCommand::Empty | ConsoleCommand::Unknown(_) => {}
    }
    Ok(())
}
