use clap::Subcommand;
use lifetrack_core::{Config, Database, ValidationError};

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum EntriesAction {
    /// List recorded focus sessions
    List {
        /// Only entries from this month (YYYY-MM)
        #[arg(long)]
        month: Option<String>,
    },
    /// Delete an entry by id
    Delete {
        /// Entry ID
        id: String,
    },
    /// Focus minutes per month
    Monthly,
}

pub fn run(action: EntriesAction, account: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;
    let engine = open_engine(&db, &config, account);

    match action {
        EntriesAction::List { month } => {
            let mut entries = engine.entries()?;
            if let Some(month) = month {
                entries.retain(|e| e.month_key() == month);
            }
            print_json(&entries)?;
        }
        EntriesAction::Delete { id } => {
            if !engine.delete_entry(&id)? {
                return Err(ValidationError::NotFound {
                    entity: "Entry".into(),
                    id,
                }
                .into());
            }
            println!("deleted {id}");
        }
        EntriesAction::Monthly => {
            print_json(&engine.monthly_minutes()?)?;
        }
    }
    Ok(())
}
