pub mod config;
pub mod entries;
pub mod timer;

use lifetrack_core::{
    AccountStore, Config, Database, LogScheduler, NoopScheduler, NotificationScheduler,
    SystemClock, TimerEngine,
};

pub type CliEngine<'a> = TimerEngine<AccountStore<'a>, Box<dyn NotificationScheduler>, SystemClock>;

/// Load the configured account's timer, reconciling it against the wall clock.
pub fn open_engine<'a>(db: &'a Database, config: &Config, account: Option<&str>) -> CliEngine<'a> {
    let account = account.unwrap_or(&config.account);
    let notifier: Box<dyn NotificationScheduler> = if config.notifications.enabled {
        Box::new(LogScheduler)
    } else {
        Box::new(NoopScheduler)
    };
    TimerEngine::load_with(
        account,
        db.account(account),
        notifier,
        SystemClock,
        config.notifications.ongoing,
    )
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
