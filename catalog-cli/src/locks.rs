//! `locks list` and `locks clear`

use anyhow::Result;
use catalog_core::clock::SystemClock;
use catalog_core::config::Config;
use catalog_core::writer_lock::{
    execute_clear, inspect_stores, ClearCommand, LockReport, LockTarget, StoreLockStatus,
    StoreLocks,
};
use std::io::{self, BufRead, Write};

pub fn list(config: &Config, json: bool) -> Result<()> {
    let stores = config.stores.paths().known_stores();
    let report = inspect_stores(&stores, config.lock.timeout, &SystemClock);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for entry in &report {
        print_store(entry);
    }
    Ok(())
}

pub fn clear(config: &Config, raw: &str, yes: bool) -> Result<()> {
    let command: ClearCommand = raw.parse()?;
    let stores = config.stores.paths().known_stores();

    let report = inspect_stores(&stores, config.lock.timeout, &SystemClock);
    let targets = command.targets(&stores);

    let mut matched = 0;
    println!("Locks selected by {}:", raw.trim());
    for (store, _, target) in &targets {
        let Some(entry) = report.iter().find(|e| e.store == store.code()) else {
            continue;
        };
        if let StoreLockStatus::Locks { locks } = &entry.status {
            for lock in locks.iter().filter(|l| selects(target, l)) {
                matched += 1;
                println!("  {:<12} {}", entry.store, describe(lock));
            }
        }
    }

    if matched == 0 {
        println!("  (none)");
        return Ok(());
    }

    if !yes && !confirm(&format!("Remove {} lock row(s)? [y/N] ", matched))? {
        println!("Aborted.");
        return Ok(());
    }

    for result in execute_clear(&stores, &command, config.lock.io_timeout) {
        match result.skipped {
            Some(reason) => println!("{:<12} skipped ({})", result.store, reason),
            None => println!("{:<12} removed {}", result.store, result.removed),
        }
    }
    Ok(())
}

fn selects(target: &LockTarget, lock: &LockReport) -> bool {
    match target {
        LockTarget::All => true,
        LockTarget::Key(key) => lock.lock_key == *key,
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn print_store(entry: &StoreLocks) {
    println!("{} ({})", entry.store, entry.path.display());
    match &entry.status {
        StoreLockStatus::MissingFile => println!("  file not found"),
        StoreLockStatus::NoLockTable => println!("  no lock table"),
        StoreLockStatus::Unreadable { reason } => println!("  unreadable: {}", reason),
        StoreLockStatus::Locks { locks } if locks.is_empty() => println!("  no locks"),
        StoreLockStatus::Locks { locks } => {
            for lock in locks {
                println!("  {}", describe(lock));
            }
        }
    }
}

fn describe(lock: &LockReport) -> String {
    let age = lock
        .age_secs
        .map(|secs| format!("{}s", secs))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} held by {} since {}, heartbeat {} (age {}){}",
        lock.lock_key,
        lock.holder,
        lock.acquired_at,
        lock.heartbeat_at,
        age,
        if lock.stale { " STALE" } else { "" }
    )
}
