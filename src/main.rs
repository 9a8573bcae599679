//! chatpin: inspect and maintain the pinned conversations kept in the
//! file-backed store.
//!
//! Usage:
//!   chatpin list           # Show pinned conversations
//!   chatpin export [PATH]  # Write an export document (stdout without PATH)
//!   chatpin clear          # Unpin everything
//!   chatpin trim           # Drop malformed and surplus entries
//!   chatpin watch          # Print pinned list changes as they happen

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use chatpin::config::Config;
use chatpin::logging;
use chatpin::pins::stored::{decode_pinned, encode_pinned};
use chatpin::pins::CAPACITY;
use chatpin::popup::{Popup, Status};
use chatpin::relay::Hub;
use chatpin::store::{item, JsonFileStore, Store, LOCAL_AREA, PINNED_CHATS_KEY};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = Config::load().context("Failed to load configuration")?;
    logging::init(config.debug);

    match args.get(1).map(String::as_str) {
        None | Some("list") => list(&config),
        Some("export") => export(&config, args.get(2).map(PathBuf::from)),
        Some("clear") => clear(&config),
        Some("trim") => trim(),
        Some("watch") => watch(),
        Some("--help" | "-h") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown argument: {}", other);
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!("chatpin: pinned conversations for the chat sidebar");
    println!();
    println!("Usage:");
    println!("  chatpin list           Show pinned conversations");
    println!("  chatpin export [PATH]  Write an export document (stdout without PATH)");
    println!("  chatpin clear          Unpin everything");
    println!("  chatpin trim           Drop malformed and surplus entries");
    println!("  chatpin watch          Print pinned list changes as they happen");
}

fn open_store() -> Result<Arc<dyn Store>> {
    let store = JsonFileStore::open_default().context("Failed to open storage")?;
    Ok(Arc::new(store))
}

/// No browser is attached, so the popup model answers from storage alone.
fn open_popup(config: &Config) -> Result<Popup> {
    Ok(Popup::open(&Hub::new(), open_store()?, &config.timing))
}

fn list(config: &Config) -> Result<()> {
    let view = open_popup(config)?.view();
    if view.show_empty_state {
        println!("No pinned chats");
        return Ok(());
    }
    println!("Pinned chats ({}):", view.count);
    for row in view.rows {
        println!("  {:<12} {}", row.short_url, row.title);
    }
    Ok(())
}

fn export(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let doc = open_popup(config)?.export(Utc::now());
    let json = doc.to_json_pretty().context("Failed to serialize export")?;
    match path {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(doc.file_name())
            } else {
                path
            };
            fs::write(&path, json)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            println!(
                "Exported {} pinned chats to {}",
                doc.pinned_chats.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn clear(config: &Config) -> Result<()> {
    let mut popup = open_popup(config)?;
    let count = popup.clear_all();
    if popup.status() == Status::Error {
        bail!("Could not save changes");
    }
    println!("Unpinned {} chats", count);
    Ok(())
}

fn trim() -> Result<()> {
    let store = open_store()?;
    let stored = store.get(&[PINNED_CHATS_KEY])?;
    let mut decoded = decode_pinned(stored.get(PINNED_CHATS_KEY));
    for skipped in &decoded.skipped {
        println!("Dropping {}", skipped);
    }

    let surplus = decoded.entries.len().saturating_sub(CAPACITY);
    decoded.entries.truncate(CAPACITY);
    store.set(item(PINNED_CHATS_KEY, encode_pinned(&decoded.entries)))?;

    println!(
        "Kept {} pinned chats ({} malformed, {} over the limit)",
        decoded.entries.len(),
        decoded.skipped.len(),
        surplus
    );
    Ok(())
}

fn watch() -> Result<()> {
    let store = JsonFileStore::open_default()
        .context("Failed to open storage")?
        .watch_external_changes()
        .context("Failed to watch storage")?;
    let changes = store.subscribe();
    println!("Watching {} (Ctrl-C to stop)", store.path().display());

    for change in changes {
        if change.area != LOCAL_AREA {
            continue;
        }
        if let Some(pinned) = change.get(PINNED_CHATS_KEY) {
            let decoded = decode_pinned(pinned.new_value.as_ref());
            let ids: Vec<String> = decoded.entries.iter().map(|e| e.id.to_string()).collect();
            println!("{} pinned: {}", ids.len(), ids.join(", "));
        }
    }
    Ok(())
}
