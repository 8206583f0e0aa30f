//! One-shot store and schedule commands.

use chrono::Utc;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use storyline_core::{open_db, Gateway, StoryConfig, SystemClock};

fn gateway(db: &Path) -> Result<Gateway, Box<dyn Error>> {
    let conn = open_db(db)?;
    Ok(Gateway::new(conn, StoryConfig::default(), Arc::new(SystemClock)))
}

/// Prints the current window of the default story.
pub async fn window(db: &Path) -> Result<(), Box<dyn Error>> {
    let window = gateway(db)?.window().await?;
    println!("{}", serde_json::to_string_pretty(&window)?);
    Ok(())
}

/// Prints the Opening state for the current instant.
pub fn opening() -> Result<(), Box<dyn Error>> {
    let state = StoryConfig::default().opening.current_state(Utc::now());
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Deletes one token from the default story and prints the patch.
///
/// Connected gateways in other processes do not see the patch; their
/// clients pick the change up on their next resync.
pub async fn delete(db: &Path, position: i64) -> Result<(), Box<dyn Error>> {
    let patch = gateway(db)?.moderate_delete(position).await?;
    println!("{}", serde_json::to_string_pretty(&patch)?);
    Ok(())
}
