use super::{read_source, resolve_language};
use crate::context::{fallback_for, StoreContext};
use anyhow::Result;
use chrono::{DateTime, Utc};
use codepad_store::{NewSharedCode, PersistDebouncer, RestoredSnippet, SharedCodeEntry};
use notify::{Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

pub async fn share(
    ctx: &StoreContext,
    file: PathBuf,
    lang: Option<String>,
    function_name: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let language = resolve_language(&file, lang.as_deref())?;
    let code = read_source(&file)?;

    let mut entry = NewSharedCode::new(language.id, code);
    entry.function_name = function_name;
    entry.description = description;

    match ctx.store.put(entry).await {
        Some(id) => {
            println!("{}", id);
            info!(
                "Snippet expires in {} minutes",
                ctx.config.ttl_policy().shared.as_secs() / 60
            );
            Ok(())
        }
        None => anyhow::bail!("Snippet could not be stored; see the log for details"),
    }
}

pub async fn show(ctx: &StoreContext, id: String, json: bool) -> Result<()> {
    let Some(entry) = ctx.store.get(&id).await else {
        anyhow::bail!("No shared snippet {} (it may have expired)", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print_entry(&entry);
    }
    Ok(())
}

fn print_entry(entry: &SharedCodeEntry) {
    println!("Id:       {}", entry.id);
    println!("Language: {}", entry.language_id);
    println!("Created:  {}", format_timestamp(entry.created_at));
    if let Some(name) = &entry.function_name {
        println!("Function: {}", name);
    }
    if let Some(description) = &entry.description {
        println!("About:    {}", description);
    }
    println!("\n{}", entry.code);
}

pub fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Saves `file` as the in-progress edit of `id`, once or on every change.
pub async fn edit(ctx: &StoreContext, id: String, file: PathBuf, lang: Option<String>, watch: bool) -> Result<()> {
    let language_id = match lang {
        Some(lang) => resolve_language(&file, Some(&lang))?.id.to_string(),
        None => match ctx.store.get(&id).await {
            Some(shared) => shared.language_id,
            None => resolve_language(&file, None)?.id.to_string(),
        },
    };

    if !watch {
        let code = read_source(&file)?;
        ctx.store.persist(&id, &code, &language_id).await;
        info!("Saved edit of {} ({} bytes)", id, code.len());
        return Ok(());
    }

    let quiet = Duration::from_millis(ctx.config.sharing.persist_debounce_ms);
    let editor = PersistDebouncer::new(ctx.store.clone(), quiet);
    watch_file(&file, |code| editor.persist(&id, &code, &language_id)).await?;

    let flushed = editor.flush().await;
    info!("Stopped watching; flushed {} pending edit(s)", flushed);
    Ok(())
}

async fn watch_file(file: &Path, mut on_change: impl FnMut(String)) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("Source file not found: {}", file.display());
    }
    let file = file.canonicalize()?;
    let dir = file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let target = file.clone();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
        Ok(event) => {
            if event.kind.is_modify() || event.kind.is_create() {
                if event.paths.iter().any(|p| p == &target) {
                    let _ = tx.blocking_send(());
                }
            }
        }
        Err(e) => error!("Watch error: {:?}", e),
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    info!("Watching {} for edits (Ctrl+C to stop)", file.display());
    on_change(std::fs::read_to_string(&file)?);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }
                match std::fs::read_to_string(&file) {
                    Ok(code) => on_change(code),
                    Err(e) => warn!("Could not read {}: {}", file.display(), e),
                }
            }
        }
    }

    Ok(())
}

pub async fn restore(ctx: &StoreContext, id: String, lang: String) -> Result<()> {
    let restored = ctx.store.restore(&id, fallback_for(&lang)?).await;
    print_restored(&restored);
    Ok(())
}

pub async fn reset(ctx: &StoreContext, id: String, lang: String) -> Result<()> {
    let original = ctx.store.original(&id, fallback_for(&lang)?).await;
    print_restored(&original);
    Ok(())
}

fn print_restored(snippet: &RestoredSnippet) {
    info!("Restored {} snippet from {:?}", snippet.language_id, snippet.origin);
    print!("{}", snippet.code);
    if !snippet.code.ends_with('\n') {
        println!();
    }
}

pub async fn discard(ctx: &StoreContext, id: String) -> Result<()> {
    ctx.store.clear_persisted(&id).await;
    info!("Discarded edit of {}", id);
    Ok(())
}

pub async fn remove(ctx: &StoreContext, id: String) -> Result<()> {
    ctx.store.remove(&id).await;
    info!("Removed shared snippet {}", id);
    Ok(())
}
