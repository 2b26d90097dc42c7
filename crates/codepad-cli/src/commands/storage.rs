use super::share::format_timestamp;
use crate::config::days;
use crate::context::StoreContext;
use anyhow::Result;

pub async fn stats(ctx: &StoreContext, json: bool) -> Result<()> {
    let stats = ctx.janitor.get_stats().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Entries:  {}", stats.total_entries);
    for (namespace, count) in &stats.count_by_namespace {
        println!("  {:<10} {}", namespace, count);
    }
    println!("Size:     {} bytes", stats.total_size_bytes);
    println!("Expired:  {}", stats.expired_count);
    if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
        println!("Oldest:   {}", format_timestamp(oldest));
        println!("Newest:   {}", format_timestamp(newest));
    }
    Ok(())
}

pub async fn entries(ctx: &StoreContext, json: bool) -> Result<()> {
    let entries = ctx.janitor.get_all_entries().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No stored entries");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{:<10} {:<20} {:<11} {:>7}B  {}{}",
            entry.namespace,
            entry.id,
            entry.language_id,
            entry.size_bytes,
            format_timestamp(entry.timestamp),
            if entry.expired { "  (expired)" } else { "" }
        );
    }
    Ok(())
}

/// Expiry sweep by default. `--older-than-days` or `--stale` (the configured
/// maximum age) purge by age instead.
pub async fn cleanup(ctx: &StoreContext, older_than_days: Option<u64>, stale: bool) -> Result<()> {
    let max_age = match older_than_days {
        Some(count) => Some(
            days(count).ok_or_else(|| anyhow::anyhow!("--older-than-days {} is out of range", count))?,
        ),
        None if stale => Some(ctx.config.janitor.max_age()),
        None => None,
    };

    let removed = match max_age {
        Some(max_age) => ctx.janitor.cleanup_older_than(max_age).await,
        None => ctx.janitor.cleanup_expired().await,
    };
    println!("Removed {} entries", removed);
    Ok(())
}

pub async fn clear(ctx: &StoreContext, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to clear all snippets without --yes");
    }
    let removed = ctx.janitor.clear_all().await;
    println!("Removed {} entries", removed);
    Ok(())
}

pub async fn usage(ctx: &StoreContext) -> Result<()> {
    let usage = ctx.janitor.estimate_usage().await;
    println!(
        "{} bytes used ({:.2}% of {} bytes), {} bytes available",
        usage.used_bytes,
        usage.percentage,
        ctx.janitor.options().storage_ceiling_bytes,
        usage.available_bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodepadConfig, StorageBackend};

    async fn memory_context() -> StoreContext {
        let mut config = CodepadConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.janitor.auto_cleanup = false;
        StoreContext::open(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_cleanup_rejects_oversized_age() {
        let ctx = memory_context().await;

        let err = cleanup(&ctx, Some(u64::MAX), false).await.unwrap_err();

        assert!(err.to_string().contains("out of range"), "{}", err);
        assert!(cleanup(&ctx, Some(7), false).await.is_ok());
        assert!(cleanup(&ctx, None, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let ctx = memory_context().await;
        assert!(clear(&ctx, false).await.is_err());
        assert!(clear(&ctx, true).await.is_ok());
    }
}
