use super::{read_source, resolve_language};
use anyhow::Result;
use codepad_runtime::preview::render as render_preview;
use codepad_runtime::{Dispatcher, ExecutionStrategy, LanguageRegistry, RuntimeAdapter, RuntimeStatus};
use std::path::PathBuf;
use tracing::info;

pub fn languages() {
    println!("Languages:");
    for language in LanguageRegistry::builtin().list_all() {
        let mode = if language.executable { "run" } else { "preview" };
        println!(
            "  - {:<11} {:<11} .{:<5} ({})",
            language.id, language.display_name, language.file_extension, mode
        );
    }
}

/// Returns whether the snippet succeeded.
pub async fn execute(file: PathBuf, lang: Option<String>, json: bool) -> Result<bool> {
    let language = resolve_language(&file, lang.as_deref())?;
    let code = read_source(&file)?;
    let dispatcher = Dispatcher::with_defaults();

    if language.strategy == ExecutionStrategy::Heavy {
        ensure_ready(dispatcher.heavy_runtime()).await;
    }

    let result = dispatcher.execute(&code, language.id).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.render());
    }

    Ok(result.succeeded)
}

pub async fn preview(file: PathBuf, lang: Option<String>, out: Option<PathBuf>) -> Result<()> {
    let language = resolve_language(&file, lang.as_deref())?;
    let code = read_source(&file)?;

    let Some(document) = render_preview(&code, language) else {
        anyhow::bail!("{} is executable; use `codepad run` instead", language.display_name);
    };

    match out {
        Some(path) => {
            std::fs::write(&path, &document.html)?;
            info!("Wrote preview to {} (sandbox=\"{}\")", path.display(), document.sandbox);
        }
        None => print!("{}", document.html),
    }
    Ok(())
}

pub async fn packages() -> Result<()> {
    let runtime = RuntimeAdapter::python();
    if let RuntimeStatus::Error(message) = ensure_ready(&runtime).await {
        anyhow::bail!("Python runtime failed to load: {}", message);
    }

    let packages = runtime.list_available_packages()?;
    println!("{} importable modules:", packages.len());
    for name in packages {
        println!("  {}", name);
    }
    Ok(())
}

async fn ensure_ready(runtime: &RuntimeAdapter) -> RuntimeStatus {
    if runtime.is_ready() {
        return RuntimeStatus::Ready;
    }
    info!("Loading {} runtime...", runtime.display_name());
    runtime.initialize().await
}
