pub mod run;
pub mod share;
pub mod storage;

use anyhow::Result;
use codepad_runtime::{LanguageDescriptor, LanguageRegistry};
use std::io::Read;
use std::path::Path;

/// Reads a snippet from `path`, or from stdin when the path is `-`.
pub fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut code = String::new();
        std::io::stdin().read_to_string(&mut code)?;
        return Ok(code);
    }

    if !path.is_file() {
        anyhow::bail!("Source file not found: {}", path.display());
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Picks the language from `--lang`, falling back to the file extension.
pub fn resolve_language(path: &Path, lang: Option<&str>) -> Result<&'static LanguageDescriptor> {
    let registry = LanguageRegistry::builtin();

    if let Some(lang) = lang {
        return registry
            .find(lang)
            .ok_or_else(|| anyhow::anyhow!("Unknown language: {}", lang));
    }

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    registry.by_extension(extension).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot tell the language of {}; pass --lang",
            path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_language() {
        assert_eq!(resolve_language(Path::new("a.ts"), None).unwrap().id, "typescript");
        assert_eq!(resolve_language(Path::new("-"), Some("py")).unwrap().id, "python");
        assert!(resolve_language(Path::new("notes"), None).is_err());
        assert!(resolve_language(Path::new("a.js"), Some("cobol")).is_err());
    }
}
