//! Static catalog of the language variants the playground knows about.

use serde::Serialize;

/// How the dispatcher runs a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Evaluated directly by the embedded JavaScript engine.
    Dynamic,
    /// Transpiled to JavaScript first, then evaluated like `Dynamic`.
    Typed,
    /// Delegated to the lazily loaded heavy runtime.
    Heavy,
    /// Not executable; rendered as a sandboxed preview document.
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub file_extension: &'static str,
    pub default_snippet: &'static str,
    pub executable: bool,
    pub strategy: ExecutionStrategy,
    #[serde(skip)]
    pub aliases: &'static [&'static str],
}

impl LanguageDescriptor {
    fn matches(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(id))
    }
}

const JAVASCRIPT: LanguageDescriptor = LanguageDescriptor {
    id: "javascript",
    display_name: "JavaScript",
    file_extension: "js",
    default_snippet: r#"// Write your JavaScript here
function greet(name) {
  return `Hello, ${name}!`;
}

console.log(greet("World"));
"#,
    executable: true,
    strategy: ExecutionStrategy::Dynamic,
    aliases: &["js", "mjs", "node"],
};

const TYPESCRIPT: LanguageDescriptor = LanguageDescriptor {
    id: "typescript",
    display_name: "TypeScript",
    file_extension: "ts",
    default_snippet: r#"// Write your TypeScript here
interface User {
  name: string;
  age: number;
}

function describe(user: User): string {
  return `${user.name} is ${user.age} years old`;
}

console.log(describe({ name: "Ada", age: 36 }));
"#,
    executable: true,
    strategy: ExecutionStrategy::Typed,
    aliases: &["ts"],
};

const PYTHON: LanguageDescriptor = LanguageDescriptor {
    id: "python",
    display_name: "Python",
    file_extension: "py",
    default_snippet: r#"# Write your Python here
def greet(name):
    return f"Hello, {name}!"

print(greet("World"))
"#,
    executable: true,
    strategy: ExecutionStrategy::Heavy,
    aliases: &["py", "python3"],
};

const HTML: LanguageDescriptor = LanguageDescriptor {
    id: "html",
    display_name: "HTML",
    file_extension: "html",
    default_snippet: r#"<!DOCTYPE html>
<html>
  <body>
    <h1>Hello, World!</h1>
    <p>Edit this markup to see the preview update.</p>
  </body>
</html>
"#,
    executable: false,
    strategy: ExecutionStrategy::Preview,
    aliases: &["htm"],
};

const CSS: LanguageDescriptor = LanguageDescriptor {
    id: "css",
    display_name: "CSS",
    file_extension: "css",
    default_snippet: r#"body {
  font-family: sans-serif;
  background: #f5f5f5;
}

h1 {
  color: #3b82f6;
}
"#,
    executable: false,
    strategy: ExecutionStrategy::Preview,
    aliases: &[],
};

const JSON: LanguageDescriptor = LanguageDescriptor {
    id: "json",
    display_name: "JSON",
    file_extension: "json",
    default_snippet: r#"{
  "name": "codepad",
  "languages": ["javascript", "typescript", "python"]
}
"#,
    executable: false,
    strategy: ExecutionStrategy::Preview,
    aliases: &[],
};

const MARKDOWN: LanguageDescriptor = LanguageDescriptor {
    id: "markdown",
    display_name: "Markdown",
    file_extension: "md",
    default_snippet: "# Hello, World!\n\nWrite some *Markdown* here.\n",
    executable: false,
    strategy: ExecutionStrategy::Preview,
    aliases: &["md"],
};

static BUILTIN: &[LanguageDescriptor] = &[JAVASCRIPT, TYPESCRIPT, PYTHON, HTML, CSS, JSON, MARKDOWN];

/// Lookup over the immutable language catalog.
#[derive(Debug, Clone, Copy)]
pub struct LanguageRegistry {
    languages: &'static [LanguageDescriptor],
}

impl LanguageRegistry {
    pub fn builtin() -> Self {
        Self { languages: BUILTIN }
    }

    /// Finds a descriptor by canonical id or alias, ignoring ASCII case.
    pub fn find(&self, id: &str) -> Option<&'static LanguageDescriptor> {
        let id = id.trim();
        self.languages.iter().find(|lang| lang.matches(id))
    }

    pub fn list_all(&self) -> &'static [LanguageDescriptor] {
        self.languages
    }

    pub fn executable(&self) -> impl Iterator<Item = &'static LanguageDescriptor> {
        self.languages.iter().filter(|lang| lang.executable)
    }

    /// Guesses the language from a file extension such as `ts` or `.py`.
    pub fn by_extension(&self, extension: &str) -> Option<&'static LanguageDescriptor> {
        let extension = extension.trim_start_matches('.');
        self.languages
            .iter()
            .find(|lang| lang.file_extension.eq_ignore_ascii_case(extension))
            .or_else(|| self.find(extension))
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_id_and_alias() {
        let registry = LanguageRegistry::builtin();

        assert_eq!(registry.find("typescript").unwrap().display_name, "TypeScript");
        assert_eq!(registry.find("TS").unwrap().id, "typescript");
        assert_eq!(registry.find("py").unwrap().id, "python");
        assert!(registry.find("cobol").is_none());
    }

    #[test]
    fn test_executable_flags_match_strategy() {
        let registry = LanguageRegistry::builtin();

        for lang in registry.list_all() {
            assert_eq!(lang.executable, lang.strategy != ExecutionStrategy::Preview, "{}", lang.id);
        }

        let executable: Vec<_> = registry.executable().map(|l| l.id).collect();
        assert_eq!(executable, vec!["javascript", "typescript", "python"]);
    }

    #[test]
    fn test_by_extension() {
        let registry = LanguageRegistry::builtin();

        assert_eq!(registry.by_extension(".py").unwrap().id, "python");
        assert_eq!(registry.by_extension("md").unwrap().id, "markdown");
        assert!(registry.by_extension("exe").is_none());
    }
}
