//! TypeScript → JavaScript through SWC.
//!
//! Types are erased by SWC's strip pass and nothing is type-checked. Without a
//! module system the snippet is parsed as a function body, the way the engine
//! runs it, so a top-level `return` is legal and `import`/`export` are not.

use serde::{Deserialize, Serialize};
use swc_core::common::comments::{Comments, SingleThreadedComments};
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, Globals, Mark, SourceMap, Spanned, DUMMY_SP, GLOBALS};
use swc_core::ecma::ast::{Decl, EsVersion, Program, Script, Stmt};
use swc_core::ecma::codegen::to_code_default;
use swc_core::ecma::parser::error::Error as ParseError;
use swc_core::ecma::parser::{parse_file_as_module, parse_file_as_script, Syntax, TsSyntax};
use swc_core::ecma::transforms::base::fixer::fixer;
use swc_core::ecma::transforms::base::hygiene::hygiene;
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::transforms::typescript::strip;
use thiserror::Error;
use tracing::trace;

const BODY_OPEN: &str = "function __codepad_snippet__() {\n";
const BODY_CLOSE: &str = "\n}";

/// How import/export declarations are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    /// No module system: the source is a function body and module syntax is an error.
    None,
    /// Parsed and emitted as an ES module.
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranspileOptions {
    /// Emit a `"use strict"` prologue.
    pub strict: bool,
    pub remove_comments: bool,
    pub module: ModuleKind,
}

impl TranspileOptions {
    /// The fixed configuration used for playground runs: loose checking,
    /// comments stripped and no module wrapping.
    pub fn playground() -> Self {
        Self {
            strict: false,
            remove_comments: true,
            module: ModuleKind::None,
        }
    }
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self::playground()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({line}:{column})")]
pub struct TranspileError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl TranspileError {
    fn from_parse(cm: &SourceMap, error: &ParseError, line_offset: usize) -> Self {
        let loc = cm.lookup_char_pos(Spanned::span(error).lo);
        Self {
            message: error.kind().msg().to_string(),
            line: loc.line.saturating_sub(line_offset).max(1),
            column: loc.col.0 + 1,
        }
    }
}

/// Transpiles TypeScript source into JavaScript.
pub fn transpile(source: &str, options: &TranspileOptions) -> Result<String, TranspileError> {
    let cm: Lrc<SourceMap> = Default::default();
    let comments = SingleThreadedComments::default();
    let kept: Option<&dyn Comments> = if options.remove_comments { None } else { Some(&comments) };

    let wrapped = options.module == ModuleKind::None;
    let (text, line_offset) = if wrapped {
        (format!("{}{}{}", BODY_OPEN, source, BODY_CLOSE), 1)
    } else {
        (source.to_string(), 0)
    };
    let fm = cm.new_source_file(Lrc::new(FileName::Custom("snippet.ts".into())), text);

    let syntax = Syntax::Typescript(TsSyntax::default());
    let mut recovered = Vec::new();
    let parsed = if wrapped {
        parse_file_as_script(&fm, syntax, EsVersion::latest(), kept, &mut recovered).map(Program::Script)
    } else {
        parse_file_as_module(&fm, syntax, EsVersion::latest(), kept, &mut recovered).map(Program::Module)
    };

    let program = parsed.map_err(|e| TranspileError::from_parse(&cm, &e, line_offset))?;
    if let Some(e) = recovered.first() {
        return Err(TranspileError::from_parse(&cm, e, line_offset));
    }

    let javascript = GLOBALS.set(&Globals::new(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        let program = program.apply((
            resolver(unresolved_mark, top_level_mark, true),
            strip(unresolved_mark, top_level_mark),
            hygiene(),
            fixer(kept),
        ));

        match program {
            Program::Script(script) if wrapped => {
                let body = script.body.into_iter().find_map(snippet_body).unwrap_or_default();
                let script = Script {
                    span: DUMMY_SP,
                    body,
                    shebang: None,
                };
                to_code_default(cm.clone(), kept, &script)
            }
            program => to_code_default(cm.clone(), kept, &program),
        }
    });
    trace!("Transpiled {} bytes of TypeScript into {} bytes", source.len(), javascript.len());

    if options.strict {
        Ok(format!("\"use strict\";\n{}", javascript))
    } else {
        Ok(javascript)
    }
}

fn snippet_body(stmt: Stmt) -> Option<Vec<Stmt>> {
    match stmt {
        Stmt::Decl(Decl::Fn(decl)) => decl.function.body.map(|block| block.stmts),
        _ => None,
    }
}
