//! Import statements for external scripts.

use crate::error::Result;

use super::WorkerType;

/// External scripts a context loads before its methods are bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imports {
    /// Ordered script references, loaded for their side effects.
    List(Vec<String>),
    /// Local name → reference pairs, in insertion order.
    Named(Vec<(String, String)>),
}

impl Imports {
    pub fn list<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(references.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, reference)| (name.into(), reference.into()))
                .collect(),
        )
    }
}

impl From<Vec<String>> for Imports {
    fn from(references: Vec<String>) -> Self {
        Self::List(references)
    }
}

impl From<Vec<&str>> for Imports {
    fn from(references: Vec<&str>) -> Self {
        Self::list(references)
    }
}

/// Whether `reference` looks like a script locator: an absolute URL, a
/// root-relative path, or a relative path.
pub fn is_script_locator(reference: &str) -> bool {
    ["http", "/", "./", "../"]
        .iter()
        .any(|prefix| reference.starts_with(prefix))
}

/// Emit one import line per locator-shaped entry; other entries are skipped.
///
/// Classic programs load every entry with `importScripts`, ignoring local
/// names. Module programs bind named entries with a default import and load
/// listed entries with a bare side-effect import.
pub fn emit_imports(imports: &Imports, worker_type: WorkerType) -> Result<String> {
    let is_module = worker_type.is_module();
    let mut script = String::new();

    match imports {
        Imports::List(references) => {
            for reference in references.iter().filter(|r| is_script_locator(r)) {
                let quoted = serde_json::to_string(reference)?;
                if is_module {
                    script.push_str(&format!("import {quoted};\n"));
                } else {
                    script.push_str(&format!("importScripts({quoted});\n"));
                }
            }
        }
        Imports::Named(pairs) => {
            for (name, reference) in pairs.iter().filter(|(_, r)| is_script_locator(r)) {
                let quoted = serde_json::to_string(reference)?;
                if is_module {
                    script.push_str(&format!("import {name} from {quoted};\n"));
                } else {
                    script.push_str(&format!("importScripts({quoted});\n"));
                }
            }
        }
    }

    Ok(script)
}
