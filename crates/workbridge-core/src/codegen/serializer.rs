//! Rendering of a method mapping as program text.
//!
//! Classic programs bind every entry at top level; module programs collect
//! them into a `workerMethods` object that the generated handler reads.

use crate::error::{Error, Result};
use crate::method::{Method, Methods};

use super::WorkerType;
use super::shape::{Shape, classify, is_ident_char};

/// Name of the object holding module-mode bindings.
pub const MODULE_BINDINGS: &str = "workerMethods";

/// Serialize every entry of `methods` into program text.
pub fn serialize_methods(methods: &Methods, worker_type: WorkerType) -> Result<String> {
    let is_module = worker_type.is_module();

    let entries = methods
        .iter()
        .map(|(name, method)| serialize_entry(name, method, is_module))
        .collect::<Result<Vec<_>>>()?;

    if is_module {
        Ok(format!(
            "const {MODULE_BINDINGS} = {{\n{}\n}}",
            entries.join(",\n")
        ))
    } else {
        Ok(entries.join("\n\n"))
    }
}

fn serialize_entry(name: &str, method: &Method, is_module: bool) -> Result<String> {
    if !is_identifier(name) {
        return Err(Error::Serialization(format!(
            "`{name}` is not a valid binding name"
        )));
    }

    match method {
        Method::Plain(value) => {
            let literal = serde_json::to_string(value)?;
            Ok(bind(name, &literal, is_module))
        }
        Method::Callable(callable) => serialize_callable(name, callable.source(), is_module),
    }
}

/// Serialize one callable's source under `name`.
///
/// Declarations and arrows are bound as-is. Method shorthand is rewritten
/// into a named function declaration (classic) or an anonymous function
/// expression (module), keeping the `async` marker.
pub fn serialize_callable(name: &str, source: &str, is_module: bool) -> Result<String> {
    let raw = source.trim();
    let shape = classify(raw).ok_or_else(|| {
        Error::Serialization(format!("`{name}`: unrecognized function source"))
    })?;

    Ok(match shape {
        Shape::Declaration(text) => bind(name, &text, is_module),
        Shape::Arrow => bind(name, raw, is_module),
        Shape::Shorthand {
            is_async,
            params,
            body,
        } => {
            let prefix = if is_async { "async " } else { "" };
            if is_module {
                format!("{name}: {prefix}function ({params}) {{\n{body}\n}}")
            } else {
                format!("{prefix}function {name}({params}) {{\n{body}\n}}")
            }
        }
    })
}

fn bind(name: &str, text: &str, is_module: bool) -> String {
    if is_module {
        format!("{name}: {text}")
    } else {
        format!("{name} = {text};")
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if !first.is_ascii_digit() && is_ident_char(first) => {
            chars.all(is_ident_char)
        }
        _ => false,
    }
}
