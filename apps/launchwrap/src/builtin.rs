//! # Built-in Units
//!
//! Entry points and bundles compiled into the launcher binary.
//!
//! `launchwrap.main.Inspect` is the default launch target: it prints what it
//! was launched with as JSON, so a bare `launchwrap` run shows the outcome of
//! bootstrap.

use launchwrap_core::{CodeSource, LoaderError, Registry, Unit};
use serde::Serialize;

/// Name of the inspection entry point.
pub const INSPECT_ENTRY: &str = "launchwrap.main.Inspect";

/// What the inspection entry point prints.
#[derive(Debug, Serialize)]
pub struct InspectReport<'a> {
    pub target: &'a str,
    pub arguments: &'a [String],
    pub provenance: Option<&'a CodeSource>,
}

/// Registry holding the default bundle and the built-in entry points.
#[must_use]
pub fn standard_registry() -> Registry {
    let mut registry = Registry::with_defaults();
    registry.register_entry(INSPECT_ENTRY, inspect);
    registry
}

fn inspect(unit: &Unit, args: &[String]) -> Result<(), LoaderError> {
    let report = InspectReport {
        target: unit.name(),
        arguments: args,
        provenance: unit.provenance(),
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| LoaderError::SerializationError(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
