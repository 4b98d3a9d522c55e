//! `ritualcraft normalize`: Run the normalizer over a saved model reply.
//!
//! Useful for replaying replies captured from production against schema
//! changes without calling the model.

use ritualcraft_config::AppConfig;
use ritualcraft_pipeline::Catalog;
use std::io::Read;
use std::path::Path;

pub fn run(
    config: &AppConfig,
    tool: &str,
    file: Option<&Path>,
    trace: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let catalog = Catalog::with_overrides(&config.tools);
    println!("{}", render(&catalog, tool, &raw, trace)?);
    Ok(())
}

/// The pretty-printed flattened result, optionally followed by the trace.
pub fn render(
    catalog: &Catalog,
    tool: &str,
    raw: &str,
    trace: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let spec = catalog
        .get(tool)
        .ok_or_else(|| format!("Unknown tool '{tool}'. Run `ritualcraft tools` to list tools."))?;

    let result = ritualcraft_normalizer::normalize(raw, &spec.schema);
    let mut out = serde_json::to_string_pretty(&result.to_flat_json())?;
    if trace {
        out.push_str("\n\n");
        out.push_str(&serde_json::to_string_pretty(&result.trace)?);
    }
    Ok(out)
}
