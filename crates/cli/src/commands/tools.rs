//! `ritualcraft tools`: List the tool catalog.

use ritualcraft_config::AppConfig;
use ritualcraft_normalizer::{FieldKind, FieldSpec, SchemaRoot};
use ritualcraft_pipeline::Catalog;

pub fn run(config: &AppConfig) {
    let catalog = Catalog::with_overrides(&config.tools);

    println!("🧰 Ritualcraft Tools ({})", catalog.len());
    println!("========================");
    for tool in catalog.list() {
        println!();
        println!("  {} — {}", tool.name, tool.description);
        if tool.schema.root == SchemaRoot::Array {
            println!("    (reply is a bare JSON array)");
        }
        for field in &tool.schema.fields {
            println!("    • {}", describe(field));
        }
        if let Some(slot) = &tool.stores {
            println!("    saves session slot: {slot}");
        }
        if let Some(slot) = &tool.loads {
            println!("    reads session slot: {slot}");
        }
    }
}

fn describe(field: &FieldSpec) -> String {
    let kind = match field.kind {
        FieldKind::Text => "text".to_string(),
        FieldKind::Number => "number".to_string(),
        FieldKind::TextList => "list".to_string(),
        FieldKind::ObjectList => format!("list of {{{}}}", field.subfields.join(", ")),
    };
    match field.expected_items {
        Some(n) => format!("{} ({kind}, {n} items)", field.name),
        None => format!("{} ({kind})", field.name),
    }
}
