//! `ritualcraft templates`: Import and list prompt templates.

use ritualcraft_config::AppConfig;
use ritualcraft_gateway::open_template_store;
use ritualcraft_pipeline::Catalog;
use ritualcraft_store::{load_seed_file, seed_store};
use std::path::Path;

pub async fn import(config: &AppConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if config.templates.backend == "memory" {
        println!("⚠️  templates.backend is 'memory'; imported templates last only for this process.");
        println!("   Set backend = \"sqlite\" under [templates] to persist them.");
    }

    let templates = load_seed_file(file)?;
    let catalog = Catalog::with_overrides(&config.tools);
    for tpl in &templates {
        if catalog.get(&tpl.tool_name).is_none() {
            println!("⚠️  '{}' is not a known tool; importing anyway", tpl.tool_name);
        }
    }

    let store = open_template_store(config).await?;
    let count = seed_store(store.as_ref(), templates).await?;
    println!("📥 Imported {count} template(s) into the {} store", store.name());

    Ok(())
}

pub async fn list(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_template_store(config).await?;
    let templates = store.list().await?;

    println!("📝 Prompt Templates ({}, {} stored)", store.name(), templates.len());
    println!("==================");
    for tpl in &templates {
        let model = if tpl.model.is_empty() {
            config.default_model.as_str()
        } else {
            tpl.model.as_str()
        };
        println!(
            "  {:<22} {:<16} max_tokens={:<5} temp={:.2}  updated {}",
            tpl.tool_name,
            model,
            tpl.params.max_tokens,
            tpl.params.temperature,
            tpl.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    let catalog = Catalog::with_overrides(&config.tools);
    let missing: Vec<&str> = catalog
        .list()
        .into_iter()
        .map(|t| t.name.as_str())
        .filter(|name| !templates.iter().any(|tpl| tpl.tool_name == *name))
        .collect();
    if !missing.is_empty() {
        println!();
        println!("  ⚠️  No template for: {}", missing.join(", "));
    }

    Ok(())
}
