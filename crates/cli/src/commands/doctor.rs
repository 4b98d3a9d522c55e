//! `ritualcraft doctor`: Diagnose configuration and storage.

use ritualcraft_config::AppConfig;
use ritualcraft_gateway::open_template_store;
use ritualcraft_pipeline::Catalog;
use std::path::Path;

pub async fn run(
    config: &AppConfig,
    config_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Ritualcraft Doctor — System Diagnostics");
    println!("==========================================\n");

    let mut issues = 0;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if path.exists() {
        println!("  ✅ Config file valid ({})", path.display());
    } else {
        println!("  ⚠️  No config file at {} — using defaults", path.display());
        issues += 1;
    }

    let providers = ritualcraft_providers::build_from_config(config);
    if providers.default().is_some() {
        println!("  ✅ Provider '{}' configured", providers.default_name());
    } else {
        println!(
            "  ❌ Provider '{}' not configured; set RITUALCRAFT_API_KEY or add api_key to config.toml",
            providers.default_name()
        );
        issues += 1;
    }

    let catalog = Catalog::with_overrides(&config.tools);
    println!("  ✅ {} tools in catalog", catalog.len());

    match open_template_store(config).await {
        Ok(store) => {
            let templates = store.list().await?;
            println!(
                "  ✅ Template store '{}' opened ({} templates)",
                store.name(),
                templates.len()
            );
            let missing = catalog
                .list()
                .into_iter()
                .filter(|t| !templates.iter().any(|tpl| tpl.tool_name == t.name))
                .count();
            if missing > 0 {
                println!("  ⚠️  {missing} tool(s) have no prompt template and will return 500");
                issues += 1;
            }
        }
        Err(e) => {
            println!("  ❌ Template store failed to open: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
