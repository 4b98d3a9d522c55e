//! `ritualcraft serve`: Start the HTTP API server.

use ritualcraft_config::AppConfig;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🗓️  Ritualcraft Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Templates: {}", config.templates.backend);
    println!("   Auth tokens: {}", config.gateway.tokens.len());

    ritualcraft_gateway::start(config).await?;

    Ok(())
}
