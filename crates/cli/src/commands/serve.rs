//! `websage serve` — Start the HTTP gateway and browser chat UI.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config_or_die()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("websage gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);

    websage_gateway::start(config).await?;

    Ok(())
}
