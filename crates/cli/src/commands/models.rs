//! `agentscope models` — list the models of the default provider.

use std::path::Path;

use super::{CliResult, load_config};

pub async fn run(config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    let router = agentscope_providers::build_from_config(&config)?;
    let model = router.default().ok_or("No default provider configured")?;

    println!("Provider: {}", config.model.provider);
    let mut models = model.list_models().await?;
    models.sort();
    for name in &models {
        let marker = if *name == config.model.name { "*" } else { " " };
        println!("  {marker} {name}");
    }
    if models.is_empty() {
        println!("  (the provider reported no models)");
    }

    let others: Vec<&str> = router
        .list()
        .into_iter()
        .filter(|p| *p != config.model.provider)
        .collect();
    if !others.is_empty() {
        println!("\nOther configured providers: {}", others.join(", "));
    }
    Ok(())
}
