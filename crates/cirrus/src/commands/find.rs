//! cirrus types / find コマンドハンドラ

use cirrus_azure::Arm;
use cirrus_cloud::ResourceRegistry;
use colored::Colorize;
use serde_json::Value;

pub fn handle_types(registry: &ResourceRegistry<dyn Arm>) {
    println!("{}", "Resources:".bold());
    for name in registry.resource_types() {
        println!("  {}", name.green());
    }
    println!();
    println!("{}", "Finders:".bold());
    for name in registry.finder_types() {
        println!("  {}", name.green());
    }
}

pub async fn handle_find(
    registry: &ResourceRegistry<dyn Arm>,
    client: &(dyn Arm + 'static),
    resource_type: &str,
    id: Option<&str>,
) -> anyhow::Result<()> {
    let found = find(registry, client, resource_type, id).await?;
    if found.is_empty() {
        eprintln!("{}", format!("No {} found", resource_type).dimmed());
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&Value::Array(found))?);
    Ok(())
}

async fn find(
    registry: &ResourceRegistry<dyn Arm>,
    client: &(dyn Arm + 'static),
    resource_type: &str,
    id: Option<&str>,
) -> anyhow::Result<Vec<Value>> {
    let finder = registry.finder(resource_type)?;
    let found = match id {
        Some(id) => finder.find(client, id).await?,
        None => finder.find_all(client).await?,
    };
    Ok(found)
}
