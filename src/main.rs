//! pipegraph - Main Entry Point
//!
//! Builds a node graph from command-line flags and runs it for a fixed
//! duration or until stdin is closed.

use anyhow::{bail, Context};
use pipegraph::{cli, logging, EngineConfig, Manager};
use std::io::Read;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let args = cli::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    logging::init(&config.logging.filter);

    let manager = Manager::from_config(&config);

    if args.list_nodes {
        for name in manager.registry().names() {
            println!("{name}");
        }
        return Ok(());
    }

    if args.duration < 0.0 || !args.duration.is_finite() {
        bail!("--duration must be a non-negative number of seconds");
    }

    tracing::info!("Starting pipegraph ({} transport)", config.manager.transport);

    for type_name in &args.nodes {
        let name = manager
            .add_node(type_name)
            .with_context(|| format!("Failed to add node `{type_name}`"))?;
        println!("{name}");
    }

    for link in &args.links {
        manager
            .add_link(&link.node_out, &link.node_in, &link.slot_out, &link.slot_in)
            .with_context(|| format!("Failed to add link {link}"))?;
    }

    for p in &args.params {
        manager
            .set_param(&p.node, &p.group, &p.name, p.value.clone())
            .with_context(|| format!("Failed to set {}.{}.{}", p.node, p.group, p.name))?;
    }

    if args.duration > 0.0 {
        manager.run_for(Duration::from_secs_f64(args.duration));
    } else {
        tracing::info!("Running until stdin is closed");
        std::thread::scope(|s| {
            s.spawn(|| {
                let mut sink = Vec::new();
                if let Err(e) = std::io::stdin().read_to_end(&mut sink) {
                    tracing::warn!("Failed to read stdin: {}", e);
                }
                manager.terminate();
            });
            manager.wait_until_terminated();
        });
    }

    tracing::info!("pipegraph shut down");
    Ok(())
}
