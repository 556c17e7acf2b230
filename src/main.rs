use trafficgraph::config;
use trafficgraph::modes::{self, Compiled};
use trafficgraph::pipeline::StageId;
use trafficgraph::stage::StageRegistry;
mod cmd;

use anyhow::Context;
use clap::Parser;
use std::collections::HashMap;
use std::fs;

fn load_spec(path: &str) -> anyhow::Result<trafficgraph::TrafficSpec> {
    let text = fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    let spec = config::import_spec(&text).with_context(|| format!("invalid traffic description {path}"))?;
    Ok(spec)
}

fn print_json(compiled: &Compiled) -> anyhow::Result<()> {
    let tx = compiled
        .tx
        .iter()
        .map(|core| {
            let pipeline = serde_json::to_value(&core.graph)?;
            Ok(serde_json::json!({"core": core.core, "pipeline": pipeline}))
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    let rx = serde_json::to_value(&compiled.rx)?;
    let value = serde_json::json!({"tx": tx, "rx": rx});
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Count how often each producer is picked in `draws` selections
fn sample_producers(compiled: &Compiled, draws: usize, seed: u64) -> anyhow::Result<()> {
    for core in &compiled.tx {
        let Some(producers) = core.graph.producers() else {
            continue;
        };
        let mut counts: HashMap<StageId, usize> = HashMap::new();
        for id in producers.selector(seed)?.take(draws) {
            *counts.entry(id).or_default() += 1;
        }
        println!("[core {}] {draws} draws", core.core);
        for id in producers.stages() {
            let name = core
                .graph
                .stage(id)
                .map_or_else(|| id.to_string(), |stage| stage.name.clone());
            let count = counts.get(&id).copied().unwrap_or(0);
            println!(
                "  {name:<20} {count:>10} ({:.3} expected {:.3})",
                count as f64 / draws.max(1) as f64,
                producers.share(id).unwrap_or(0.0)
            );
        }
    }
    Ok(())
}

/// The entry point of the application.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    match args.command {
        cmd::Command::Show { config } => {
            let spec = load_spec(&config)?;
            println!("{spec}");
        }
        cmd::Command::Compile {
            config,
            port_out,
            draws,
            seed,
            json,
        } => {
            let spec = load_spec(&config)?;
            let registry = StageRegistry::builtin();
            let compiled = modes::compile(&spec, &registry, &port_out)?;
            if json {
                print_json(&compiled)?;
            } else {
                println!("{spec}");
                println!();
                print!("{compiled}");
            }
            if let Some(draws) = draws {
                sample_producers(&compiled, draws, seed)?;
            }
        }
    }
    Ok(())
}
