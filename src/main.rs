// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio_stream::StreamExt;

use flowrunner::engine::{FlowExecutor, FlowOptions, NodeStatus};
use flowrunner::graph::load_structure;
use flowrunner::signature::analyze_node_file;

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <projects_root> <project_id> [start_node] [options]");
    eprintln!("       {program} --analyze <projects_root> <project_id> <node_id>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --stream             print each progress event as a JSON line");
    eprintln!("  --worker             route custom nodes through the per-project worker");
    eprintln!("  --params <json>      initial params for the start node");
    eprintln!("  --seed <json>        terminal seed values (object keyed by node id)");
    eprintln!("  --max-workers <n>    bounded concurrency (default 4)");
    eprintln!("  --timeout <secs>     per-node timeout (default 30)");
    eprintln!("  --no-halt            keep running descendants of failed nodes");
    eprintln!();
    eprintln!("Example: {program} ./projects example_project --stream");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("flowrunner");

    if args.len() >= 2 && args[1] == "--analyze" {
        if args.len() != 5 {
            print_usage(program);
            std::process::exit(1);
        }
        return analyze(&args[2], &args[3], &args[4]);
    }

    if args.len() < 3 {
        print_usage(program);
        std::process::exit(1);
    }

    let projects_root = PathBuf::from(&args[1]);
    let project_id = args[2].clone();

    let mut options = FlowOptions::default();
    let mut stream_mode = false;
    let mut worker_mode = false;

    let mut rest = args[3..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--stream" => stream_mode = true,
            "--worker" => worker_mode = true,
            "--no-halt" => options.halt_on_error = false,
            "--params" => {
                let raw = rest.next().context("--params requires a JSON argument")?;
                options.params = Some(serde_json::from_str(raw).context("invalid --params JSON")?);
            }
            "--seed" => {
                let raw = rest.next().context("--seed requires a JSON argument")?;
                let seeds: HashMap<String, serde_json::Value> =
                    serde_json::from_str(raw).context("invalid --seed JSON")?;
                options.seed_values = Some(seeds);
            }
            "--max-workers" => {
                let raw = rest.next().context("--max-workers requires a number")?;
                options.max_workers = raw.parse().context("invalid --max-workers value")?;
            }
            "--timeout" => {
                let raw = rest.next().context("--timeout requires a number of seconds")?;
                options.timeout = Duration::from_secs(raw.parse().context("invalid --timeout value")?);
            }
            other if !other.starts_with("--") && options.start_node.is_none() => {
                options.start_node = Some(other.to_string());
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    let executor = if worker_mode {
        FlowExecutor::worker_backed(&projects_root)
    } else {
        FlowExecutor::sandbox(&projects_root)
    };

    if stream_mode {
        let mut stream = executor.execute_flow_streaming(&project_id, options)?;
        while let Some(event) = stream.next().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    println!("🚀 Running flow for project '{project_id}'");
    let summary = executor.execute_flow(&project_id, options).await?;

    println!("\n📊 Execution Results ({}):", summary.run_id);
    for node_id in &summary.execution_order {
        let Some(record) = summary.execution_results.get(node_id) else {
            continue;
        };
        match record.status {
            NodeStatus::Success => {
                println!("  ✅ {node_id} ({} ms)", record.execution_time_ms);
            }
            NodeStatus::Error => {
                println!(
                    "  ❌ {node_id}: {}",
                    record.error.as_deref().unwrap_or("unknown error")
                );
            }
            NodeStatus::Skipped => {
                println!(
                    "  ⏭️  {node_id}: {}",
                    record.error.as_deref().unwrap_or("skipped")
                );
            }
        }
    }

    if !summary.result_nodes.is_empty() {
        println!("\n🎯 Result Nodes:");
        for (node_id, value) in &summary.result_nodes {
            println!("  {node_id} = {}", serde_json::to_string(value)?);
        }
    }
    println!(
        "\n⏱️  Total node execution time: {} ms",
        summary.total_execution_time_ms
    );

    Ok(())
}

fn analyze(projects_root: &str, project_id: &str, node_id: &str) -> anyhow::Result<()> {
    let graph = load_structure(PathBuf::from(projects_root).as_path(), project_id)?;
    let node = graph
        .node(node_id)
        .with_context(|| format!("node '{node_id}' not found in project '{project_id}'"))?;
    let path = PathBuf::from(projects_root)
        .join(project_id)
        .join(node.artifact_name());
    let signature = analyze_node_file(&path);
    println!("{}", serde_json::to_string_pretty(&signature)?);
    Ok(())
}
