//! `rootsmith graph`: show build order without building anything.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use rootsmith_lib::BuildGraph;

use crate::cmd::load_recipes;
use crate::output::{OutputFormat, print_json, print_stat, symbols};

#[derive(Debug, Serialize)]
struct GraphReport {
  order: Vec<GraphNode>,
  waves: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct GraphNode {
  name: String,
  version: String,
  host_deps: Vec<String>,
}

pub fn cmd_graph(recipes: Option<&Path>, format: OutputFormat) -> Result<ExitCode> {
  let set = load_recipes(recipes)?;
  let graph = BuildGraph::new(&set)?;

  let report = GraphReport {
    order: graph
      .order()
      .iter()
      .map(|&idx| GraphNode {
        name: set[idx].recipe.name.clone(),
        version: set[idx].recipe.version.clone(),
        host_deps: set[idx].recipe.host_deps.clone(),
      })
      .collect(),
    waves: graph
      .waves()
      .into_iter()
      .map(|wave| wave.into_iter().map(|idx| graph.name(idx).to_string()).collect())
      .collect(),
  };

  if format.is_json() {
    print_json(&report)?;
    return Ok(ExitCode::SUCCESS);
  }

  println!("Build order:");
  for (pos, node) in report.order.iter().enumerate() {
    if node.host_deps.is_empty() {
      println!("  {:>3}. {} {}", pos + 1, node.name, node.version);
    } else {
      println!(
        "  {:>3}. {} {} {} {}",
        pos + 1,
        node.name,
        node.version,
        symbols::ARROW,
        node.host_deps.join(", ")
      );
    }
  }

  println!();
  println!("Parallel waves:");
  for (pos, wave) in report.waves.iter().enumerate() {
    print_stat(&format!("wave {}", pos + 1), &wave.join(", "));
  }

  Ok(ExitCode::SUCCESS)
}
