use clap::Parser;
use colored::Colorize;
use evalexpr::build_operator_tree;
use log::debug;
use powexpand::{
    config::RewriteConfig,
    convert::build_node,
    gating::{should_apply_gpu_transform, DeviceDescriptor},
    rewrite::{count_power_ops, transform_power_ops},
};
use std::process;

#[derive(Parser)]
#[command(name = "powexpand")]
#[command(about = "Expand integer powers in an expression into multiplication chains")]
#[command(version)]
struct Args {
    /// Mathematical expression to rewrite
    expression: String,

    /// Device name used to decide whether to rewrite, e.g. "NVIDIA A100"
    #[arg(long)]
    device: Option<String>,

    /// Device backend, e.g. "cuda" or "cpu"
    #[arg(long, default_value = "")]
    backend: String,

    /// Rewrite regardless of the device classification
    #[arg(long)]
    force: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    // Parse the expression string into an AST using evalexpr
    let tree = build_operator_tree(&args.expression)?;
    let node = build_node(&tree)?;

    let apply = rewrite_enabled(args, &RewriteConfig::from_env());
    debug!("rewrite enabled: {apply}");

    println!("{} {}", "input:".cyan(), node);
    if apply {
        println!(
            "{} {} ({} power operation(s) expanded)",
            "output:".cyan(),
            transform_power_ops(&node),
            count_power_ops(&node)
        );
    } else {
        println!("{} {} {}", "output:".cyan(), node, "(unchanged)".dimmed());
    }
    Ok(())
}

/// The rewrite runs exactly when the gate says so.
fn rewrite_enabled(args: &Args, config: &RewriteConfig) -> bool {
    let force = args.force || config.force_gpu_transform;
    let device = args
        .device
        .as_ref()
        .map(|name| DeviceDescriptor::new(name.as_str(), args.backend.as_str()));
    should_apply_gpu_transform(device.as_ref(), force)
}
