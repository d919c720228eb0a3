//! Vortex CLI - Reactive Node-based Image Processing
//!
//! A small front end over the engine: it lists the available node
//! variants and runs a fixed source -> blur -> brightness -> sepia ->
//! output chain over one image.

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use vortex::prelude::*;

const PROCESS_TIMEOUT: Duration = Duration::from_secs(120);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("vortex");

    if args.len() < 2 {
        print_usage(program);
        return;
    }

    let result = match args[1].as_str() {
        "list" => {
            list_variants();
            Ok(())
        }
        "info" => match args.get(2) {
            Some(id) => variant_info(id, args.iter().any(|a| a == "--json")),
            None => Err(anyhow!("please specify a variant ID")),
        },
        "process" => match (args.get(2), args.get(3)) {
            (Some(input), Some(output)) => process_image(input, output, &args[4..]),
            _ => Err(anyhow!(
                "usage: {} process <input> <output> [--blur <method>] [--brightness <amount>] [--sepia [intensity]]",
                program
            )),
        },
        "help" | "--help" | "-h" => {
            print_usage(program);
            Ok(())
        }
        other => {
            print_usage(program);
            Err(anyhow!("unknown command '{}'", other))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("Vortex v{}", vortex::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                          List all node variants");
    println!("  info <variant> [--json]       Show ports and parameters of a variant");
    println!("  process <in> <out> [options]  Process an image");
    println!("  help                          Show this help message");
    println!();
    println!("Process options:");
    println!("  --blur <method>         {}", BlurMethod::ALL.join(", "));
    println!("  --sigma <value>         Sigma for the gaussian method (default: 2.0)");
    println!("  --brightness <amount>   Add to every channel, -255 to 255");
    println!("  --sepia [intensity]     Sepia toning, 0.0 to 1.0 (default: 1.0)");
}

fn list_variants() {
    let registry = NodeRegistry::with_builtins();

    println!("Available variants ({} total):", registry.len());
    println!();

    for (category, variants) in registry.grouped_by_category() {
        println!("  {}", category.display_name());
        for metadata in variants {
            let mode = if metadata.is_asynchronous() { " [async]" } else { "" };
            println!("      {:<14} {}{}", metadata.id, metadata.description, mode);
        }
        println!();
    }
}

fn variant_info(id: &str, json: bool) -> Result<()> {
    let registry = NodeRegistry::with_builtins();
    let metadata = registry
        .get_metadata(id)
        .ok_or_else(|| anyhow!("unknown variant '{}', try `list`", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(metadata)?);
        return Ok(());
    }

    println!("{} ({})", metadata.name, metadata.id);
    println!("  {}", metadata.description);
    println!("  Category:  {}", metadata.category.display_name());
    println!(
        "  Execution: {}",
        if metadata.is_asynchronous() { "asynchronous" } else { "synchronous" }
    );

    println!();
    println!("Sinks:");
    for port in metadata.sinks() {
        let mut flags = Vec::new();
        if port.optional {
            flags.push("optional".to_string());
        }
        if let Some(default) = &port.default_value {
            flags.push(format!("default {}", default));
        }
        let flags = if flags.is_empty() { String::new() } else { format!(" ({})", flags.join(", ")) };
        println!("  {:<10} {:<8} {}{}", port.name, port.port_type, port.description, flags);
    }

    println!();
    println!("Sources:");
    for port in metadata.sources() {
        println!("  {:<10} {:<8} {}", port.name, port.port_type, port.description);
    }

    if !metadata.parameters.is_empty() {
        println!();
        println!("Parameters:");
        for param in &metadata.parameters {
            println!("  {:<10} = {:<10} {}", param.name, param.default_value, param.description);
        }
    }

    Ok(())
}

/// Options of the `process` command.
#[derive(Debug, Default)]
struct ProcessOptions {
    blur: Option<String>,
    sigma: Option<f64>,
    brightness: Option<f64>,
    sepia: Option<f64>,
}

impl ProcessOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut i = 0;

        while i < args.len() {
            match args[i].as_str() {
                "--blur" => {
                    let value = args.get(i + 1).context("--blur needs a method")?;
                    value.parse::<BlurMethod>().map_err(|e| anyhow!(e))?;
                    options.blur = Some(value.to_ascii_lowercase());
                    i += 1;
                }
                "--sigma" => {
                    let value = args.get(i + 1).context("--sigma needs a value")?;
                    options.sigma = Some(value.parse().with_context(|| format!("invalid sigma '{}'", value))?);
                    i += 1;
                }
                "--brightness" => {
                    let value = args.get(i + 1).context("--brightness needs an amount")?;
                    options.brightness =
                        Some(value.parse().with_context(|| format!("invalid brightness '{}'", value))?);
                    i += 1;
                }
                "--sepia" => {
                    match args.get(i + 1).and_then(|v| v.parse::<f64>().ok()) {
                        Some(intensity) => {
                            options.sepia = Some(intensity);
                            i += 1;
                        }
                        None => options.sepia = Some(1.0),
                    }
                }
                other => bail!("unknown option '{}'", other),
            }
            i += 1;
        }

        Ok(options)
    }
}

fn create(registry: &NodeRegistry, id: &str) -> Result<GraphNode> {
    registry
        .create(id)
        .map(GraphNode::new)
        .ok_or_else(|| anyhow!("variant '{}' is not registered", id))
}

fn process_image(input: &str, output: &str, args: &[String]) -> Result<()> {
    let options = ProcessOptions::parse(args)?;
    let registry = NodeRegistry::with_builtins();
    let mut engine = Engine::new()?;
    engine.subscribe(Box::new(LoggingObserver));

    log::info!("Processing {} -> {}", input, output);

    let source = engine.add_graph_node(create(&registry, "image_source")?.with_parameter("path", input))?;
    let mut chain = vec![(source, "image")];

    if let Some(method) = options.blur {
        let mut node = create(&registry, "blur")?.with_parameter("method", method);
        if let Some(sigma) = options.sigma {
            node = node.with_parameter("sigma", sigma);
        }
        chain.push((engine.add_graph_node(node)?, "result"));
    }

    if let Some(amount) = options.brightness {
        let node = create(&registry, "brightness")?.with_parameter("amount", amount);
        chain.push((engine.add_graph_node(node)?, "result"));
    }

    if let Some(intensity) = options.sepia {
        let node = create(&registry, "sepia")?.with_parameter("intensity", intensity);
        chain.push((engine.add_graph_node(node)?, "result"));
    }

    let sink = engine.add_graph_node(create(&registry, "image_output")?)?;
    chain.push((sink, "preview"));

    for pair in chain.windows(2) {
        let (from, from_port) = pair[0];
        let (to, _) = pair[1];
        engine.connect_ports(from, from_port, to, "image")?;
    }

    if !engine.wait_until_idle(PROCESS_TIMEOUT) {
        bail!("timed out after {:?}", PROCESS_TIMEOUT);
    }

    // Report the first failing node in chain order
    for (node, _) in &chain {
        if let Some(error) = engine.last_error(*node) {
            bail!("{}", error);
        }
    }

    let image = engine
        .cached_output(sink, "preview")
        .and_then(Value::as_image)
        .and_then(ImageValue::get_image)
        .ok_or_else(|| anyhow!("pipeline produced no image"))?;
    image
        .save(output)
        .with_context(|| format!("failed to save {}", output))?;

    let stats = engine.stats();
    log::info!(
        "Done: {} background computes, {} inline, {} discarded",
        stats.dispatched,
        stats.inline,
        stats.discarded
    );
    println!("Saved {} ({}x{})", output, image.width(), image.height());

    Ok(())
}
