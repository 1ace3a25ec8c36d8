use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::{json, Value as Json};

use ogm_backend::{read_marker, BackendConfig, BackendKind, GraphBackend, KvBackend};
use ogm_import::{replay, GraphImportHandler, ImportSummary};
use ogm_store::{Mapping, PersistentStore, StoreOptions, StorePipeline, StoreValue};
use ogm_types::{Feature, FeatureDescriptor, Id};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Import(args) => cmd_import(args, &format),
        Command::Stats(args) => cmd_stats(args, &format),
        Command::Inspect(args) => cmd_inspect(args, &format),
        Command::Copy(args) => cmd_copy(args),
    }
}

fn print_json(value: &Json) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn backend_kind(dir: &Path) -> anyhow::Result<BackendKind> {
    match read_marker(dir)? {
        Some(marker) => Ok(marker.backend),
        None => bail!("{} is not an ogm store", dir.display()),
    }
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

fn import_options(args: &ImportArgs) -> anyhow::Result<StoreOptions> {
    let mut options = match &args.options {
        Some(path) => StoreOptions::load(path)?,
        None => StoreOptions::default(),
    };
    if args.long_list {
        options.mapping = Mapping::LongList;
    }
    if args.autocommit.is_some() {
        options.autocommit = args.autocommit;
    }
    options.validate()?;
    Ok(options)
}

fn import_events(args: &ImportArgs) -> anyhow::Result<(usize, ImportSummary)> {
    let options = import_options(args)?;
    let config = BackendConfig::at(&args.store).transactional(options.autocommit.is_some());
    let mut handler = GraphImportHandler::new(GraphBackend::open(&config)?, &options)?;
    let file = File::open(&args.events).with_context(|| format!("cannot open {}", args.events.display()))?;
    let events = replay(BufReader::new(file), &mut handler)?;
    let summary = handler.summary().clone();
    handler.into_backend().close()?;
    Ok((events, summary))
}

fn cmd_import(args: ImportArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let (events, summary) = import_events(&args)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "events": events, "summary": summary })),
        OutputFormat::Text => {
            println!(
                "{} Imported {} events into {}",
                "✓".green().bold(),
                events.to_string().bold(),
                args.store.display()
            );
            println!("  Elements: {}", summary.elements);
            println!("  Attributes: {}", summary.attributes);
            println!("  References: {}", summary.references);
            if summary.commits > 0 {
                println!("  Commits: {}", summary.commits.to_string().cyan());
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// stats
// ---------------------------------------------------------------------------

fn store_stats(dir: &Path) -> anyhow::Result<Json> {
    let config = BackendConfig::at(dir);
    match backend_kind(dir)? {
        BackendKind::Graph => {
            let backend = GraphBackend::open(&config)?;
            let graph = backend.graph()?;
            let classes: Vec<Json> = backend
                .classes()?
                .into_iter()
                .map(|(class, count)| json!({ "class": class.to_string(), "instances": count }))
                .collect();
            Ok(json!({
                "backend": "graph",
                "nodes": graph.node_count(),
                "edges": graph.edge_count(),
                "classes": classes,
            }))
        }
        BackendKind::Map => {
            let kv = KvBackend::open(&config)?;
            Ok(json!({ "backend": "map", "elements": kv.element_count() }))
        }
    }
}

fn cmd_stats(args: StatsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let stats = store_stats(&args.store)?;
    if let OutputFormat::Json = format {
        return print_json(&stats);
    }
    println!("Store {} ({})", args.store.display().to_string().bold(), stats["backend"].as_str().unwrap_or("?").cyan());
    if let Some(elements) = stats["elements"].as_u64() {
        println!("  Elements: {elements}");
    }
    if let (Some(nodes), Some(edges)) = (stats["nodes"].as_u64(), stats["edges"].as_u64()) {
        println!("  Nodes: {nodes}, edges: {edges}");
    }
    for class in stats["classes"].as_array().into_iter().flatten() {
        println!(
            "  {} {}",
            class["class"].as_str().unwrap_or("?").yellow(),
            class["instances"]
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

fn open_store(dir: &Path, long_list: bool) -> anyhow::Result<StorePipeline> {
    let kind = backend_kind(dir)?;
    let config = BackendConfig::at(dir);
    let mut options = StoreOptions::default();
    if long_list {
        options.mapping = Mapping::LongList;
    }
    Ok(match kind {
        BackendKind::Graph => options.open_graph(GraphBackend::open(&config)?)?,
        BackendKind::Map => options.open_map(KvBackend::open(&config)?)?,
    })
}

fn describe(value: &StoreValue) -> String {
    match value {
        StoreValue::Attribute(v) => v.to_string(),
        StoreValue::Object(o) => format!("-> {}", o.id()),
    }
}

fn inspect_element(args: &InspectArgs) -> anyhow::Result<Json> {
    let mut store = open_store(&args.store, args.long_list)?;
    let id = Id::new(args.id.clone())?;
    let Some(object) = store.object(&id)? else {
        bail!("no element {id} in {}", args.store.display());
    };
    let container = store.container(&object)?.map(|c| c.id().to_string());
    let containing_feature = store.containing_feature(&object)?;
    let mut out = json!({
        "id": id.to_string(),
        "class": object.class().to_string(),
        "container": container,
        "containing_feature": containing_feature,
    });
    if let Some(name) = &args.feature {
        let feature = Feature::try_from(FeatureDescriptor {
            name: name.clone(),
            kind: args.kind.clone(),
            many: args.many,
            containment: args.containment,
        })?;
        let values: Vec<String> = store.to_array(&object, &feature)?.iter().map(describe).collect();
        out["feature"] = json!({ "name": name, "values": values });
    }
    Ok(out)
}

fn cmd_inspect(args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let info = inspect_element(&args)?;
    if let OutputFormat::Json = format {
        return print_json(&info);
    }
    println!("{} {}", args.id.yellow().bold(), info["class"].as_str().unwrap_or("?").cyan());
    match info["container"].as_str() {
        Some(container) => println!(
            "  Container: {} via {}",
            container.yellow(),
            info["containing_feature"].as_str().unwrap_or("?")
        ),
        None => println!("  Container: {}", "none".dimmed()),
    }
    if let Some(feature) = info.get("feature") {
        println!("  {}:", feature["name"].as_str().unwrap_or("?").bold());
        for value in feature["values"].as_array().into_iter().flatten() {
            println!("    {}", value.as_str().unwrap_or("?"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// copy
// ---------------------------------------------------------------------------

fn copy_store(from: &Path, to: &Path) -> anyhow::Result<usize> {
    if backend_kind(from)? != BackendKind::Graph {
        bail!("only graph stores can be copied");
    }
    let source = GraphBackend::open(&BackendConfig::at(from))?;
    let mut target = GraphBackend::open(&BackendConfig::at(to))?;
    source.copy_to(&mut target)?;
    let nodes = target.graph()?.node_count();
    target.close()?;
    Ok(nodes)
}

fn cmd_copy(args: CopyArgs) -> anyhow::Result<()> {
    let nodes = copy_store(&args.from, &args.to)?;
    println!(
        "{} Copied {} nodes from {} to {}",
        "✓".green().bold(),
        nodes.to_string().bold(),
        args.from.display(),
        args.to.display()
    );
    Ok(())
}
