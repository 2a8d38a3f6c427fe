use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Args, Parser, Subcommand};
use oas_toolkit_core::{
    CompileOptions, CompiledLayout, DiffOptions, Document, DocumentUpdate, Flattener,
    LayoutChecks, Operation, OperationFilter, OperationIndex, ReferenceGraph, ResolvedModel,
    Resolver, compile_layout, diff_with, format_path, lint_layout, strip_path_variables,
};
use oas_toolkit_loader::{
    ToolConfig, load_document, load_layout, load_layout_value, save_document,
};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::filter::LevelFilter;

/// Output format for structured results.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum DiffFormat {
    Yaml,
    Json,
    /// One `path: change` line per leaf change.
    Text,
}

#[derive(Debug, Parser)]
#[command(name = "oas-toolkit")]
#[command(version, about = "Diff OpenAPI documents and validate command layouts against them")]
struct Cli {
    /// Log level (error, warn, info, debug, trace). Defaults to the config value, then warn.
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,
    /// Configuration file (default: .oas-toolkit.yml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Structurally diff two API descriptions.
    Diff(DiffArgs),
    /// List the operations of an API description.
    Operations(OperationsArgs),
    /// Show the settable properties of an operation or a named schema.
    Properties(PropertiesArgs),
    /// Layout linting and inspection.
    Layout(LayoutArgs),
    /// Compile a layout against an API description and report every error.
    Check(CheckArgs),
    /// List operations that no command of the layout binds.
    Unreferenced(UnreferencedArgs),
    /// Follow references between components and operations.
    Models(ModelsArgs),
    /// Rewrite an API description and show what changed.
    Update(UpdateArgs),
    /// Reduce an API description to the operations a layout binds.
    Trim(TrimArgs),
}

#[derive(Debug, Args)]
struct DiffArgs {
    /// Original API description.
    original: PathBuf,
    /// Updated API description.
    updated: PathBuf,
    /// Output format.
    #[arg(long, default_value = "yaml")]
    format: DiffFormat,
    /// Compare scalar sequences as sets.
    #[arg(long)]
    scalar_sets: bool,
}

#[derive(Debug, Args)]
struct OperationsArgs {
    /// API description.
    openapi: PathBuf,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["operation", "model"])))]
struct PropertiesArgs {
    /// API description.
    openapi: PathBuf,
    /// Operation id whose parameters and body properties to show.
    #[arg(long)]
    operation: Option<String>,
    /// Schema name (or `#/components/schemas/...` reference) to flatten.
    #[arg(long)]
    model: Option<String>,
    /// Output format.
    #[arg(long, default_value = "yaml")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct LayoutArgs {
    #[command(subcommand)]
    operation: LayoutOperation,
}

#[derive(Debug, Subcommand)]
enum LayoutOperation {
    /// Lint a layout file without an API description.
    Check(LayoutCheckArgs),
    /// Compile a layout and print the command tree.
    Tree(LayoutTreeArgs),
}

#[derive(Debug, Args)]
struct LayoutCheckArgs {
    /// Layout file.
    layout: PathBuf,
    /// Root command id.
    #[arg(long)]
    start: Option<String>,
    /// Skip the undefined/unreferenced command check.
    #[arg(long)]
    no_references: bool,
    /// Skip the command ordering check.
    #[arg(long)]
    no_sub_order: bool,
    /// Skip the missing property check.
    #[arg(long)]
    no_missing_props: bool,
    /// Skip the duplicate entry name check.
    #[arg(long)]
    no_op_dups: bool,
    /// Skip the entry ordering check.
    #[arg(long)]
    no_op_order: bool,
    /// Skip the pagination option check.
    #[arg(long)]
    no_pagination: bool,
}

impl LayoutCheckArgs {
    fn apply(&self, mut checks: LayoutChecks) -> LayoutChecks {
        checks.references &= !self.no_references;
        checks.sub_order &= !self.no_sub_order;
        checks.missing_props &= !self.no_missing_props;
        checks.op_dups &= !self.no_op_dups;
        checks.op_order &= !self.no_op_order;
        checks.pagination &= !self.no_pagination;
        checks
    }
}

#[derive(Debug, Args)]
struct LayoutTreeArgs {
    /// Layout file.
    layout: PathBuf,
    /// API description.
    openapi: PathBuf,
    /// Root command id.
    #[arg(long)]
    start: Option<String>,
    /// Output format.
    #[arg(long, default_value = "yaml")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Layout file.
    layout: PathBuf,
    /// API description.
    openapi: PathBuf,
    /// Root command id.
    #[arg(long)]
    start: Option<String>,
}

#[derive(Debug, Args)]
struct UnreferencedArgs {
    /// Layout file.
    layout: PathBuf,
    /// API description.
    openapi: PathBuf,
    /// Root command id.
    #[arg(long)]
    start: Option<String>,
    /// Group by the full path template instead of the path without variables.
    #[arg(long)]
    full_path: bool,
}

#[derive(Debug, Args)]
struct ModelsArgs {
    #[command(subcommand)]
    operation: ModelsOperation,
}

#[derive(Debug, Subcommand)]
enum ModelsOperation {
    /// Components a component uses, directly or indirectly.
    Uses(ModelArgs),
    /// Components that use a component, directly or indirectly.
    UsedBy(ModelArgs),
    /// Operations that use a component.
    Ops(ModelArgs),
    /// Components an operation uses.
    Operation(OperationModelsArgs),
    /// Components no operation uses.
    Unused(OperationsArgs),
}

#[derive(Debug, Args)]
struct ModelArgs {
    /// API description.
    openapi: PathBuf,
    /// Component name (`Pet`) or key (`schemas/Pet`).
    model: String,
}

#[derive(Debug, Args)]
struct OperationModelsArgs {
    /// API description.
    openapi: PathBuf,
    /// Operation id.
    operation: String,
}

/// Rewrites shared by `update` and `trim`.
#[derive(Debug, Args)]
struct RewriteArgs {
    /// Remove every mapping key with this name (repeatable).
    #[arg(long = "remove", value_name = "PROPERTY")]
    remove_properties: Vec<String>,
    /// Write the result here.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// API description.
    openapi: PathBuf,
    #[command(flatten)]
    rewrite: RewriteArgs,
    /// Keep only these operations (repeatable).
    #[arg(long = "allow-op", value_name = "ID", conflicts_with = "remove_operations")]
    allow_operations: Vec<String>,
    /// Remove these operations (repeatable).
    #[arg(long = "remove-op", value_name = "ID")]
    remove_operations: Vec<String>,
    /// Remove operation tags and the top-level tag list.
    #[arg(long)]
    remove_tags: bool,
    /// Drop nullable properties from `required` lists.
    #[arg(long)]
    nullable_not_required: bool,
    /// Format of the change report.
    #[arg(long, default_value = "text")]
    format: DiffFormat,
}

#[derive(Debug, Args)]
struct TrimArgs {
    /// Layout file.
    layout: PathBuf,
    /// API description.
    openapi: PathBuf,
    /// Root command id.
    #[arg(long)]
    start: Option<String>,
    #[command(flatten)]
    rewrite: RewriteArgs,
    /// Keep operation tags.
    #[arg(long)]
    keep_tags: bool,
    /// Keep nullable properties in `required` lists.
    #[arg(long)]
    keep_nullable_required: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = ToolConfig::load_or_default(cli.config.as_deref())
        .map_err(|err| err.to_string())
        .and_then(|config| {
            init_logging(cli.log_level, &config)?;
            match cli.command {
                Command::Diff(args) => run_diff(args, &config),
                Command::Operations(args) => run_operations(args),
                Command::Properties(args) => run_properties(args),
                Command::Layout(args) => match args.operation {
                    LayoutOperation::Check(args) => run_layout_check(args, &config),
                    LayoutOperation::Tree(args) => run_layout_tree(args, &config),
                },
                Command::Check(args) => run_check(args, &config),
                Command::Unreferenced(args) => run_unreferenced(args, &config),
                Command::Models(args) => run_models(args.operation),
                Command::Update(args) => run_update(args, &config),
                Command::Trim(args) => run_trim(args, &config),
            }
        });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(flag: Option<LevelFilter>, config: &ToolConfig) -> Result<(), String> {
    let level = match (flag, config.log_level.as_deref()) {
        (Some(level), _) => level,
        (None, Some(name)) => name
            .parse::<LevelFilter>()
            .map_err(|err| format!("Invalid log_level '{name}' in configuration: {err}"))?,
        (None, None) => LevelFilter::WARN,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
    Ok(())
}

fn run_diff(args: DiffArgs, config: &ToolConfig) -> Result<(), String> {
    let original = load_document(&args.original).map_err(|e| e.to_string())?;
    let updated = load_document(&args.updated).map_err(|e| e.to_string())?;

    let mut options = config.diff;
    options.scalar_sets |= args.scalar_sets;
    print_diff(&original, &updated, &options, args.format)
}

fn print_diff(
    original: &Document,
    updated: &Document,
    options: &DiffOptions,
    format: DiffFormat,
) -> Result<(), String> {
    let report = diff_with(original, updated, options);
    debug!(changes = report.change_count(), "diff complete");

    match format {
        DiffFormat::Text => {
            for (path, change) in report.changes() {
                println!("{}: {change}", format_path(&path));
            }
        }
        DiffFormat::Yaml => print!("{}", render(&report, CliOutputFormat::Yaml)?),
        DiffFormat::Json => println!("{}", render(&report, CliOutputFormat::Json)?),
    }
    Ok(())
}

fn run_operations(args: OperationsArgs) -> Result<(), String> {
    let document = load_document(&args.openapi).map_err(|e| e.to_string())?;
    let index = OperationIndex::build(&document);
    for problem in index.problems() {
        warn!(%problem, "skipped or inconsistent operation");
    }

    for operation in index.iter() {
        println!(
            "{}\t{}\t{}",
            operation.id,
            operation.method.to_uppercase(),
            operation.path
        );
    }
    Ok(())
}

fn run_properties(args: PropertiesArgs) -> Result<(), String> {
    let document = load_document(&args.openapi).map_err(|e| e.to_string())?;

    if let Some(id) = &args.operation {
        let model = ResolvedModel::build(&document);
        let settable = model
            .settable(id)
            .ok_or_else(|| format!("Unknown operation id '{id}'"))?;
        print_output(settable, args.format)?;
    } else if let Some(name) = &args.model {
        let reference = document
            .find_schema(name)
            .ok_or_else(|| format!("Unknown schema '{name}'"))?;
        let mut resolver = Resolver::new(&document);
        let properties = Flattener::default().flatten_ref(&mut resolver, &reference);
        for problem in resolver.problems() {
            warn!(%problem, "schema problem");
        }
        print_output(&properties, args.format)?;
    }
    Ok(())
}

fn run_layout_check(args: LayoutCheckArgs, config: &ToolConfig) -> Result<(), String> {
    let raw = load_layout_value(&args.layout).map_err(|e| e.to_string())?;
    let start = args.start.as_deref().unwrap_or(&config.layout.start);
    let checks = args.apply(config.layout.checks);

    let issues = lint_layout(&raw, start, &checks);
    for issue in &issues {
        println!("{issue}");
    }

    if issues.is_empty() {
        println!("Layout '{}' passed all checks.", args.layout.display());
        Ok(())
    } else {
        Err(format!("{} layout issue(s) found", issues.len()))
    }
}

fn run_layout_tree(args: LayoutTreeArgs, config: &ToolConfig) -> Result<(), String> {
    let (compiled, _) = compile(&args.layout, &args.openapi, args.start.as_deref(), config)?;
    print_output(&compiled, args.format)
}

fn run_check(args: CheckArgs, config: &ToolConfig) -> Result<(), String> {
    let (compiled, _) = compile(&args.layout, &args.openapi, args.start.as_deref(), config)?;
    for warning in &compiled.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "Layout '{}' is valid: {} operation(s) bound, {} warning(s).",
        args.layout.display(),
        compiled.tree.operation_ids().len(),
        compiled.warnings.len()
    );
    Ok(())
}

fn run_unreferenced(args: UnreferencedArgs, config: &ToolConfig) -> Result<(), String> {
    let (compiled, model) = compile(&args.layout, &args.openapi, args.start.as_deref(), config)?;
    let unreferenced = compiled.tree.unreferenced(model.index());

    let mut groups: BTreeMap<String, Vec<&Operation>> = BTreeMap::new();
    for operation in unreferenced {
        let key = if args.full_path {
            operation.path.clone()
        } else {
            strip_path_variables(&operation.path)
        };
        groups.entry(key).or_default().push(operation);
    }

    for (path, operations) in &groups {
        println!("{path}");
        for operation in operations {
            println!(
                "    {}\t{}\t{}",
                operation.id,
                operation.method.to_uppercase(),
                operation.path
            );
        }
    }
    Ok(())
}

fn run_models(operation: ModelsOperation) -> Result<(), String> {
    let lines: Vec<String> = match operation {
        ModelsOperation::Uses(args) => {
            let (graph, key) = component(&args)?;
            graph.uses(&key).into_iter().collect()
        }
        ModelsOperation::UsedBy(args) => {
            let (graph, key) = component(&args)?;
            graph.used_by(&key).into_iter().collect()
        }
        ModelsOperation::Ops(args) => {
            let (graph, key) = component(&args)?;
            graph
                .operations_using(&key)
                .into_iter()
                .map(str::to_string)
                .collect()
        }
        ModelsOperation::Operation(args) => {
            let graph = reference_graph(&args.openapi)?;
            graph
                .operation_models(&args.operation)
                .ok_or_else(|| format!("Unknown operation id '{}'", args.operation))?
                .into_iter()
                .collect()
        }
        ModelsOperation::Unused(args) => {
            let graph = reference_graph(&args.openapi)?;
            graph.unreachable().into_iter().map(str::to_string).collect()
        }
    };

    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn reference_graph(openapi: &Path) -> Result<ReferenceGraph, String> {
    let document = load_document(openapi).map_err(|e| e.to_string())?;
    Ok(ReferenceGraph::build(&document))
}

/// Builds the graph and resolves the named component to its full key.
fn component(args: &ModelArgs) -> Result<(ReferenceGraph, String), String> {
    let graph = reference_graph(&args.openapi)?;
    let key = graph
        .full_name(&args.model)
        .ok_or_else(|| format!("Unknown or ambiguous component '{}'", args.model))?
        .to_string();
    Ok((graph, key))
}

fn run_update(args: UpdateArgs, config: &ToolConfig) -> Result<(), String> {
    let original = load_document(&args.openapi).map_err(|e| e.to_string())?;

    let operations = if !args.allow_operations.is_empty() {
        Some(OperationFilter::Allow(args.allow_operations.into_iter().collect()))
    } else if !args.remove_operations.is_empty() {
        Some(OperationFilter::Remove(args.remove_operations.into_iter().collect()))
    } else {
        None
    };
    let update = DocumentUpdate {
        remove_tags: args.remove_tags,
        remove_properties: args.rewrite.remove_properties,
        nullable_not_required: args.nullable_not_required,
        operations,
    };
    if update.is_empty() {
        warn!("no rewrite requested");
    }

    let updated = update.apply(&original).map_err(|e| e.to_string())?;
    if let Some(output) = &args.rewrite.output {
        save_document(output, &updated).map_err(|e| e.to_string())?;
        eprintln!("Wrote {}", output.display());
    }
    print_diff(&original, &updated, &config.diff, args.format)
}

fn run_trim(args: TrimArgs, config: &ToolConfig) -> Result<(), String> {
    let (compiled, _) = compile(&args.layout, &args.openapi, args.start.as_deref(), config)?;
    let original = load_document(&args.openapi).map_err(|e| e.to_string())?;

    let keep: BTreeSet<String> = compiled
        .tree
        .operation_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    let update = DocumentUpdate {
        remove_tags: !args.keep_tags,
        remove_properties: args.rewrite.remove_properties,
        nullable_not_required: !args.keep_nullable_required,
        operations: Some(OperationFilter::Allow(keep)),
    };
    let trimmed = update.apply(&original).map_err(|e| e.to_string())?;

    let output = args.rewrite.output.as_deref().unwrap_or(&args.openapi);
    save_document(output, &trimmed).map_err(|e| e.to_string())?;
    println!(
        "Wrote {} with {} operation(s).",
        output.display(),
        OperationIndex::build(&trimmed).len()
    );
    Ok(())
}

/// Loads both inputs and compiles the layout, turning every fatal layout
/// error into one multi-line error.
fn compile(
    layout: &Path,
    openapi: &Path,
    start: Option<&str>,
    config: &ToolConfig,
) -> Result<(CompiledLayout, ResolvedModel), String> {
    let document = load_document(openapi).map_err(|e| e.to_string())?;
    let layout = load_layout(layout).map_err(|e| e.to_string())?;
    let model = ResolvedModel::build(&document);
    for problem in model.problems() {
        warn!(%problem, "schema problem");
    }

    let options = CompileOptions::with_start(start.unwrap_or(&config.layout.start));
    let compiled = compile_layout(&layout, &model, &options).map_err(|errors| {
        format!(
            "{} layout error(s):\n{}",
            errors.len(),
            errors
                .iter()
                .map(|e| format!("  {e}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;
    Ok((compiled, model))
}

fn print_output<T: Serialize + ?Sized>(value: &T, format: CliOutputFormat) -> Result<(), String> {
    let raw = render(value, format)?;
    match format {
        CliOutputFormat::Yaml => print!("{raw}"),
        CliOutputFormat::Json => println!("{raw}"),
    }
    Ok(())
}

fn render<T: Serialize + ?Sized>(value: &T, format: CliOutputFormat) -> Result<String, String> {
    match format {
        CliOutputFormat::Yaml => serde_yaml::to_string(value)
            .map_err(|err| format!("Failed to serialize YAML output: {err}")),
        CliOutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|err| format!("Failed to serialize JSON output: {err}")),
    }
}
