//! Binary entry point for sluice.
//!
//! This binary provides the CLI interface for the sluice import/export
//! engine: streaming file imports into a document store, queried
//! exports back out, and local template management.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow option_if_let_else for environment variable fallback chains
#![allow(clippy::option_if_let_else)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use sluice::config::SluiceConfig;
use sluice::models::{FileKind, Template, TemplateFilter};
use sluice::observability::{self, LoggingConfig};
use sluice::storage::{
    BulkheadStore, BulkheadStoreConfig, DocumentStore, HttpDocumentStore, QuerySource,
    SqliteTemplateStore, TemplateStore,
};
use sluice::{ExportFormat, ExportService, ExportSpec, ImportOptions, ImportService};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Sluice - a streaming import/export engine for document stores.
#[derive(Parser)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import a file into the document store.
    Import {
        /// Input file path, or `-` to read from stdin.
        file: PathBuf,

        /// Id of the import template to apply.
        #[arg(short, long)]
        template: i64,

        /// Input format: csv or json (default: from file extension).
        #[arg(short, long)]
        kind: Option<String>,

        /// Replace stored documents instead of merging fields into them.
        #[arg(long)]
        replace: bool,

        /// The CSV input has no header row.
        #[arg(long)]
        no_header: bool,

        /// The JSON input is newline-separated objects, not an array.
        #[arg(long)]
        ndjson: bool,

        /// Pad declared columns missing from JSON records with null
        /// instead of rejecting the record.
        #[arg(long)]
        allow_missing_fields: bool,
    },

    /// Export queried documents to a file or stdout.
    Export {
        /// Id of the export template describing table and columns.
        #[arg(short, long)]
        template: i64,

        /// Output file path; writes to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: csv or json.
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Wrap the JSON document array in an object under this key.
        #[arg(long)]
        wrap: Option<String>,

        /// Inline store query as a JSON string.
        #[arg(short, long)]
        query: Option<String>,

        /// Id of a saved query to run instead of an inline one.
        #[arg(long)]
        query_id: Option<i64>,

        /// Number each document with a 1-based rank field.
        #[arg(long)]
        rank: bool,
    },

    /// Manage import/export templates.
    Template {
        /// Template subcommand.
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Manage saved store queries.
    Query {
        /// Query subcommand.
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Infer column types from a sample file.
    Suggest {
        /// Sample file to inspect.
        file: PathBuf,

        /// Input format: csv or json (default: from file extension).
        #[arg(short, long)]
        kind: Option<String>,

        /// Maximum number of records to sample.
        #[arg(short, long, default_value = "100")]
        sample: usize,
    },
}

/// Template subcommands.
#[derive(Subcommand)]
enum TemplateAction {
    /// List saved templates.
    List {
        /// Filter by target store id.
        #[arg(long)]
        store_id: Option<i64>,

        /// Filter by table name.
        #[arg(long)]
        table: Option<String>,

        /// Show only export templates.
        #[arg(long, conflicts_with = "import")]
        export: bool,

        /// Show only import templates.
        #[arg(long)]
        import: bool,
    },

    /// Show one template as JSON.
    Show {
        /// Template id.
        id: i64,
    },

    /// Save a template from a JSON definition file.
    Save {
        /// Path to the definition, or `-` to read from stdin.
        file: PathBuf,
    },

    /// Delete a template.
    Delete {
        /// Template id.
        id: i64,
    },
}

/// Saved query subcommands.
#[derive(Subcommand)]
enum QueryAction {
    /// Save a query body from a JSON file.
    Save {
        /// Path to the query body, or `-` to read from stdin.
        file: PathBuf,
    },

    /// Show one saved query as JSON.
    Show {
        /// Saved query id.
        id: i64,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(&LoggingConfig::from_env(cli.verbose)) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    let result = run_command(cli, config);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: SluiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Import {
            file,
            template,
            kind,
            replace,
            no_header,
            ndjson,
            allow_missing_fields,
        } => cmd_import(
            &config,
            &file,
            template,
            kind,
            replace,
            no_header,
            ndjson,
            allow_missing_fields,
        ),

        Commands::Export {
            template,
            output,
            format,
            wrap,
            query,
            query_id,
            rank,
        } => cmd_export(&config, template, output, format, wrap, query, query_id, rank),

        Commands::Template { action } => cmd_template(&config, action),

        Commands::Query { action } => cmd_query(&config, action),

        Commands::Suggest { file, kind, sample } => cmd_suggest(&file, kind, sample),
    }
}

/// Loads configuration.
fn load_config(path: Option<&str>) -> Result<SluiceConfig, Box<dyn std::error::Error>> {
    // If a path is provided, load from that file
    if let Some(config_path) = path {
        return SluiceConfig::load_from_file(std::path::Path::new(config_path))
            .map_err(std::convert::Into::into);
    }

    // Environment override for config path
    if let Ok(config_path) = std::env::var("SLUICE_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            return SluiceConfig::load_from_file(std::path::Path::new(&config_path))
                .map_err(std::convert::Into::into);
        }
    }

    // Otherwise, load from default location
    Ok(SluiceConfig::load_default())
}

/// Builds the document store stack: HTTP backend behind a bulkhead
/// sized for the flush worker pool plus paging and schema calls.
fn build_store(config: &SluiceConfig) -> Arc<dyn DocumentStore> {
    let bulkhead = BulkheadStoreConfig {
        max_concurrent: config.flush_workers.max(1) + 2,
        ..BulkheadStoreConfig::default()
    };
    Arc::new(BulkheadStore::new(
        HttpDocumentStore::new(config.store.clone()),
        bulkhead,
    ))
}

/// Opens the local template database.
fn open_templates(config: &SluiceConfig) -> sluice::Result<SqliteTemplateStore> {
    SqliteTemplateStore::new(config.templates_db.clone())
}

/// Resolves the input kind from an explicit flag, the ndjson shortcut,
/// or the file extension.
fn detect_kind(
    kind: Option<&str>,
    ndjson: bool,
    file: &Path,
) -> Result<FileKind, Box<dyn std::error::Error>> {
    if let Some(name) = kind {
        return FileKind::parse(name)
            .ok_or_else(|| format!("unknown input kind '{name}' (expected csv or json)").into());
    }
    if ndjson {
        return Ok(FileKind::Json);
    }
    match file.extension().and_then(|e| e.to_str()) {
        Some("json" | "ndjson") => Ok(FileKind::Json),
        _ => Ok(FileKind::Csv),
    }
}

/// Reads a definition file, or stdin when the path is `-`.
fn read_definition(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin().lock(), &mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Import command.
#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn cmd_import(
    config: &SluiceConfig,
    file: &Path,
    template_id: i64,
    kind: Option<String>,
    replace: bool,
    no_header: bool,
    ndjson: bool,
    allow_missing_fields: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let templates = open_templates(config)?;
    let template = templates
        .get(template_id)?
        .ok_or(sluice::Error::TemplateNotFound(template_id))?;

    let kind = detect_kind(kind.as_deref(), ndjson, file)?;
    let options = ImportOptions::new(kind)
        .with_update(!replace)
        .with_csv_header(!no_header)
        .with_newline_separated_json(ndjson)
        .with_require_all_fields(!allow_missing_fields);

    let service = ImportService::new(build_store(config), config.clone());
    let summary = if file == Path::new("-") {
        service.upsert(std::io::stdin(), &template, &options)?
    } else {
        service.upsert_from_file(file, &template, &options)?
    };

    println!("Import complete:");
    println!("  Job: {}", summary.job_id);
    println!("  Table: {}", summary.table_name);
    println!("  Chunks: {}", summary.chunk_count);
    println!("  Records: {}", summary.record_count);

    Ok(())
}

/// Export command.
#[allow(clippy::too_many_arguments)]
fn cmd_export(
    config: &SluiceConfig,
    template_id: i64,
    output: Option<PathBuf>,
    format: String,
    wrap: Option<String>,
    query: Option<String>,
    query_id: Option<i64>,
    rank: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let templates = open_templates(config)?;
    let template = templates
        .get(template_id)?
        .ok_or(sluice::Error::TemplateNotFound(template_id))?;
    if !template.export {
        return Err(format!("template {template_id} is not an export template").into());
    }

    let Some(mut format) = ExportFormat::parse(&format) else {
        return Err(format!("unknown export format '{format}' (expected csv or json)").into());
    };
    if let Some(key) = wrap {
        if format != ExportFormat::Json {
            return Err("--wrap only applies to json exports".into());
        }
        format = ExportFormat::JsonObject { key };
    }

    let mut spec = ExportSpec::from_template(&template, format).with_rank(rank);
    if let Some(text) = query {
        let body: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("invalid query JSON: {e}"))?;
        spec = spec.with_query(body);
    }
    if let Some(id) = query_id {
        spec = spec.with_query_id(id);
    }
    if spec.query.is_none() && spec.query_id.is_none() {
        spec = spec.with_query(serde_json::json!({ "match_all": {} }));
    }

    let queries: Arc<dyn QuerySource> = Arc::new(templates);
    let service = ExportService::new(build_store(config), queries, config.clone());

    match output {
        Some(path) => {
            let summary = service.export_to_file(&path, &spec)?;
            println!(
                "Exported {} documents to {}",
                summary.documents,
                path.display()
            );
        },
        None => {
            let summary = service.export(&spec, std::io::stdout().lock())?;
            // The documents went to stdout, so the summary goes to stderr.
            eprintln!("Exported {} documents", summary.documents);
        },
    }

    Ok(())
}

/// Template command.
fn cmd_template(
    config: &SluiceConfig,
    action: TemplateAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let templates = open_templates(config)?;

    match action {
        TemplateAction::List {
            store_id,
            table,
            export,
            import,
        } => {
            let mut filter = TemplateFilter::new();
            if let Some(id) = store_id {
                filter = filter.with_store_id(id);
            }
            if let Some(name) = table {
                filter = filter.with_table_name(name);
            }
            if export {
                filter = filter.with_export(true);
            } else if import {
                filter = filter.with_export(false);
            }

            let found = templates.list(&filter)?;
            if found.is_empty() {
                println!("No templates found");
                return Ok(());
            }
            println!(
                "{:>5}  {:<24}  {:<20}  {:<9}  {}",
                "ID", "NAME", "TABLE", "DIRECTION", "COLUMNS"
            );
            for template in &found {
                let direction = if template.export { "export" } else { "import" };
                println!(
                    "{:>5}  {:<24}  {:<20}  {:<9}  {}",
                    template.id.unwrap_or_default(),
                    template.name,
                    template.table_name,
                    direction,
                    template.column_types.len()
                );
            }
        },

        TemplateAction::Show { id } => {
            let template = templates
                .get(id)?
                .ok_or(sluice::Error::TemplateNotFound(id))?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        },

        TemplateAction::Save { file } => {
            let text = read_definition(&file)?;
            let template: Template = serde_json::from_str(&text)
                .map_err(|e| format!("invalid template definition: {e}"))?;
            let saved = templates.save(&template)?;
            println!(
                "Saved template {} ({})",
                saved.id.unwrap_or_default(),
                saved.name
            );
        },

        TemplateAction::Delete { id } => {
            if !templates.delete(id)? {
                return Err(sluice::Error::TemplateNotFound(id).into());
            }
            println!("Deleted template {id}");
        },
    }

    Ok(())
}

/// Saved query command.
fn cmd_query(config: &SluiceConfig, action: QueryAction) -> Result<(), Box<dyn std::error::Error>> {
    let templates = open_templates(config)?;

    match action {
        QueryAction::Save { file } => {
            let text = read_definition(&file)?;
            let body: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| format!("invalid query JSON: {e}"))?;
            if !body.is_object() {
                return Err("a saved query must be a JSON object".into());
            }
            let id = templates.save_query(&body)?;
            println!("Saved query {id}");
        },

        QueryAction::Show { id } => {
            let body = templates
                .query_for(id)?
                .ok_or_else(|| format!("no saved query with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        },
    }

    Ok(())
}

/// Suggest command.
fn cmd_suggest(
    file: &Path,
    kind: Option<String>,
    sample: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = detect_kind(kind.as_deref(), false, file)?;
    let sample = sample.max(1);

    let (names, columns) = match kind {
        FileKind::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(file)?;
            let names: Vec<String> = reader
                .headers()?
                .iter()
                .map(std::string::ToString::to_string)
                .collect();
            let mut rows: Vec<Vec<String>> = Vec::new();
            for record in reader.records() {
                let record = record?;
                rows.push(record.iter().map(std::string::ToString::to_string).collect());
                if rows.len() >= sample {
                    break;
                }
            }
            let columns = sluice::schema::infer::suggest_csv_columns(&names, &rows);
            (names, columns)
        },
        FileKind::Json => {
            let text = std::fs::read_to_string(file)?;
            let mut docs: Vec<sluice::models::Document> = if text.trim_start().starts_with('[') {
                serde_json::from_str(&text).map_err(|e| format!("invalid JSON sample: {e}"))?
            } else {
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(sample)
                    .map(serde_json::from_str)
                    .collect::<Result<_, _>>()
                    .map_err(|e| format!("invalid JSON sample: {e}"))?
            };
            docs.truncate(sample);
            let columns = sluice::schema::infer::suggest_json_columns(&docs);
            let names = columns.keys().cloned().collect();
            (names, columns)
        },
    };

    if columns.is_empty() {
        return Err("no columns could be inferred from the sample".into());
    }

    let table = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("imported")
        .to_string();
    let first_column = names.first().cloned().unwrap_or_default();
    let skeleton = serde_json::json!({
        "name": table,
        "store_id": 0,
        "store_name": "",
        "table_name": table,
        "original_names": names,
        "column_types": columns,
        "primary_keys": [first_column],
    });
    println!("{}", serde_json::to_string_pretty(&skeleton)?);

    Ok(())
}
