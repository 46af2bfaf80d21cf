use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result};
use sheetstore::{Config, Row, RowStore, Value};
use std::path::PathBuf;
use tracing::{Level, warn};

const DEMO_FILE: &str = "example.xlsx";
const DEMO_SHEET: &str = "Sheet1";

#[derive(Parser)]
#[command(name = "sheetstore")]
#[command(about = "SheetStore CLI - Row-oriented CRUD over one sheet of an xlsx workbook")]
#[command(version)]
struct Cli {
    /// Workbook file (overrides the config file)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Sheet to treat as the table (overrides the config file)
    #[arg(short, long, global = true)]
    sheet: Option<String>,

    /// Path to the config file (default: <config dir>/sheetstore/sheetstore.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every row as JSON
    List,

    /// Print the rows matching all filters
    Select {
        /// Filter as COLUMN=TEXT or COLUMN:=JSON (repeatable)
        #[arg(short = 'w', long = "where", value_parser = parse_pair)]
        filters: Vec<(String, Value)>,
    },

    /// Append a row
    Insert {
        /// Cells as COLUMN=TEXT or COLUMN:=JSON
        #[arg(required = true, value_parser = parse_pair)]
        values: Vec<(String, Value)>,
    },

    /// Patch every row matching the filters
    Update {
        /// Filter as COLUMN=TEXT or COLUMN:=JSON (repeatable)
        #[arg(short = 'w', long = "where", value_parser = parse_pair)]
        filters: Vec<(String, Value)>,

        /// New value as COLUMN=TEXT or COLUMN:=JSON (repeatable)
        #[arg(long = "set", required = true, value_parser = parse_pair)]
        patch: Vec<(String, Value)>,
    },

    /// Delete every row matching the filters
    Delete {
        /// Filter as COLUMN=TEXT or COLUMN:=JSON (repeatable)
        #[arg(short = 'w', long = "where", required = true, value_parser = parse_pair)]
        filters: Vec<(String, Value)>,
    },

    /// Add a column to every row, e.g. `Country=Unknown` or `Score:=0`
    AddColumn {
        #[arg(value_parser = parse_pair)]
        column: (String, Value),
    },

    /// Remove a column from every row
    RemoveColumn { name: String },

    /// List the sheets of the workbook
    Sheets,

    /// Check whether a sheet exists
    HasSheet { name: String },

    /// Run every operation once against example.xlsx
    Demo,
}

fn main() -> Result<()> {
    let Cli {
        file,
        sheet,
        config,
        verbose,
        command,
    } = Cli::parse();

    let config = Config::load(config.as_deref())?;
    init_logging(verbose, &config)?;

    let file = file.unwrap_or_else(|| config.file.clone());
    let sheet = sheet.unwrap_or_else(|| config.sheet.clone());
    run(command, || {
        RowStore::open_with(&file, &sheet, config.store_options())
            .with_context(|| format!("Failed to open sheet {} in {}", sheet, file.display()))
    })
}

/// Execute one subcommand, opening the store only for commands that use it
fn run(command: Commands, open_store: impl FnOnce() -> Result<RowStore>) -> Result<()> {
    match command {
        Commands::Demo => run_demo()?,
        Commands::List => print_rows(open_store()?.rows())?,
        Commands::Select { filters } => match open_store()?.select(&to_row(filters)) {
            Ok(rows) => print_rows(&rows)?,
            Err(e) if e.is_not_found() => println!("{}", e.to_string().yellow()),
            Err(e) => return Err(e).context("Failed to select rows"),
        },
        Commands::Insert { values } => {
            open_store()?.insert(to_row(values)).context("Failed to insert row")?;
            println!("{}", "Inserted 1 row".green());
        }
        Commands::Update { filters, patch } => {
            let count = open_store()?
                .update(&to_row(filters), &to_row(patch))
                .context("Failed to update rows")?;
            println!("{}", format!("Updated {} row(s)", count).green());
        }
        Commands::Delete { filters } => {
            let count = open_store()?
                .delete(&to_row(filters))
                .context("Failed to delete rows")?;
            println!("{}", format!("Deleted {} row(s)", count).green());
        }
        Commands::AddColumn { column: (name, default) } => {
            open_store()?.add_column(&name, default).context("Failed to add column")?;
            println!("{}", format!("Added column {}", name).green());
        }
        Commands::RemoveColumn { name } => {
            open_store()?.remove_column(&name).context("Failed to remove column")?;
            println!("{}", format!("Removed column {}", name).green());
        }
        Commands::Sheets => {
            for name in open_store()?.sheet_names().context("Failed to list sheets")? {
                println!("{}", name);
            }
        }
        Commands::HasSheet { name } => {
            if open_store()?.sheet_exists(&name).context("Failed to check sheet")? {
                println!("{}", format!("{} exists", name).green());
            } else {
                println!("{}", format!("{} does not exist", name).yellow());
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, config: &Config) -> Result<()> {
    let level = match verbose {
        0 => config.level()?,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Parse `COLUMN=TEXT` as text or `COLUMN:=JSON` as a typed scalar
fn parse_pair(arg: &str) -> std::result::Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=TEXT or COLUMN:=JSON, got {:?}", arg))?;

    let (key, value) = match key.strip_suffix(':') {
        Some(key) => {
            let json: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| format!("invalid JSON value for {:?}: {}", key, e))?;
            let value =
                Value::from_json(&json).ok_or_else(|| format!("{:?} needs a string, number or boolean", key))?;
            (key, value)
        }
        None => (key, Value::from(raw)),
    };

    if key.is_empty() {
        return Err(format!("missing column name in {:?}", arg));
    }
    Ok((key.to_string(), value))
}

fn to_row(pairs: Vec<(String, Value)>) -> Row {
    pairs.into_iter().collect()
}

fn print_rows(rows: &[Row]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(rows)?);
    Ok(())
}

fn run_demo() -> Result<()> {
    let mut store = RowStore::open(DEMO_FILE, DEMO_SHEET).context("Failed to initialize workbook store")?;

    store
        .insert(Row::from([("ID", "1"), ("Name", "Alice"), ("Age", "25")]))
        .context("Failed to insert data")?;
    println!("{}", "Inserted data successfully!".green());

    match store.select(&Row::from([("Name", "Alice")])) {
        Ok(rows) => println!("Found data: {}", serde_json::to_string(&rows)?),
        Err(e) if e.is_not_found() => warn!(error = %e, "No matching rows found"),
        Err(e) => return Err(e).context("Failed to select data"),
    }

    store
        .update(&Row::from([("Name", "Alice")]), &Row::from([("Age", "26")]))
        .context("Failed to update data")?;
    println!("{}", "Updated data successfully!".green());

    store
        .delete(&Row::from([("ID", "1")]))
        .context("Failed to delete data")?;
    println!("{}", "Deleted data successfully!".green());

    store
        .add_column("Country", "Unknown")
        .context("Failed to add column")?;
    println!("{}", "Added new column successfully!".green());

    store.remove_column("Country").context("Failed to remove column")?;
    println!("{}", "Removed column successfully!".green());

    let sheet_names = store.sheet_names().context("Failed to get sheet names")?;
    println!("Sheet names: {:?}", sheet_names);

    if store.sheet_exists(DEMO_SHEET).context("Failed to check sheet existence")? {
        println!("{} exists!", DEMO_SHEET);
    } else {
        println!("{} does not exist.", DEMO_SHEET);
    }

    Ok(())
}
