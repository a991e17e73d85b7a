use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use storefront::presentation::cli_summary::{
    print_catalog, print_import, print_perf_summary, print_status, print_upload,
};
use storefront::{init_tracing, AppConfig, CatalogController, LogLevel, ProductId, ProductRecord};

#[derive(Parser, Debug)]
#[command(
    name = "storefront",
    about = "Storefront: manage an affiliate product catalog from the terminal."
)]
struct Cli {
    #[arg(short, long, default_value = "storefront.toml")]
    config: String,

    /// Debug logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long)]
    quiet: bool,

    /// Print backend call timings when done.
    #[arg(long)]
    timings: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every product.
    List,
    /// Show the active backend and collection summary.
    Status,
    /// Merge the first sheet of a workbook into the catalog.
    Upload { file: PathBuf },
    /// Add one product given as a JSON object.
    Add { json: String },
    /// Remove the product with this id.
    Delete { id: String },
    /// Remove every product.
    Clear,
    /// Write the catalog to catalog-products-export.json (local backend only).
    Export {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Replace the catalog with a previously exported file (local backend only).
    Import { file: PathBuf },
    /// Print the catalog on every change until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(match (cli.verbose, cli.quiet) {
        (true, _) => LogLevel::Debug,
        (_, true) => LogLevel::Error,
        _ => LogLevel::Info,
    });

    let cfg = AppConfig::load(&cli.config)?;
    let catalog = storefront::open(&cfg).await?;

    let result = run(&cli.command, &cfg, &catalog).await;

    if cli.timings {
        print_perf_summary(&catalog.repository().perf_report());
    }
    catalog.shutdown().await;
    result
}

async fn run(command: &Command, cfg: &AppConfig, catalog: &CatalogController) -> Result<()> {
    match command {
        Command::List => print_catalog(&catalog.products()),
        Command::Status => print_status(catalog.repository().kind(), &catalog.products()),
        Command::Upload { file } => {
            let outcome = catalog.upload_file(file).await?;
            print_upload(&outcome);
        }
        Command::Add { json } => {
            let record: ProductRecord =
                serde_json::from_str(json).context("Product must be a JSON object")?;
            if record.id.is_empty() {
                bail!("Product needs a ProductId");
            }
            let id = record.id.clone();
            if catalog.add(record).await? {
                println!("{} added {}", "✓".bold().green(), id.to_string().bold());
            } else {
                println!("{} is already in the catalog.", id.to_string().yellow());
            }
        }
        Command::Delete { id } => {
            catalog.delete(&ProductId::new(id.as_str())).await?;
            println!("{} deleted {}", "✓".bold().green(), id.bold());
        }
        Command::Clear => {
            catalog.clear().await?;
            println!("{}", "✓ Catalog cleared.".green());
        }
        Command::Export { dir } => {
            let dir = dir.clone().unwrap_or_else(|| cfg.export.dir.clone());
            let path = catalog.export(&dir).await?;
            println!("Catalog written to {}", path.display());
        }
        Command::Import { file } => {
            let outcome = catalog.import(file).await?;
            print_import(&outcome);
        }
        Command::Watch => watch(catalog).await?,
    }
    Ok(())
}

async fn watch(catalog: &CatalogController) -> Result<()> {
    let mut view = catalog.watch();
    print_catalog(&view.borrow_and_update().products);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
            changed = view.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                print_catalog(&view.borrow_and_update().products);
            }
        }
    }
}
