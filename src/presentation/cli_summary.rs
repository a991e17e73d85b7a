use crate::application::controller::UploadOutcome;
use crate::application::monitoring::PerfReport;
use crate::application::repository::{BackendKind, ImportOutcome};
use crate::domain::fingerprint::fingerprint;
use crate::domain::product::ProductRecord;
use crate::presentation::card::CardView;
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ProductRow {
    id: String,
    product: String,
    price: String,
    was: String,
    deal: String,
    video: String,
}

#[derive(Tabled)]
struct StatusRow {
    metric: String,
    value: String,
}

const TITLE_WIDTH: usize = 48;

pub fn print_catalog(products: &[ProductRecord]) {
    println!();
    println!("{}", "STOREFRONT CATALOG".bold().cyan());

    if products.is_empty() {
        println!("{}", "No products yet. Upload a spreadsheet to get started.".italic());
        println!();
        return;
    }

    let rows: Vec<ProductRow> = products
        .iter()
        .map(CardView::from_record)
        .map(|card| ProductRow {
            id: card.id.bold().to_string(),
            product: truncate(&card.title, TITLE_WIDTH),
            price: card
                .price
                .as_ref()
                .map(|p| p.green().to_string())
                .unwrap_or_else(|| "N/A".dimmed().to_string()),
            was: card
                .was_price
                .as_ref()
                .map(|p| p.dimmed().strikethrough().to_string())
                .unwrap_or_default(),
            deal: card
                .discount_label
                .as_ref()
                .map(|d| d.red().bold().to_string())
                .unwrap_or_default(),
            video: if card.has_video() { "▶".to_string() } else { String::new() },
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!("  {} product(s)", products.len().to_string().bold());
    println!();
}

pub fn print_status(kind: BackendKind, products: &[ProductRecord]) {
    let with_video = products.iter().filter(|p| p.has_video()).count();
    let rows = vec![
        StatusRow {
            metric: "Backend".into(),
            value: kind.to_string().cyan().to_string(),
        },
        StatusRow {
            metric: "Products".into(),
            value: products.len().to_string().bold().to_string(),
        },
        StatusRow {
            metric: "With video".into(),
            value: with_video.to_string(),
        },
        StatusRow {
            metric: "Fingerprint".into(),
            value: fingerprint(products).short().bright_yellow().to_string(),
        },
    ];
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Print the outcome of an upload. Returns `true` if anything was added.
pub fn print_upload(outcome: &UploadOutcome) -> bool {
    match outcome {
        UploadOutcome::Empty => {
            println!("{}", "The spreadsheet has no data rows.".yellow());
            false
        }
        UploadOutcome::MissingColumns(missing) => {
            println!("{}", "Upload rejected: missing required columns".bold().red());
            for column in missing {
                println!("  • {}", column.red());
            }
            false
        }
        UploadOutcome::NoNewProducts => {
            println!("{}", "✓ Every product is already in the catalog.".green());
            false
        }
        UploadOutcome::Added { count } => {
            println!(
                "{} {} new product(s) added.",
                "✓".bold().green(),
                count.to_string().bold()
            );
            true
        }
    }
}

pub fn print_import(outcome: &ImportOutcome) {
    match outcome {
        ImportOutcome::Replaced { count } => println!(
            "{} catalog replaced with {} product(s).",
            "✓".bold().green(),
            count.to_string().bold()
        ),
        ImportOutcome::NotAnArray => {
            println!("{}", "Import file must hold a JSON array of products.".yellow())
        }
        ImportOutcome::NotSaved(save) => {
            println!("{} {:?}", "Import was not saved:".bold().red(), save)
        }
    }
}

// ─── Performance summary ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    backend: String,
    products: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// Print a timing table of every backend call to stdout.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    println!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: if t.success {
                t.operation.dimmed().to_string()
            } else {
                t.operation.red().to_string()
            },
            backend: t.backend.bold().to_string(),
            products: t.products.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();

    println!("{table}");
    println!(
        "  Total: {} call(s)  ·  {} failed  ·  {} ms elapsed",
        report.timings.len().to_string().bold(),
        report.failures.to_string().bold(),
        format_duration(report.total_ms),
    );
    println!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{head}…")
}
