use bill_splitter::config::{Config, DEFAULT_CONFIG_PATH};
use bill_splitter::error::WorkflowError;
use bill_splitter::heuristics::numbers::{format_amount, normalize};
use bill_splitter::heuristics::{OrderTextParser, ParsedReceipt, ReceiptTextParser};
use bill_splitter::model::OrderLine;
use bill_splitter::receipt_source::{self, ReceiptContent};
use bill_splitter::session_db::SessionStore;
use bill_splitter::split::{SplitSummary, TipPolicy};
use bill_splitter::workflow;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{Instrument, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bill-splitter")]
#[command(version)]
#[command(about = "Log who ordered what and split the bill from the receipt", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an order, e.g. "Timo en Bart een biertje en pizza"
    Order {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Show what an order text parses to without storing it
    ParseOrder {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Manage the people at the table
    People {
        #[command(subcommand)]
        action: PeopleAction,
    },

    /// Manage order lines
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },

    /// Process a receipt (OCR transcript or text PDF) and split the bill
    Receipt {
        file: PathBuf,

        /// Tip policy: none, 10% or an amount such as 5,00
        #[arg(long)]
        tip: Option<TipPolicy>,
    },

    /// Show what a receipt parses to without touching the session
    ParseReceipt { file: PathBuf },

    /// Split the current orders
    Split {
        #[arg(long)]
        tip: Option<TipPolicy>,
    },

    /// List processed receipts, newest first
    Receipts,

    /// Set the default tip policy in the config file
    Tip { value: String },
}

#[derive(Subcommand)]
enum PeopleAction {
    List,
    Add { name: String },
    Rename { from: String, to: String },
    /// Remove a person and their order lines
    Remove { name: String },
}

#[derive(Subcommand)]
enum OrdersAction {
    List,
    /// Add one to a line's quantity
    Inc { id: i64 },
    /// Take one off a line's quantity; the line goes away at zero
    Dec { id: i64 },
    Remove { id: i64 },
    Clear,
    /// Assign a line to a person, or unassign it when no person is given
    Assign { id: i64, person: Option<String> },
    /// Set a manual unit price, or `none` to clear it
    Price { id: i64, price: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Tip { value } = &cli.command {
        Config::update_default_tip(&cli.config, value)?;
        println!("Default tip set to {value}");
        return Ok(());
    }

    let cfg = Config::load_or_default(&cli.config)?;
    let symbol = cfg.split.currency_symbol.clone();

    match cli.command {
        Commands::ParseOrder { text } => {
            let parser = OrderTextParser::new(cfg.catalog());
            let lines = parser.parse(&text.join(" "), &[]);
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
        Commands::ParseReceipt { file } => {
            let Some(text) = read_receipt(&cfg, &file).await? else {
                return Ok(());
            };
            let parsed = ReceiptTextParser::new()?.parse(&text);
            print_parsed_receipt(&parsed, &symbol);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        command => {
            let db = open_store(&cfg.db_path)?;
            run_session_command(command, &db, &cfg).await?;
        }
    }

    Ok(())
}

fn open_store(db_path: &str) -> Result<SessionStore, Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!(db_path = %db_path, "Opening session database");
    let db = SessionStore::new(db_path)?;

    let (people, orders, receipts) = db.get_counts()?;
    info!(people, orders, receipts, "Session statistics");
    Ok(db)
}

async fn run_session_command(
    command: Commands,
    db: &SessionStore,
    cfg: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let symbol = cfg.split.currency_symbol.as_str();

    match command {
        Commands::Order { text } => {
            let parser = OrderTextParser::new(cfg.catalog());
            let recorded = workflow::record_order(db, &parser, &text.join(" "))?;
            for person in &recorded.new_people {
                println!("New person: {} ({})", person.name, person.color);
            }
            if recorded.lines.is_empty() {
                println!("Nothing recognised as an order.");
            }
            for line in &recorded.lines {
                print_order_line(line, symbol);
            }
        }
        Commands::People { action } => match action {
            PeopleAction::List => {
                for p in db.list_people()? {
                    println!("[{}] {} {} ({})", p.id, p.initial, p.name, p.color);
                }
            }
            PeopleAction::Add { name } => {
                let (person, created) = db.find_or_create_person(&name)?;
                if created {
                    println!("Added {} ({})", person.name, person.color);
                } else {
                    println!("{} is already at the table", person.name);
                }
            }
            PeopleAction::Rename { from, to } => {
                if db.rename_person(&from, &to)? {
                    println!("Renamed {from} to {to}");
                } else {
                    println!("Cannot rename {from} to {to}: no such person, or the name is taken");
                }
            }
            PeopleAction::Remove { name } => match db.remove_person(&name)? {
                Some(orders) => println!("Removed {name} and {orders} order line(s)"),
                None => println!("No person named {name}"),
            },
        },
        Commands::Orders { action } => run_orders_action(action, db, symbol)?,
        Commands::Receipt { file, tip } => {
            let Some(text) = read_receipt(cfg, &file).await? else {
                return Ok(());
            };
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let processed = match workflow::process_receipt(
                db,
                &ReceiptTextParser::new()?,
                &filename,
                &text,
                tip,
                cfg.default_tip()?,
                OffsetDateTime::now_utc(),
            ) {
                Ok(p) => p,
                Err(e) if e.is::<WorkflowError>() => {
                    println!("{e}");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            print_parsed_receipt(&processed.parsed, symbol);
            println!("Prices found for {} order line(s)", processed.updated_count);
            println!("Tip: {}", processed.tip);
            print_summary(&processed.summary, symbol);
        }
        Commands::Split { tip } => {
            let tip = match tip {
                Some(t) => t,
                None => cfg.default_tip()?,
            };
            let summary = workflow::split_bill(db, tip)?;
            println!("Tip: {tip}");
            print_summary(&summary, symbol);
        }
        Commands::Receipts => {
            for r in db.list_receipts()? {
                let total = r
                    .totals
                    .total
                    .map(|t| format_amount(t, symbol))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {}  {} item(s)  total {}  tip {}  [{}]",
                    r.processed_at,
                    r.filename,
                    r.items.len(),
                    total,
                    r.tip_policy,
                    &r.uid[..12.min(r.uid.len())]
                );
            }
        }
        Commands::ParseOrder { .. } | Commands::ParseReceipt { .. } | Commands::Tip { .. } => {}
    }

    Ok(())
}

fn run_orders_action(
    action: OrdersAction,
    db: &SessionStore,
    symbol: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = |found: bool, id: i64, what: &str| {
        if found {
            println!("Order {id} {what}");
        } else {
            println!("No order line {id}");
        }
    };

    match action {
        OrdersAction::List => {
            let orders = db.list_orders()?;
            if orders.is_empty() {
                println!("No orders yet.");
            }
            for line in &orders {
                print_order_line(line, symbol);
            }
        }
        OrdersAction::Inc { id } => match db.adjust_quantity(id, 1)? {
            Some(q) => println!("Order {id} now {q}x"),
            None => println!("No order line {id}"),
        },
        OrdersAction::Dec { id } => match db.adjust_quantity(id, -1)? {
            Some(q) => println!("Order {id} now {q}x"),
            None => println!("Order {id} removed"),
        },
        OrdersAction::Remove { id } => report(db.delete_order(id)?, id, "removed"),
        OrdersAction::Clear => println!("Removed {} order line(s)", db.clear_orders()?),
        OrdersAction::Assign { id, person } => {
            let person = match person.as_deref() {
                Some(name) => Some(db.find_or_create_person(name)?.0.name),
                None => None,
            };
            report(db.assign_order(id, person.as_deref())?, id, "assigned")
        }
        OrdersAction::Price { id, price } => {
            let price = if price.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(normalize(&price)?)
            };
            report(db.set_unit_price(id, price)?, id, "price updated")
        }
    }
    Ok(())
}

/// Load a receipt file on a blocking thread under the configured timeout.
/// Prints why and returns `None` when there is no text to parse.
async fn read_receipt(cfg: &Config, file: &Path) -> Result<Option<String>, Box<dyn std::error::Error>> {
    info!(file = %file.display(), timeout_secs = cfg.extract.timeout_secs, "Reading receipt");
    let content = receipt_source::load_receipt_with_timeout(
        file.to_path_buf(),
        cfg.extract.max_file_bytes,
        cfg.extract.timeout(),
    )
    .instrument(tracing::info_span!("extract", file = %file.display()))
    .await?;

    match content {
        ReceiptContent::Text(text) => Ok(Some(text)),
        ReceiptContent::NeedsOcr => {
            warn!(file = %file.display(), "Receipt has no text layer");
            println!("This receipt needs OCR first. Run it through an OCR engine and pass the transcript.");
            Ok(None)
        }
        ReceiptContent::Error(e) => Err(e.into()),
    }
}

fn print_order_line(line: &OrderLine, symbol: &str) {
    let price = match (line.has_price(), line.effective_price()) {
        (true, Some(p)) => format_amount(p, symbol),
        (false, Some(p)) => format!("~{}", format_amount(p, symbol)),
        _ => "?".to_string(),
    };
    println!(
        "[{}] {:<12} {:<24} {}",
        line.id.map(|id| id.to_string()).unwrap_or_default(),
        line.person_name.as_deref().unwrap_or("(unassigned)"),
        line.description(),
        price
    );
}

fn print_parsed_receipt(parsed: &ParsedReceipt, symbol: &str) {
    let (priced, total) = parsed.coverage();
    println!(
        "Receipt: {total} item(s), {priced} priced, {} line(s) skipped",
        parsed.discarded_lines
    );
    for item in &parsed.items {
        let unit = item
            .unit_price
            .map(|p| format_amount(p, symbol))
            .unwrap_or_else(|| "?".to_string());
        println!("  {}x {:<24} {}", item.quantity, item.label, unit);
    }
    let totals = [
        ("Subtotal", parsed.totals.subtotal),
        ("Tax", parsed.totals.tax),
        ("Tip", parsed.totals.tip),
        ("Total", parsed.totals.total),
    ];
    for (name, value) in totals {
        if let Some(v) = value {
            println!("  {name:<10} {}", format_amount(v, symbol));
        }
    }
}

fn print_summary(summary: &SplitSummary, symbol: &str) {
    for r in &summary.results {
        println!("\n({}) {}", r.initial, r.person_name);
        for charge in &r.line_items {
            println!("    {:<28} {}", charge.description, format_amount(charge.amount, symbol));
        }
        println!("    {:<28} {}", "Subtotal", format_amount(r.subtotal, symbol));
        println!("    {:<28} {}", "Tip & tax", format_amount(r.tip_and_tax, symbol));
        println!("    {:<28} {}", "Total", format_amount(r.total, symbol));
    }

    if !summary.unassigned.is_empty() {
        println!("\nUnassigned:");
        for line in &summary.unassigned {
            println!("    [{}] {}", line.id.unwrap_or_default(), line.description());
        }
    }
    if !summary.unpriced.is_empty() {
        println!("\nNo price yet:");
        for line in &summary.unpriced {
            println!("    [{}] {}", line.id.unwrap_or_default(), line.description());
        }
    }

    println!(
        "\nSubtotal {}  Tip {}  Total {}",
        format_amount(summary.grand_subtotal, symbol),
        format_amount(summary.total_tip, symbol),
        format_amount(summary.grand_total(), symbol)
    );
}
