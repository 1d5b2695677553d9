use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kpiboard", about = "Retail KPI dashboard CLI")]
struct Cli {
    /// Database path (default: ~/.kpiboard/kpiboard.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import daily records from a JSON file
    Import {
        /// Path to a JSON array of daily records
        file: String,
        /// Store for rows that name none
        #[arg(long)]
        store: Option<String>,
    },
    /// Aggregate a store's indicators over a week, month or year
    Report {
        /// View: week, month or year (default: config default_granularity, else month)
        #[arg(long)]
        view: Option<String>,
        /// Period (e.g. 2024-W23, 2024-06, 2024). Defaults to the current one.
        #[arg(long)]
        period: Option<String>,
        /// Store ID (default: config default_store)
        #[arg(long)]
        store: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },
    /// List the years that have data
    Years {
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List a store's reporting sources
    Sources {
        #[arg(long)]
        store: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => kpiboard::Database::open_at(path).await?,
        None => kpiboard::Database::open().await?,
    };
    let board = kpiboard::KpiBoard::new(db);

    match cli.command {
        Commands::Import { file, store } => {
            let report = board.import_file(&file, store.as_deref()).await?;
            println!("Imported {} records ({} skipped)", report.imported, report.skipped);
            for err in &report.errors {
                println!("  {err}");
            }
        }
        Commands::Report {
            view,
            period,
            store,
            json,
            csv,
        } => {
            let granularity = view
                .as_deref()
                .map(str::parse::<kpiboard::Granularity>)
                .transpose()?;
            let request = kpiboard::ReportRequest {
                granularity,
                parameter: period,
                store,
                today: chrono::Local::now().date_naive(),
            };
            let report = board.report(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if csv {
                print!("{}", report.to_csv());
            } else {
                print_report(&report);
            }
        }
        Commands::Years { store, json } => {
            let years = board.available_years(store.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string(&years)?);
            } else if years.is_empty() {
                println!("No data.");
            } else {
                for year in years {
                    println!("{year}");
                }
            }
        }
        Commands::Sources { store } => {
            let sources = board.list_sources(store.as_deref()).await?;
            if sources.is_empty() {
                println!("No sources. Import records first.");
            } else {
                for source in sources {
                    println!("{source}");
                }
            }
        }
        Commands::Config { action } => {
            handle_config(&board, action).await?;
        }
        Commands::Status => {
            print_status(&board).await?;
        }
    }

    Ok(())
}

async fn handle_config(board: &kpiboard::KpiBoard, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match board.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            board.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = board.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(board: &kpiboard::KpiBoard) -> anyhow::Result<()> {
    let stores = board.list_stores().await?;
    let last_import = board
        .db()
        .reader()
        .call(|conn| kpiboard::storage::repository::last_import_at(conn))
        .await?;
    let schema_version = board.db().schema_version().await?;

    println!("Warehouse Status");
    println!("  Schema:      v{schema_version}");
    println!("  Stores:      {}", stores.len());
    for s in &stores {
        println!(
            "    {} {} ({} sources, {} records, {} .. {})",
            s.store_id,
            s.name.as_deref().unwrap_or(""),
            s.source_count,
            s.record_count,
            s.first_date.as_deref().unwrap_or("-"),
            s.last_date.as_deref().unwrap_or("-"),
        );
    }
    println!(
        "  Last import: {}",
        last_import.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

fn print_report(report: &kpiboard::KpiReport) {
    println!(
        "{} {} {} ({} to {}, {} days)",
        report.store_id,
        report.granularity,
        report.period_key,
        report.range.start_date,
        report.range.end_date,
        report.range.nominal_day_count
    );
    println!(
        "  {:<12} {:>12} {:>7} {:>8} {:>7} {:>10} {:>9} {:>7} {:>10}",
        "Period", "Revenue", "Sales", "Clients", "Items", "Prospects", "Basket", "Conv%", "Items/sale"
    );
    for entry in &report.entries {
        let m = entry.metrics.unwrap_or_default();
        println!(
            "  {:<12} {:>12.2} {:>7} {:>8} {:>7} {:>10} {:>9.2} {:>7.1} {:>10.2}",
            entry.label.to_string(),
            entry.totals.total_revenue,
            entry.totals.total_sales,
            entry.totals.total_clients,
            entry.totals.total_items,
            entry.totals.total_prospects,
            m.average_basket,
            m.conversion_rate,
            m.items_per_sale,
        );
    }
    let s = &report.summary;
    println!("  Total:");
    println!("    Revenue:        {:.2}", s.totals.total_revenue);
    println!("    Sales:          {}", s.totals.total_sales);
    println!("    Clients:        {}", s.totals.total_clients);
    println!("    Average basket: {:.2}", s.metrics.average_basket);
    println!("    Conversion:     {:.1}%", s.metrics.conversion_rate);
    println!("    Items per sale: {:.2}", s.metrics.items_per_sale);
    println!("    Active days:    {}", s.active_days);
    println!("  Previous: {}  Next: {}", report.previous_key, report.next_key);
}
