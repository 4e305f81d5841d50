use clap::{Parser, Subcommand};
use docstore_bridge::backend::SelectOptions;
use docstore_bridge::config::AppConfig;
use docstore_bridge::error::{StoreError, StoreResult};
use docstore_bridge::logging;
use docstore_bridge::models::Record;
use docstore_bridge::parser::{Filter, SortSpec};
use docstore_bridge::Dispatcher;
use serde_json::Value;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "storectl")]
#[command(about = "Inspect and edit records through the storage layer")]
struct Args {
    /// Configuration file path; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Database name (overrides config file)
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and run a health check
    Ping,
    /// Insert a record given as a JSON object
    Create {
        #[arg(long)]
        collection: String,
        record: String,
        /// Stamp a `date` field with the current time
        #[arg(long)]
        with_date: bool,
    },
    /// Print records matching a JSON filter
    Select {
        #[arg(long)]
        collection: String,
        #[arg(default_value = "{}")]
        filter: String,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        sort_order: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        no_id: bool,
    },
    /// Case-insensitive regex search on one field
    Search {
        #[arg(long)]
        collection: String,
        field: String,
        pattern: String,
        /// Only records whose `active` flag is set
        #[arg(long)]
        active_only: bool,
    },
    /// Set fields, given as a JSON object, on every record matching a JSON filter
    Update {
        #[arg(long)]
        collection: String,
        filter: String,
        fields: String,
    },
    /// Delete every record matching a JSON filter
    Delete {
        #[arg(long)]
        collection: String,
        filter: String,
    },
    /// Count records matching a JSON filter
    Count {
        #[arg(long)]
        collection: String,
        #[arg(default_value = "{}")]
        filter: String,
    },
}

fn parse_json(text: &str) -> StoreResult<Value> {
    Ok(serde_json::from_str(text)?)
}

fn parse_filter(text: &str) -> StoreResult<Filter> {
    Filter::from_json(&parse_json(text)?)
}

fn parse_record(text: &str) -> StoreResult<Record> {
    Record::from_json(parse_json(text)?)
        .ok_or_else(|| StoreError::InvalidArgument("Record must be a JSON object".to_string()))
}

async fn run(args: Args) -> StoreResult<()> {
    let mut app_config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default_config(),
    };
    app_config.apply_env_overrides()?;
    logging::init_tracing(&app_config.logging.level)?;

    let db = args.db.unwrap_or_else(|| app_config.backend.database.clone());
    let dispatcher = Dispatcher::from_config(app_config.to_backend_config()?);

    match args.command {
        Command::Ping => {
            dispatcher.health_check().await?;
            let caps = dispatcher.capabilities().await?;
            info!("Backend is healthy");
            println!(
                "ok (list fields: {}, aggregate: {}, search: {})",
                caps.list_fields, caps.aggregate, caps.search
            );
        }
        Command::Create {
            collection,
            record,
            with_date,
        } => {
            let record = parse_record(&record)?;
            let id = dispatcher.create(&db, &collection, &record, with_date).await?;
            println!("{}", id);
        }
        Command::Select {
            collection,
            filter,
            sort_by,
            sort_order,
            limit,
            no_id,
        } => {
            let filter = parse_filter(&filter)?;
            let mut options = SelectOptions::new()
                .with_sort(SortSpec::from_params(sort_by.as_deref(), sort_order.as_deref()));
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            if no_id {
                options = options.without_id();
            }

            let records = dispatcher.select(&db, &collection, &filter, &options).await?;
            for record in records {
                println!("{}", record.to_json());
            }
        }
        Command::Search {
            collection,
            field,
            pattern,
            active_only,
        } => {
            let records = dispatcher
                .search(&db, &collection, &field, &pattern, active_only)
                .await?;
            for record in records {
                println!("{}", record.to_json());
            }
        }
        Command::Update {
            collection,
            filter,
            fields,
        } => {
            let filter = parse_filter(&filter)?;
            let fields = parse_record(&fields)?;
            let result = dispatcher
                .update_many(&db, &collection, &filter, &fields)
                .await?;
            println!("matched {}, updated {}", result.matched_count, result.num_updated());
        }
        Command::Delete { collection, filter } => {
            let filter = parse_filter(&filter)?;
            let result = dispatcher.delete_many(&db, &collection, &filter).await?;
            println!("deleted {}", result.del_count());
        }
        Command::Count { collection, filter } => {
            let filter = parse_filter(&filter)?;
            println!("{}", dispatcher.count(&db, &collection, &filter).await?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("storectl: {}", e);
        std::process::exit(1);
    }
}
