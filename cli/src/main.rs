mod client;
mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::client::HttpMenuClient;
use crate::commands::{
    cmd_edit, cmd_ingredient_add, cmd_ingredient_list, cmd_ingredient_remove,
    cmd_ingredient_rename, cmd_ingredient_set_need, cmd_pending, cmd_propose, cmd_refresh,
    cmd_remove, cmd_reset, cmd_set_status, cmd_shop_add, cmd_shop_done, cmd_shop_remove,
    cmd_shopping, cmd_show, cmd_status, cmd_sync,
};
use crate::config::Config;
use larder_core::engine::SyncEngine;
use larder_core::models::MealStatus;
use larder_core::store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "A shared, offline-first meal planner and shopping list",
    long_about = "Plan meals with your household and keep one shared shopping list.\n\n\
                  Every change is saved locally first and sent to the backend by `larder sync`."
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show proposed meals and their ingredients
    Show,
    /// Show the shopping list
    Shopping {
        /// Include entries already marked done
        #[arg(short, long)]
        all: bool,
    },
    /// List changes waiting to be synced
    Pending,
    /// Show cache, queue and backend status
    Status,
    /// Propose a meal
    Propose {
        /// Meal slot: breakfast, lunch, dinner, snack
        slot: String,
        /// What to cook
        title: String,
        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
        /// Ingredient, repeatable. Append ":buy" if it has to be bought (e.g. "Basil:buy")
        #[arg(short, long = "ingredient", value_name = "NAME[:buy]")]
        ingredients: Vec<String>,
    },
    /// Edit a proposed meal
    Edit {
        /// Proposal ID (or unique prefix)
        id: String,
        /// New meal slot
        #[arg(long)]
        slot: Option<String>,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark a meal as cooked
    Cook {
        /// Proposal ID (or unique prefix)
        id: String,
    },
    /// Mark a meal as not cooked yet
    Uncook {
        /// Proposal ID (or unique prefix)
        id: String,
    },
    /// Remove a meal and its ingredients
    Remove {
        /// Proposal ID (or unique prefix)
        id: String,
    },
    /// Manage ingredients of a meal
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage the shopping list
    Shop {
        #[command(subcommand)]
        command: ShopCommands,
    },
    /// Delete every meal, ingredient and manual shopping entry
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Fetch the latest household state from the backend
    Refresh,
    /// Send pending changes to the backend and pull the result
    Sync {
        /// Extra attempts after a transient failure
        #[arg(short, long, default_value = "2")]
        retries: u32,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// List ingredients, optionally for one meal
    List {
        /// Proposal ID (or unique prefix)
        proposal: Option<String>,
    },
    /// Add an ingredient to a meal
    Add {
        /// Proposal ID (or unique prefix)
        proposal: String,
        /// Ingredient name
        name: String,
        /// It has to be bought
        #[arg(long)]
        buy: bool,
    },
    /// Rename an ingredient
    Rename {
        /// Ingredient ID (or unique prefix)
        id: String,
        /// New name
        name: String,
    },
    /// Put an ingredient on the shopping list
    Buy {
        /// Ingredient ID (or unique prefix)
        id: String,
    },
    /// Mark an ingredient as already in the pantry
    Have {
        /// Ingredient ID (or unique prefix)
        id: String,
    },
    /// Remove an ingredient
    Remove {
        /// Ingredient ID (or unique prefix)
        id: String,
    },
}

#[derive(Subcommand)]
enum ShopCommands {
    /// Add a manual entry to the shopping list
    Add {
        /// Item name
        name: String,
    },
    /// Tick entries off the list
    Done {
        /// Shopping entry IDs (or unique prefixes)
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove entries from the list
    Remove {
        /// Shopping entry IDs (or unique prefixes)
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LARDER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = SqliteStore::open(&config.db_path)?;
    let client = HttpMenuClient::new(config.base_url.clone(), config.token.clone())?;
    let engine = SyncEngine::new(client, store);
    let json = cli.json;

    match cli.command {
        Commands::Show => cmd_show(&engine, json),
        Commands::Shopping { all } => cmd_shopping(&engine, all, json),
        Commands::Pending => cmd_pending(&engine, json).await,
        Commands::Status => cmd_status(&engine, &config, json).await,
        Commands::Propose {
            slot,
            title,
            notes,
            ingredients,
        } => {
            cmd_propose(
                &engine,
                &config.author,
                &slot,
                &title,
                notes.as_deref(),
                &ingredients,
                json,
            )
            .await
        }
        Commands::Edit {
            id,
            slot,
            title,
            notes,
        } => {
            cmd_edit(
                &engine,
                &id,
                slot.as_deref(),
                title.as_deref(),
                notes.as_deref(),
                json,
            )
            .await
        }
        Commands::Cook { id } => cmd_set_status(&engine, &id, MealStatus::Cooked, json).await,
        Commands::Uncook { id } => cmd_set_status(&engine, &id, MealStatus::Pending, json).await,
        Commands::Remove { id } => cmd_remove(&engine, &id, json).await,
        Commands::Ingredient { command } => match command {
            IngredientCommands::List { proposal } => {
                cmd_ingredient_list(&engine, proposal.as_deref(), json)
            }
            IngredientCommands::Add {
                proposal,
                name,
                buy,
            } => cmd_ingredient_add(&engine, &proposal, &name, buy, json).await,
            IngredientCommands::Rename { id, name } => {
                cmd_ingredient_rename(&engine, &id, &name, json).await
            }
            IngredientCommands::Buy { id } => {
                cmd_ingredient_set_need(&engine, &id, true, json).await
            }
            IngredientCommands::Have { id } => {
                cmd_ingredient_set_need(&engine, &id, false, json).await
            }
            IngredientCommands::Remove { id } => cmd_ingredient_remove(&engine, &id, json).await,
        },
        Commands::Shop { command } => match command {
            ShopCommands::Add { name } => cmd_shop_add(&engine, &name, json).await,
            ShopCommands::Done { ids } => cmd_shop_done(&engine, &ids, json).await,
            ShopCommands::Remove { ids } => cmd_shop_remove(&engine, &ids, json).await,
        },
        Commands::Reset { yes } => cmd_reset(&engine, yes, json).await,
        Commands::Refresh => cmd_refresh(&engine, &config, json).await,
        Commands::Sync { retries } => cmd_sync(&engine, &config, retries, json).await,
    }
}
