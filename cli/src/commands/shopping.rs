use anyhow::{Result, bail};

use larder_core::models::{SHOPPING_DONE, ShoppingEntry};

use super::helpers::{print_shopping_table, resolve_shopping, short_id};
use super::{Engine, print_queued_note};

pub(crate) fn cmd_shopping(engine: &Engine, all: bool, json: bool) -> Result<()> {
    let state = engine.snapshot();
    let entries: Vec<ShoppingEntry> = state
        .shopping
        .into_iter()
        .filter(|s| all || s.status != SHOPPING_DONE)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("Shopping list is empty.");
    } else {
        print_shopping_table(&entries);
    }

    Ok(())
}

pub(crate) async fn cmd_shop_add(engine: &Engine, name: &str, json: bool) -> Result<()> {
    let entry = ShoppingEntry::manual(name);
    engine.save_manual_shopping_item(entry.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Added {} ({})", entry.name, short_id(&entry.shopping_id));
        print_queued_note(engine).await;
    }

    Ok(())
}

fn resolve_entries(engine: &Engine, ids: &[String], json: bool) -> Result<Vec<ShoppingEntry>> {
    if ids.is_empty() {
        bail!("Provide at least one shopping entry id");
    }
    let state = engine.snapshot();
    ids.iter()
        .map(|id| resolve_shopping(&state, id, json).cloned())
        .collect()
}

pub(crate) async fn cmd_shop_done(engine: &Engine, ids: &[String], json: bool) -> Result<()> {
    let entries = resolve_entries(engine, ids, json)?;
    let state = engine.complete_shopping_entries(&entries).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.shopping)?);
    } else {
        for entry in &entries {
            println!("Got {}", entry.name);
        }
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_shop_remove(engine: &Engine, ids: &[String], json: bool) -> Result<()> {
    let entries = resolve_entries(engine, ids, json)?;
    let state = engine.delete_shopping_entries(&entries).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.shopping)?);
    } else {
        for entry in &entries {
            if entry.is_manual() {
                println!("Removed {}", entry.name);
            } else {
                println!("Removed {} from its meal", entry.name);
            }
        }
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_reset(engine: &Engine, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("This deletes every meal, ingredient and shopping entry for the household. Re-run with --yes");
    }

    let before = engine.snapshot();
    engine.reset_all().await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "proposals": before.proposals.len(),
                "ingredients": before.ingredients.len(),
                "shopping": before.shopping.iter().filter(|s| s.is_manual()).count(),
            })
        );
    } else {
        println!(
            "Cleared {} meal(s) and {} ingredient(s)",
            before.proposals.len(),
            before.ingredients.len()
        );
        print_queued_note(engine).await;
    }

    Ok(())
}
