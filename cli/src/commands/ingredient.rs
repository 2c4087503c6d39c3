use anyhow::Result;

use larder_core::models::{MealIngredient, MealStatus};

use super::helpers::{print_ingredient_table, resolve_ingredient, resolve_proposal, short_id};
use super::{Engine, print_queued_note};

pub(crate) fn cmd_ingredient_list(engine: &Engine, proposal: Option<&str>, json: bool) -> Result<()> {
    let state = engine.snapshot();
    let ingredients: Vec<&MealIngredient> = match proposal {
        Some(id) => {
            let proposal = resolve_proposal(&state, id, json)?;
            state.ingredients_for(&proposal.proposal_id).collect()
        }
        None => state.ingredients.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
    } else if ingredients.is_empty() {
        println!("No ingredients.");
    } else {
        print_ingredient_table(&ingredients);
    }

    Ok(())
}

pub(crate) async fn cmd_ingredient_add(
    engine: &Engine,
    proposal: &str,
    name: &str,
    need_to_buy: bool,
    json: bool,
) -> Result<()> {
    let state = engine.snapshot();
    let proposal = resolve_proposal(&state, proposal, json)?;
    if proposal.status == MealStatus::Cooked {
        eprintln!("Note: {} is already cooked", proposal.title);
    }
    let ingredient = MealIngredient::new(&proposal.proposal_id, name, need_to_buy);
    engine.save_ingredient(ingredient.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        println!(
            "Added {} to {} ({})",
            ingredient.name,
            proposal.title,
            short_id(&ingredient.ingredient_id)
        );
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_ingredient_rename(
    engine: &Engine,
    id: &str,
    name: &str,
    json: bool,
) -> Result<()> {
    let state = engine.snapshot();
    let current = resolve_ingredient(&state, id, json)?;
    let renamed = current.renamed(name);
    engine.save_ingredient(renamed.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&renamed)?);
    } else {
        println!("Renamed {} to {}", current.name, renamed.name);
        print_queued_note(engine).await;
    }

    Ok(())
}

/// `ingredient buy` / `ingredient have`.
pub(crate) async fn cmd_ingredient_set_need(
    engine: &Engine,
    id: &str,
    need_to_buy: bool,
    json: bool,
) -> Result<()> {
    let state = engine.snapshot();
    let current = resolve_ingredient(&state, id, json)?;
    let updated = current.with_need_to_buy(need_to_buy);
    engine.save_ingredient(updated.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else if need_to_buy {
        println!("{} added to the shopping list", updated.name);
        print_queued_note(engine).await;
    } else {
        println!("{} marked as in the pantry", updated.name);
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_ingredient_remove(engine: &Engine, id: &str, json: bool) -> Result<()> {
    let state = engine.snapshot();
    let ingredient = resolve_ingredient(&state, id, json)?;
    engine.delete_ingredient(&ingredient.ingredient_id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": ingredient.ingredient_id }));
    } else {
        println!("Removed {}", ingredient.name);
        print_queued_note(engine).await;
    }

    Ok(())
}
