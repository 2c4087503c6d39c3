use anyhow::{Result, bail};

use larder_core::models::{MealIngredient, MealProposal, MealStatus};

use super::helpers::{parse_ingredient_arg, print_proposal_table, resolve_proposal, short_id};
use super::{Engine, print_queued_note};

pub(crate) fn cmd_show(engine: &Engine, json: bool) -> Result<()> {
    let state = engine.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else if state.proposals.is_empty() {
        println!("No meals proposed yet. Add one with `larder propose <slot> <title>`");
    } else {
        print_proposal_table(&state);
    }

    Ok(())
}

pub(crate) async fn cmd_propose(
    engine: &Engine,
    author: &str,
    slot: &str,
    title: &str,
    notes: Option<&str>,
    ingredient_args: &[String],
    json: bool,
) -> Result<()> {
    let proposal = MealProposal::new(slot, title, notes.unwrap_or_default(), author)?;
    let ingredients = ingredient_args
        .iter()
        .map(|arg| {
            let (name, need_to_buy) = parse_ingredient_arg(arg)?;
            Ok(MealIngredient::new(&proposal.proposal_id, &name, need_to_buy))
        })
        .collect::<Result<Vec<_>>>()?;

    if ingredients.is_empty() {
        engine.save_proposal(proposal.clone()).await?;
    } else {
        engine
            .save_proposal_with_ingredients(proposal.clone(), ingredients.clone())
            .await?;
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "proposal": proposal,
                "ingredients": ingredients,
            }))?
        );
    } else {
        println!(
            "Proposed {} for {} ({})",
            proposal.title,
            proposal.meal_slot,
            short_id(&proposal.proposal_id)
        );
        for i in &ingredients {
            let buy = if i.need_to_buy { " (to buy)" } else { "" };
            println!("  + {}{buy}", i.name);
        }
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_edit(
    engine: &Engine,
    id: &str,
    slot: Option<&str>,
    title: Option<&str>,
    notes: Option<&str>,
    json: bool,
) -> Result<()> {
    if slot.is_none() && title.is_none() && notes.is_none() {
        bail!("Nothing to edit. Provide at least one of --slot, --title, or --notes");
    }

    let state = engine.snapshot();
    let current = resolve_proposal(&state, id, json)?;
    let edited = current.edit(
        slot.unwrap_or(&current.meal_slot),
        title.unwrap_or(&current.title),
        notes.unwrap_or(&current.notes),
    )?;
    engine.save_proposal(edited.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&edited)?);
    } else {
        println!(
            "Updated {}: {} for {}",
            short_id(&edited.proposal_id),
            edited.title,
            edited.meal_slot
        );
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_set_status(
    engine: &Engine,
    id: &str,
    status: MealStatus,
    json: bool,
) -> Result<()> {
    let state = engine.snapshot();
    let current = resolve_proposal(&state, id, json)?;
    let updated = current.with_status(status);
    engine.save_proposal(updated.clone()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("{} is now {}", updated.title, status.as_str());
        print_queued_note(engine).await;
    }

    Ok(())
}

pub(crate) async fn cmd_remove(engine: &Engine, id: &str, json: bool) -> Result<()> {
    let state = engine.snapshot();
    let proposal = resolve_proposal(&state, id, json)?;
    let ingredient_count = state.ingredients_for(&proposal.proposal_id).count();
    engine.delete_proposal(&proposal.proposal_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "deleted": proposal.proposal_id,
                "ingredients": ingredient_count,
            })
        );
    } else {
        println!(
            "Removed {} and {ingredient_count} ingredient(s)",
            proposal.title
        );
        print_queued_note(engine).await;
    }

    Ok(())
}
