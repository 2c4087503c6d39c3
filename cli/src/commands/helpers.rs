use anyhow::{Result, bail};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{ApiState, MealIngredient, MealProposal, ShoppingEntry};
use larder_core::pending::PendingOperation;

const SHORT_ID: usize = 8;

/// Look an item up by full id or unique id prefix. `Ok(None)` when nothing matches.
pub(crate) fn find_by_prefix<'a, T>(
    items: &'a [T],
    prefix: &str,
    id_of: impl Fn(&T) -> &str,
    what: &str,
) -> Result<Option<&'a T>> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("Empty {what} id");
    }
    if let Some(exact) = items.iter().find(|item| id_of(item) == prefix) {
        return Ok(Some(exact));
    }
    let mut matches = items.iter().filter(|item| id_of(item).starts_with(prefix));
    let first = matches.next();
    if matches.next().is_some() {
        bail!("Ambiguous {what} id '{prefix}', use more characters");
    }
    Ok(first)
}

/// Print a not-found message (JSON-aware) and exit with status 2.
pub(crate) fn not_found(what: &str, id: &str, json: bool) -> ! {
    let message = format!("No {what} matching '{id}'");
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn resolve_proposal<'a>(
    state: &'a ApiState,
    id: &str,
    json: bool,
) -> Result<&'a MealProposal> {
    match find_by_prefix(&state.proposals, id, |p| p.proposal_id.as_str(), "proposal")? {
        Some(p) => Ok(p),
        None => not_found("proposal", id, json),
    }
}

pub(crate) fn resolve_ingredient<'a>(
    state: &'a ApiState,
    id: &str,
    json: bool,
) -> Result<&'a MealIngredient> {
    match find_by_prefix(&state.ingredients, id, |i| i.ingredient_id.as_str(), "ingredient")? {
        Some(i) => Ok(i),
        None => not_found("ingredient", id, json),
    }
}

pub(crate) fn resolve_shopping<'a>(
    state: &'a ApiState,
    id: &str,
    json: bool,
) -> Result<&'a ShoppingEntry> {
    match find_by_prefix(&state.shopping, id, |s| s.shopping_id.as_str(), "shopping entry")? {
        Some(s) => Ok(s),
        None => not_found("shopping entry", id, json),
    }
}

/// Parse `--ingredient` values: `Basil` or `Basil:buy`.
pub(crate) fn parse_ingredient_arg(arg: &str) -> Result<(String, bool)> {
    let (name, need_to_buy) = match arg.rsplit_once(':') {
        Some((name, flag)) if flag.trim().eq_ignore_ascii_case("buy") => (name, true),
        _ => (arg, false),
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid ingredient '{arg}'. Use 'NAME' or 'NAME:buy'");
    }
    Ok((name.to_string(), need_to_buy))
}

pub(crate) fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID).collect()
}

pub(crate) fn print_proposal_table(state: &ApiState) {
    #[derive(Tabled)]
    struct ProposalRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Slot")]
        slot: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "By")]
        created_by: String,
        #[tabled(rename = "Ingredients")]
        ingredients: String,
    }

    let rows: Vec<ProposalRow> = state
        .proposals
        .iter()
        .map(|p| ProposalRow {
            id: short_id(&p.proposal_id),
            slot: p.meal_slot.clone(),
            title: truncate(&p.title, 30),
            status: p.status.as_str().to_string(),
            created_by: truncate(&p.created_by, 12),
            ingredients: state
                .ingredients_for(&p.proposal_id)
                .map(|i| {
                    if i.need_to_buy {
                        format!("{}*", i.name)
                    } else {
                        i.name.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_ingredient_table(ingredients: &[&MealIngredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Proposal")]
        proposal: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Buy")]
        need_to_buy: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: short_id(&i.ingredient_id),
            proposal: short_id(&i.proposal_id),
            name: truncate(&i.name, 30),
            need_to_buy: if i.need_to_buy { "yes" } else { "no" }.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::center()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_shopping_table(entries: &[ShoppingEntry]) {
    #[derive(Tabled)]
    struct ShoppingRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<ShoppingRow> = entries
        .iter()
        .map(|s| ShoppingRow {
            id: short_id(&s.shopping_id),
            name: truncate(&s.name, 35),
            status: s.status.clone(),
            source: if s.is_manual() {
                "manual".to_string()
            } else {
                "meal".to_string()
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_pending_table(ops: &[PendingOperation]) {
    #[derive(Tabled)]
    struct PendingRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Operation")]
        kind: String,
        #[tabled(rename = "Target")]
        target: String,
    }

    let rows: Vec<PendingRow> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| PendingRow {
            idx: i + 1,
            kind: op.kind().to_string(),
            target: short_id(op.entity_id()),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(0..1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
