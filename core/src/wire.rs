//! JSON shapes shared by the backend protocol and the local cache.
//!
//! The backend is loose about types: booleans show up as `true`, `1` or `"true"`,
//! optional ids as `""` or `null`, and any string field may be `null`. The
//! deserializers here normalize all of that so the rest of the crate only ever sees
//! clean values.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SyncError};
use crate::models::{ApiState, MealIngredient, MealProposal, MealStatus};

pub const LIST_STATE: &str = "listState";
pub const SAVE_PROPOSAL: &str = "saveProposal";
pub const SAVE_PROPOSAL_WITH_INGREDIENTS: &str = "saveProposalWithIngredients";
pub const DELETE_PROPOSAL: &str = "deleteProposal";
pub const SAVE_INGREDIENT: &str = "saveIngredient";
pub const DELETE_INGREDIENT: &str = "deleteIngredient";
pub const SAVE_SHOPPING_ITEM: &str = "saveShoppingItem";
pub const DELETE_SHOPPING_ITEM: &str = "deleteShoppingItem";

/// Body of every mutation request.
#[derive(Debug, Serialize)]
pub struct ActionRequest<'a, P> {
    pub action: &'a str,
    pub token: &'a str,
    pub payload: P,
}

#[derive(Debug, Serialize)]
pub struct ProposalWithIngredients<'a> {
    pub proposal: &'a MealProposal,
    pub ingredients: &'a [MealIngredient],
}

#[derive(Debug, Serialize)]
pub struct ProposalRef<'a> {
    pub proposal_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct IngredientRef<'a> {
    pub ingredient_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ShoppingRef<'a> {
    pub shopping_id: &'a str,
}

/// Decode a `listState` response body.
pub fn parse_state(body: &str) -> Result<ApiState> {
    if body.trim().is_empty() {
        return Err(SyncError::Protocol("empty response body".to_string()));
    }
    serde_json::from_str(body)
        .map_err(|e| SyncError::Protocol(format!("malformed state response: {e}")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseBool {
    Bool(bool),
    Number(f64),
    Text(String),
}

pub fn de_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LooseBool>::deserialize(deserializer)? {
        Some(LooseBool::Bool(b)) => b,
        Some(LooseBool::Number(n)) => n != 0.0,
        Some(LooseBool::Text(s)) => s.eq_ignore_ascii_case("true") || s == "1",
        None => false,
    })
}

pub fn de_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `""`, whitespace and `null` all mean "no id".
pub fn de_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}

#[allow(clippy::ref_option)]
pub fn ser_opt_id<S>(value: &Option<String>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or_default())
}

pub fn de_status<'de, D>(deserializer: D) -> std::result::Result<MealStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(|raw| MealStatus::from_raw(&raw))
        .unwrap_or_default())
}
