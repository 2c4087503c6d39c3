use std::collections::HashSet;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::wire;

pub const MEAL_SLOTS: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

pub const SHOPPING_PENDING: &str = "pending";
pub const SHOPPING_DONE: &str = "done";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealStatus {
    #[default]
    Pending,
    Cooked,
}

impl MealStatus {
    /// Unknown values fall back to `Pending`.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("cooked") {
            Self::Cooked
        } else {
            Self::Pending
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cooked => "cooked",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MealProposal {
    #[serde(deserialize_with = "wire::de_string")]
    pub proposal_id: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub meal_slot: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub title: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub notes: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub created_by: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub created_at: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub updated_at: String,
    #[serde(deserialize_with = "wire::de_status")]
    pub status: MealStatus,
}

impl MealProposal {
    pub fn new(meal_slot: &str, title: &str, notes: &str, created_by: &str) -> Result<Self> {
        let now = now_iso();
        Ok(Self {
            proposal_id: new_id(),
            meal_slot: validate_meal_slot(meal_slot)?,
            title: title.trim().to_string(),
            notes: notes.trim().to_string(),
            created_by: created_by.to_string(),
            created_at: now.clone(),
            updated_at: now,
            status: MealStatus::Pending,
        })
    }

    /// Copy with new slot/title/notes and a fresh `updated_at`.
    pub fn edit(&self, meal_slot: &str, title: &str, notes: &str) -> Result<Self> {
        let mut next = self.clone();
        next.meal_slot = validate_meal_slot(meal_slot)?;
        next.title = title.trim().to_string();
        next.notes = notes.trim().to_string();
        next.touch();
        Ok(next)
    }

    #[must_use]
    pub fn with_status(&self, status: MealStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.touch();
        next
    }

    pub fn touch(&mut self) {
        self.updated_at = advance_timestamp(&self.updated_at);
    }

    pub fn validate(&self) -> Result<()> {
        require_id("proposal_id", &self.proposal_id)?;
        validate_meal_slot(&self.meal_slot)?;
        if self.title.trim().is_empty() {
            return Err(SyncError::validation("title", "must not be empty"));
        }
        if let (Some(created), Some(updated)) =
            (parse_instant(&self.created_at), parse_instant(&self.updated_at))
        {
            if updated < created {
                return Err(SyncError::validation(
                    "updated_at",
                    format!("{} is before created_at {}", self.updated_at, self.created_at),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MealIngredient {
    #[serde(deserialize_with = "wire::de_string")]
    pub ingredient_id: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub proposal_id: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub name: String,
    #[serde(deserialize_with = "wire::de_bool")]
    pub need_to_buy: bool,
    #[serde(deserialize_with = "wire::de_string")]
    pub updated_at: String,
}

impl MealIngredient {
    #[must_use]
    pub fn new(proposal_id: &str, name: &str, need_to_buy: bool) -> Self {
        Self {
            ingredient_id: new_id(),
            proposal_id: proposal_id.to_string(),
            name: name.trim().to_string(),
            need_to_buy,
            updated_at: now_iso(),
        }
    }

    #[must_use]
    pub fn renamed(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.name = name.trim().to_string();
        next.touch();
        next
    }

    #[must_use]
    pub fn with_need_to_buy(&self, need_to_buy: bool) -> Self {
        let mut next = self.clone();
        next.need_to_buy = need_to_buy;
        next.touch();
        next
    }

    pub fn touch(&mut self) {
        self.updated_at = advance_timestamp(&self.updated_at);
    }

    pub fn validate(&self) -> Result<()> {
        require_id("ingredient_id", &self.ingredient_id)?;
        require_id("proposal_id", &self.proposal_id)?;
        if self.name.trim().is_empty() {
            return Err(SyncError::validation("name", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoppingEntry {
    #[serde(deserialize_with = "wire::de_string")]
    pub shopping_id: String,
    #[serde(deserialize_with = "wire::de_opt_id", serialize_with = "wire::ser_opt_id")]
    pub ingredient_id: Option<String>,
    #[serde(deserialize_with = "wire::de_opt_id", serialize_with = "wire::ser_opt_id")]
    pub proposal_id: Option<String>,
    #[serde(deserialize_with = "wire::de_string")]
    pub name: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub status: String,
    #[serde(deserialize_with = "wire::de_string")]
    pub updated_at: String,
}

impl ShoppingEntry {
    #[must_use]
    pub fn manual(name: &str) -> Self {
        Self {
            shopping_id: new_id(),
            ingredient_id: None,
            proposal_id: None,
            name: name.trim().to_string(),
            status: SHOPPING_PENDING.to_string(),
            updated_at: now_iso(),
        }
    }

    /// The auto-generated entry for an ingredient that needs buying. Its id is the
    /// ingredient id, which is what the backend rebuild uses too.
    #[must_use]
    pub fn derived_from(ingredient: &MealIngredient) -> Self {
        Self {
            shopping_id: ingredient.ingredient_id.clone(),
            ingredient_id: Some(ingredient.ingredient_id.clone()),
            proposal_id: Some(ingredient.proposal_id.clone()),
            name: ingredient.name.clone(),
            status: SHOPPING_PENDING.to_string(),
            updated_at: ingredient.updated_at.clone(),
        }
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.ingredient_id.is_none()
    }

    pub fn validate_manual(&self) -> Result<()> {
        require_id("shopping_id", &self.shopping_id)?;
        if !self.is_manual() {
            return Err(SyncError::validation(
                "ingredient_id",
                "manual shopping entries cannot reference an ingredient",
            ));
        }
        if self.name.trim().is_empty() {
            return Err(SyncError::validation("name", "must not be empty"));
        }
        Ok(())
    }
}

/// One consistent snapshot of everything a household shares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiState {
    pub proposals: Vec<MealProposal>,
    pub ingredients: Vec<MealIngredient>,
    pub shopping: Vec<ShoppingEntry>,
}

impl ApiState {
    #[must_use]
    pub fn proposal(&self, proposal_id: &str) -> Option<&MealProposal> {
        self.proposals.iter().find(|p| p.proposal_id == proposal_id)
    }

    #[must_use]
    pub fn ingredient(&self, ingredient_id: &str) -> Option<&MealIngredient> {
        self.ingredients
            .iter()
            .find(|i| i.ingredient_id == ingredient_id)
    }

    #[must_use]
    pub fn shopping_entry(&self, shopping_id: &str) -> Option<&ShoppingEntry> {
        self.shopping.iter().find(|s| s.shopping_id == shopping_id)
    }

    pub fn ingredients_for<'a>(
        &'a self,
        proposal_id: &'a str,
    ) -> impl Iterator<Item = &'a MealIngredient> + 'a {
        self.ingredients
            .iter()
            .filter(move |i| i.proposal_id == proposal_id)
    }

    pub fn upsert_proposal(&mut self, proposal: MealProposal) {
        upsert(&mut self.proposals, proposal, |p| &p.proposal_id);
    }

    pub fn upsert_ingredient(&mut self, ingredient: MealIngredient) {
        upsert(&mut self.ingredients, ingredient, |i| &i.ingredient_id);
    }

    pub fn upsert_shopping(&mut self, entry: ShoppingEntry) {
        upsert(&mut self.shopping, entry, |s| &s.shopping_id);
    }

    /// Remove a proposal together with its ingredients.
    pub fn remove_proposal(&mut self, proposal_id: &str) {
        self.proposals.retain(|p| p.proposal_id != proposal_id);
        self.ingredients.retain(|i| i.proposal_id != proposal_id);
    }

    pub fn remove_ingredient(&mut self, ingredient_id: &str) {
        self.ingredients.retain(|i| i.ingredient_id != ingredient_id);
    }

    pub fn remove_shopping(&mut self, shopping_id: &str) {
        self.shopping.retain(|s| s.shopping_id != shopping_id);
    }

    /// Drop every auto-generated shopping entry and re-create one per ingredient that
    /// needs buying. Manual entries keep their position at the front, untouched.
    /// Ingredients pointing at a proposal that no longer exists are ignored.
    pub fn rebuild_shopping(&mut self) {
        let proposal_ids: HashSet<&str> = self
            .proposals
            .iter()
            .map(|p| p.proposal_id.as_str())
            .collect();

        let mut shopping: Vec<ShoppingEntry> = self
            .shopping
            .iter()
            .filter(|s| s.is_manual())
            .cloned()
            .collect();
        shopping.extend(
            self.ingredients
                .iter()
                .filter(|i| i.need_to_buy && proposal_ids.contains(i.proposal_id.as_str()))
                .map(ShoppingEntry::derived_from),
        );
        self.shopping = shopping;
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> &String) {
    match items.iter().position(|existing| key(existing) == key(&item)) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
}

#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC instant as RFC 3339 with millisecond precision, e.g.
/// `2024-06-15T12:00:00.123Z`.
#[must_use]
pub fn now_iso() -> String {
    format_instant(Utc::now().trunc_subsecs(3))
}

#[must_use]
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Next `updated_at` value: now, or one millisecond past `previous` when the clock
/// has not moved beyond it.
fn advance_timestamp(previous: &str) -> String {
    let now = Utc::now().trunc_subsecs(3);
    match parse_instant(previous) {
        Some(prev) if prev >= now => format_instant(prev.trunc_subsecs(3) + Duration::milliseconds(1)),
        _ => format_instant(now),
    }
}

pub fn validate_meal_slot(slot: &str) -> Result<String> {
    let lower = slot.trim().to_lowercase();
    if MEAL_SLOTS.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(SyncError::validation(
            "meal_slot",
            format!("'{slot}' must be one of: {}", MEAL_SLOTS.join(", ")),
        ))
    }
}

fn require_id(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(SyncError::validation(field, "must not be empty"))
    } else {
        Ok(())
    }
}
