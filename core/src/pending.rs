use serde::{Deserialize, Serialize};

use crate::models::{ApiState, MealIngredient, MealProposal, ShoppingEntry};

/// A local mutation that the backend has not confirmed yet.
///
/// Serialized with a `type` discriminator, one JSON object per operation, so the
/// stored queue reads as e.g. `{"type":"deleteProposal","proposal_id":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PendingOperation {
    SaveProposalWithIngredients {
        proposal: MealProposal,
        ingredients: Vec<MealIngredient>,
    },
    SaveProposal {
        proposal: MealProposal,
    },
    DeleteProposal {
        proposal_id: String,
    },
    SaveIngredient {
        ingredient: MealIngredient,
        /// `updated_at` of the ingredient as this device last saw it, or `None` when
        /// the ingredient did not exist locally yet.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_updated_at: Option<String>,
    },
    DeleteIngredient {
        ingredient_id: String,
    },
    #[serde(rename = "saveShopping")]
    SaveManualShopping {
        entry: ShoppingEntry,
    },
    DeleteShopping {
        shopping_id: String,
    },
}

impl PendingOperation {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SaveProposalWithIngredients { .. } => "saveProposalWithIngredients",
            Self::SaveProposal { .. } => "saveProposal",
            Self::DeleteProposal { .. } => "deleteProposal",
            Self::SaveIngredient { .. } => "saveIngredient",
            Self::DeleteIngredient { .. } => "deleteIngredient",
            Self::SaveManualShopping { .. } => "saveShopping",
            Self::DeleteShopping { .. } => "deleteShopping",
        }
    }

    /// Id of the entity this operation targets.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            Self::SaveProposalWithIngredients { proposal, .. } | Self::SaveProposal { proposal } => {
                &proposal.proposal_id
            }
            Self::DeleteProposal { proposal_id } => proposal_id,
            Self::SaveIngredient { ingredient, .. } => &ingredient.ingredient_id,
            Self::DeleteIngredient { ingredient_id } => ingredient_id,
            Self::SaveManualShopping { entry } => &entry.shopping_id,
            Self::DeleteShopping { shopping_id } => shopping_id,
        }
    }

    /// Apply the intended effect of this operation to a snapshot.
    ///
    /// Anything that touches ingredients also rebuilds the auto-generated part of the
    /// shopping list, mirroring what the backend does once the operation lands.
    pub fn apply_to(&self, state: &mut ApiState) {
        match self {
            Self::SaveProposalWithIngredients {
                proposal,
                ingredients,
            } => {
                state.upsert_proposal(proposal.clone());
                for ingredient in ingredients {
                    state.upsert_ingredient(ingredient.clone());
                }
                state.rebuild_shopping();
            }
            Self::SaveProposal { proposal } => state.upsert_proposal(proposal.clone()),
            Self::DeleteProposal { proposal_id } => {
                state.remove_proposal(proposal_id);
                state.rebuild_shopping();
            }
            Self::SaveIngredient { ingredient, .. } => {
                state.upsert_ingredient(ingredient.clone());
                state.rebuild_shopping();
            }
            Self::DeleteIngredient { ingredient_id } => {
                state.remove_ingredient(ingredient_id);
                state.rebuild_shopping();
            }
            Self::SaveManualShopping { entry } => state.upsert_shopping(entry.clone()),
            Self::DeleteShopping { shopping_id } => state.remove_shopping(shopping_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MealStatus;

    fn proposal() -> MealProposal {
        MealProposal {
            proposal_id: "p1".to_string(),
            meal_slot: "dinner".to_string(),
            title: "Curry".to_string(),
            notes: String::new(),
            created_by: "ana".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            status: MealStatus::Pending,
        }
    }

    fn ingredient(id: &str, need_to_buy: bool) -> MealIngredient {
        MealIngredient {
            ingredient_id: id.to_string(),
            proposal_id: "p1".to_string(),
            name: "Rice".to_string(),
            need_to_buy,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_serialized_layout() {
        let op = PendingOperation::DeleteProposal {
            proposal_id: "p1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            serde_json::json!({ "type": "deleteProposal", "proposal_id": "p1" })
        );

        let op = PendingOperation::SaveIngredient {
            ingredient: ingredient("i1", true),
            expected_updated_at: None,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "saveIngredient");
        assert!(value.get("expected_updated_at").is_none());
        assert_eq!(value["ingredient"]["need_to_buy"], true);

        let op = PendingOperation::SaveManualShopping {
            entry: ShoppingEntry::manual("Milk"),
        };
        assert_eq!(serde_json::to_value(&op).unwrap()["type"], "saveShopping");
    }

    #[test]
    fn test_decode_with_expected_updated_at() {
        let raw = r#"{"type":"saveIngredient",
                      "ingredient":{"ingredient_id":"i1","proposal_id":"p1","name":"Rice",
                                    "need_to_buy":"1","updated_at":"2024-01-02T00:00:00Z"},
                      "expected_updated_at":"2024-01-01T00:00:00Z"}"#;
        let op: PendingOperation = serde_json::from_str(raw).unwrap();
        let PendingOperation::SaveIngredient {
            ingredient,
            expected_updated_at,
        } = op
        else {
            panic!("wrong variant");
        };
        assert!(ingredient.need_to_buy);
        assert_eq!(expected_updated_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = r#"{"type":"launchRocket","target":"moon"}"#;
        assert!(serde_json::from_str::<PendingOperation>(raw).is_err());
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let ops = [
            PendingOperation::SaveProposalWithIngredients {
                proposal: proposal(),
                ingredients: vec![ingredient("i1", true)],
            },
            PendingOperation::SaveProposal {
                proposal: proposal(),
            },
            PendingOperation::DeleteProposal {
                proposal_id: "p1".into(),
            },
            PendingOperation::SaveIngredient {
                ingredient: ingredient("i1", true),
                expected_updated_at: Some("x".into()),
            },
            PendingOperation::DeleteIngredient {
                ingredient_id: "i1".into(),
            },
            PendingOperation::SaveManualShopping {
                entry: ShoppingEntry::manual("Milk"),
            },
            PendingOperation::DeleteShopping {
                shopping_id: "s1".into(),
            },
        ];
        for op in ops {
            assert_eq!(serde_json::to_value(&op).unwrap()["type"], op.kind());
        }
    }

    #[test]
    fn test_apply_save_with_ingredients_derives_shopping() {
        let mut state = ApiState::default();
        PendingOperation::SaveProposalWithIngredients {
            proposal: proposal(),
            ingredients: vec![ingredient("i1", true), ingredient("i2", false)],
        }
        .apply_to(&mut state);

        assert_eq!(state.proposals.len(), 1);
        assert_eq!(state.ingredients.len(), 2);
        assert_eq!(state.shopping.len(), 1);
        assert_eq!(state.shopping[0].shopping_id, "i1");
    }

    #[test]
    fn test_apply_toggle_and_delete_ingredient() {
        let mut state = ApiState::default();
        state.upsert_proposal(proposal());
        PendingOperation::SaveIngredient {
            ingredient: ingredient("i1", false),
            expected_updated_at: None,
        }
        .apply_to(&mut state);
        assert!(state.shopping.is_empty());

        PendingOperation::SaveIngredient {
            ingredient: ingredient("i1", true),
            expected_updated_at: Some("2024-01-01T00:00:00Z".into()),
        }
        .apply_to(&mut state);
        assert_eq!(state.ingredients.len(), 1);
        assert_eq!(state.shopping.len(), 1);

        PendingOperation::DeleteIngredient {
            ingredient_id: "i1".into(),
        }
        .apply_to(&mut state);
        assert!(state.ingredients.is_empty());
        assert!(state.shopping.is_empty());
    }

    #[test]
    fn test_apply_delete_proposal_keeps_manual_entries() {
        let mut state = ApiState::default();
        PendingOperation::SaveProposalWithIngredients {
            proposal: proposal(),
            ingredients: vec![ingredient("i1", true)],
        }
        .apply_to(&mut state);
        let milk = ShoppingEntry::manual("Milk");
        PendingOperation::SaveManualShopping {
            entry: milk.clone(),
        }
        .apply_to(&mut state);

        PendingOperation::DeleteProposal {
            proposal_id: "p1".into(),
        }
        .apply_to(&mut state);

        assert!(state.proposals.is_empty());
        assert!(state.ingredients.is_empty());
        assert_eq!(state.shopping, vec![milk]);
    }
}
