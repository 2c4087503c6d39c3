//! Decide which queued operations still need to reach the backend.
//!
//! The planner walks the queue in order against an index of the freshly fetched remote
//! state. Every kept operation is applied to the index right away, so operations later
//! in the same batch are judged against the state the earlier ones will produce.

use std::collections::HashMap;

use tracing::debug;

use crate::error::SyncError;
use crate::models::{ApiState, MealIngredient, MealProposal, ShoppingEntry, parse_instant};
use crate::pending::PendingOperation;

/// Why an operation was left out of the replay batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// The backend already holds an identical, at-least-as-new copy.
    UpToDate,
    /// The entity to delete is already gone.
    AlreadyDeleted,
    /// A manual shopping entry with this id already exists remotely.
    AlreadyExists,
    /// Someone else changed the ingredient since this device last saw it; their edit wins.
    Conflict(SyncError),
}

#[derive(Debug, Default)]
pub struct Plan {
    pub replay: Vec<PendingOperation>,
    pub skipped: Vec<(PendingOperation, Skip)>,
}

impl Plan {
    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.skipped
            .iter()
            .filter(|(_, skip)| matches!(skip, Skip::Conflict(_)))
            .count()
    }
}

/// `false` whenever either timestamp fails to parse, which forces a replay; otherwise
/// `true` iff `local` is not strictly after `server`.
#[must_use]
pub fn is_server_up_to_date(server: &str, local: &str) -> bool {
    match (parse_instant(server), parse_instant(local)) {
        (Some(server), Some(local)) => local <= server,
        _ => false,
    }
}

#[derive(Default)]
struct RemoteIndex {
    proposals: HashMap<String, MealProposal>,
    ingredients: HashMap<String, MealIngredient>,
    shopping: HashMap<String, ShoppingEntry>,
}

impl RemoteIndex {
    fn new(remote: &ApiState) -> Self {
        Self {
            proposals: remote
                .proposals
                .iter()
                .map(|p| (p.proposal_id.clone(), p.clone()))
                .collect(),
            ingredients: remote
                .ingredients
                .iter()
                .map(|i| (i.ingredient_id.clone(), i.clone()))
                .collect(),
            shopping: remote
                .shopping
                .iter()
                .map(|s| (s.shopping_id.clone(), s.clone()))
                .collect(),
        }
    }

    fn decide(&mut self, op: &PendingOperation) -> Option<Skip> {
        match op {
            PendingOperation::SaveProposal { proposal } => {
                if let Some(remote) = self.proposals.get(&proposal.proposal_id) {
                    if is_server_up_to_date(&remote.updated_at, &proposal.updated_at)
                        && remote.title == proposal.title
                        && remote.notes == proposal.notes
                        && remote.meal_slot == proposal.meal_slot
                    {
                        return Some(Skip::UpToDate);
                    }
                }
                self.proposals
                    .insert(proposal.proposal_id.clone(), proposal.clone());
                None
            }
            PendingOperation::SaveProposalWithIngredients {
                proposal,
                ingredients,
            } => {
                self.proposals
                    .insert(proposal.proposal_id.clone(), proposal.clone());
                for ingredient in ingredients {
                    self.ingredients
                        .insert(ingredient.ingredient_id.clone(), ingredient.clone());
                }
                None
            }
            PendingOperation::DeleteProposal { proposal_id } => {
                if self.proposals.remove(proposal_id).is_none() {
                    return Some(Skip::AlreadyDeleted);
                }
                self.ingredients.retain(|_, i| &i.proposal_id != proposal_id);
                None
            }
            PendingOperation::SaveIngredient {
                ingredient,
                expected_updated_at,
            } => {
                let remote = self.ingredients.get(&ingredient.ingredient_id);
                if let Err(conflict) =
                    check_ingredient_guard(ingredient, expected_updated_at.as_deref(), remote)
                {
                    return Some(Skip::Conflict(conflict));
                }
                if let Some(remote) = remote {
                    if is_server_up_to_date(&remote.updated_at, &ingredient.updated_at)
                        && remote.need_to_buy == ingredient.need_to_buy
                        && remote.name == ingredient.name
                    {
                        return Some(Skip::UpToDate);
                    }
                }
                self.ingredients
                    .insert(ingredient.ingredient_id.clone(), ingredient.clone());
                None
            }
            PendingOperation::DeleteIngredient { ingredient_id } => {
                if self.ingredients.remove(ingredient_id).is_none() {
                    return Some(Skip::AlreadyDeleted);
                }
                None
            }
            PendingOperation::SaveManualShopping { entry } => {
                if self.shopping.contains_key(&entry.shopping_id) {
                    return Some(Skip::AlreadyExists);
                }
                self.shopping.insert(entry.shopping_id.clone(), entry.clone());
                None
            }
            PendingOperation::DeleteShopping { shopping_id } => {
                if self.shopping.remove(shopping_id).is_none() {
                    return Some(Skip::AlreadyDeleted);
                }
                None
            }
        }
    }
}

/// Optimistic-concurrency check for a queued ingredient save.
fn check_ingredient_guard(
    ingredient: &MealIngredient,
    expected: Option<&str>,
    remote: Option<&MealIngredient>,
) -> Result<(), SyncError> {
    let reason = match (expected, remote) {
        (Some(_), None) => "deleted remotely",
        (None, Some(_)) => "created remotely",
        (Some(expected), Some(remote)) if !same_instant(expected, &remote.updated_at) => {
            "edited remotely"
        }
        _ => return Ok(()),
    };
    Err(SyncError::Conflict {
        entity: "ingredient",
        id: ingredient.ingredient_id.clone(),
        reason: reason.to_string(),
    })
}

/// Timestamps are equal when they denote the same instant; unparsable values must
/// match byte for byte.
fn same_instant(a: &str, b: &str) -> bool {
    match (parse_instant(a), parse_instant(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

#[must_use]
pub fn plan(queue: &[PendingOperation], remote: &ApiState) -> Plan {
    let mut index = RemoteIndex::new(remote);
    let mut plan = Plan::default();
    for op in queue {
        match index.decide(op) {
            None => {
                debug!(kind = op.kind(), id = op.entity_id(), "replay");
                plan.replay.push(op.clone());
            }
            Some(skip) => {
                debug!(kind = op.kind(), id = op.entity_id(), ?skip, "skip");
                plan.skipped.push((op.clone(), skip));
            }
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MealStatus;

    const DAY1: &str = "2024-01-01T00:00:00Z";
    const DAY2: &str = "2024-01-02T00:00:00Z";

    fn proposal(id: &str, updated_at: &str) -> MealProposal {
        MealProposal {
            proposal_id: id.to_string(),
            meal_slot: "dinner".to_string(),
            title: "Pasta".to_string(),
            notes: String::new(),
            created_by: "ana".to_string(),
            created_at: DAY1.to_string(),
            updated_at: updated_at.to_string(),
            status: MealStatus::Pending,
        }
    }

    fn ingredient(id: &str, proposal_id: &str, updated_at: &str) -> MealIngredient {
        MealIngredient {
            ingredient_id: id.to_string(),
            proposal_id: proposal_id.to_string(),
            name: "Basil".to_string(),
            need_to_buy: true,
            updated_at: updated_at.to_string(),
        }
    }

    fn manual(id: &str) -> ShoppingEntry {
        ShoppingEntry {
            shopping_id: id.to_string(),
            ingredient_id: None,
            proposal_id: None,
            name: "Milk".to_string(),
            status: "pending".to_string(),
            updated_at: DAY1.to_string(),
        }
    }

    fn save_ingredient(ingredient: MealIngredient, expected: Option<&str>) -> PendingOperation {
        PendingOperation::SaveIngredient {
            ingredient,
            expected_updated_at: expected.map(str::to_string),
        }
    }

    #[test]
    fn test_is_server_up_to_date() {
        assert!(is_server_up_to_date(DAY2, DAY1));
        assert!(is_server_up_to_date(DAY1, DAY1));
        assert!(!is_server_up_to_date(DAY1, DAY2));
        // Same instant, different spelling
        assert!(is_server_up_to_date("2024-01-01T01:00:00+01:00", DAY1));
        assert!(!is_server_up_to_date("", DAY1));
        assert!(!is_server_up_to_date(DAY2, "not a date"));
        assert!(!is_server_up_to_date("garbage", "garbage"));
    }

    #[test]
    fn test_save_proposal_skipped_when_remote_identical_and_newer() {
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY2)],
            ..ApiState::default()
        };
        let queue = vec![PendingOperation::SaveProposal {
            proposal: proposal("p1", DAY1),
        }];
        let plan = plan(&queue, &remote);
        assert!(plan.replay.is_empty());
        assert_eq!(plan.skipped[0].1, Skip::UpToDate);
    }

    #[test]
    fn test_save_proposal_replayed_when_local_newer() {
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY1)],
            ..ApiState::default()
        };
        let queue = vec![PendingOperation::SaveProposal {
            proposal: proposal("p1", DAY2),
        }];
        assert_eq!(plan(&queue, &remote).replay.len(), 1);
    }

    #[test]
    fn test_save_proposal_replayed_when_fields_differ() {
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY2)],
            ..ApiState::default()
        };
        let mut local = proposal("p1", DAY1);
        local.notes = "extra cheese".to_string();
        let queue = vec![PendingOperation::SaveProposal { proposal: local }];
        assert_eq!(plan(&queue, &remote).replay.len(), 1);
    }

    #[test]
    fn test_save_proposal_replayed_when_remote_timestamp_unparsable() {
        let remote = ApiState {
            proposals: vec![proposal("p1", "sometime")],
            ..ApiState::default()
        };
        let queue = vec![PendingOperation::SaveProposal {
            proposal: proposal("p1", DAY1),
        }];
        assert_eq!(plan(&queue, &remote).replay.len(), 1);
    }

    #[test]
    fn test_save_proposal_skip_ignores_status() {
        // Only title/notes/slot are compared: a status-only edit against a newer
        // remote copy is treated as already applied and the status change is lost.
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY2)],
            ..ApiState::default()
        };
        let mut cooked = proposal("p1", DAY1);
        cooked.status = MealStatus::Cooked;
        let queue = vec![PendingOperation::SaveProposal { proposal: cooked }];
        assert!(plan(&queue, &remote).replay.is_empty());
    }

    #[test]
    fn test_save_proposal_with_ingredients_always_kept() {
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY2)],
            ingredients: vec![ingredient("i1", "p1", DAY2)],
            ..ApiState::default()
        };
        let queue = vec![PendingOperation::SaveProposalWithIngredients {
            proposal: proposal("p1", DAY1),
            ingredients: vec![ingredient("i1", "p1", DAY1)],
        }];
        assert_eq!(plan(&queue, &remote).replay.len(), 1);
    }

    #[test]
    fn test_later_ops_see_earlier_ones() {
        let queue = vec![
            PendingOperation::SaveProposalWithIngredients {
                proposal: proposal("p1", DAY1),
                ingredients: vec![ingredient("i1", "p1", DAY1)],
            },
            save_ingredient(ingredient("i1", "p1", DAY2), Some(DAY1)),
        ];
        let plan = plan(&queue, &ApiState::default());
        assert_eq!(plan.replay.len(), 2);
        assert_eq!(plan.conflicts(), 0);
    }

    #[test]
    fn test_delete_proposal_kept_only_if_remote_exists() {
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY1)],
            ..ApiState::default()
        };
        let queue = vec![
            PendingOperation::DeleteProposal {
                proposal_id: "p1".into(),
            },
            PendingOperation::DeleteProposal {
                proposal_id: "p2".into(),
            },
        ];
        let plan = plan(&queue, &remote);
        assert_eq!(plan.replay.len(), 1);
        assert_eq!(plan.replay[0].entity_id(), "p1");
        assert_eq!(plan.skipped[0].1, Skip::AlreadyDeleted);
    }

    #[test]
    fn test_delete_proposal_removes_its_ingredients_from_index() {
        let remote = ApiState {
            proposals: vec![proposal("p1", DAY1)],
            ingredients: vec![ingredient("i1", "p1", DAY1)],
            ..ApiState::default()
        };
        let queue = vec![
            PendingOperation::DeleteProposal {
                proposal_id: "p1".into(),
            },
            PendingOperation::DeleteIngredient {
                ingredient_id: "i1".into(),
            },
        ];
        let plan = plan(&queue, &remote);
        assert_eq!(plan.replay.len(), 1);
        assert_eq!(plan.skipped[0].1, Skip::AlreadyDeleted);
    }

    #[test]
    fn test_ingredient_conflict_when_edited_remotely() {
        let remote = ApiState {
            ingredients: vec![ingredient("i1", "p1", DAY2)],
            ..ApiState::default()
        };
        let mut local = ingredient("i1", "p1", "2024-01-03T00:00:00Z");
        local.need_to_buy = false;
        let queue = vec![save_ingredient(local, Some(DAY1))];
        let plan = plan(&queue, &remote);
        assert!(plan.replay.is_empty());
        assert_eq!(plan.conflicts(), 1);
        assert!(matches!(
            &plan.skipped[0].1,
            Skip::Conflict(SyncError::Conflict { reason, .. }) if reason == "edited remotely"
        ));
    }

    #[test]
    fn test_ingredient_conflict_when_deleted_remotely() {
        let queue = vec![save_ingredient(ingredient("i1", "p1", DAY2), Some(DAY1))];
        let plan = plan(&queue, &ApiState::default());
        assert_eq!(plan.conflicts(), 1);
    }

    #[test]
    fn test_ingredient_conflict_when_created_remotely() {
        let remote = ApiState {
            ingredients: vec![ingredient("i1", "p1", DAY1)],
            ..ApiState::default()
        };
        let queue = vec![save_ingredient(ingredient("i1", "p1", DAY2), None)];
        assert_eq!(plan(&queue, &remote).conflicts(), 1);
    }

    #[test]
    fn test_ingredient_guard_compares_instants() {
        let remote = ApiState {
            ingredients: vec![ingredient("i1", "p1", "2024-01-01T00:00:00.000Z")],
            ..ApiState::default()
        };
        let mut local = ingredient("i1", "p1", DAY2);
        local.name = "Thai basil".to_string();
        let queue = vec![save_ingredient(local, Some(DAY1))];
        let plan = plan(&queue, &remote);
        assert_eq!(plan.conflicts(), 0);
        assert_eq!(plan.replay.len(), 1);
    }

    #[test]
    fn test_ingredient_new_is_replayed() {
        let queue = vec![save_ingredient(ingredient("i1", "p1", DAY1), None)];
        assert_eq!(plan(&queue, &ApiState::default()).replay.len(), 1);
    }

    #[test]
    fn test_ingredient_already_applied_is_skipped() {
        let remote = ApiState {
            ingredients: vec![ingredient("i1", "p1", DAY2)],
            ..ApiState::default()
        };
        // Guard passes (expected matches), and the server copy is identical and current
        let local = ingredient("i1", "p1", DAY2);
        let queue = vec![save_ingredient(local, Some(DAY2))];
        let plan = plan(&queue, &remote);
        assert_eq!(plan.skipped[0].1, Skip::UpToDate);
    }

    #[test]
    fn test_delete_ingredient_and_shopping() {
        let remote = ApiState {
            ingredients: vec![ingredient("i1", "p1", DAY1)],
            shopping: vec![manual("s1")],
            ..ApiState::default()
        };
        let queue = vec![
            PendingOperation::DeleteIngredient {
                ingredient_id: "i1".into(),
            },
            PendingOperation::DeleteIngredient {
                ingredient_id: "i2".into(),
            },
            PendingOperation::DeleteShopping {
                shopping_id: "s1".into(),
            },
            PendingOperation::DeleteShopping {
                shopping_id: "s1".into(),
            },
        ];
        let plan = plan(&queue, &remote);
        let kept: Vec<&str> = plan.replay.iter().map(PendingOperation::entity_id).collect();
        assert_eq!(kept, vec!["i1", "s1"]);
        assert_eq!(plan.skipped.len(), 2);
    }

    #[test]
    fn test_manual_shopping_never_overwritten() {
        let remote = ApiState {
            shopping: vec![manual("s1")],
            ..ApiState::default()
        };
        let mut renamed = manual("s1");
        renamed.name = "Oat milk".to_string();
        let queue = vec![
            PendingOperation::SaveManualShopping { entry: renamed },
            PendingOperation::SaveManualShopping {
                entry: manual("s2"),
            },
        ];
        let plan = plan(&queue, &remote);
        assert_eq!(plan.replay.len(), 1);
        assert_eq!(plan.replay[0].entity_id(), "s2");
        assert_eq!(plan.skipped[0].1, Skip::AlreadyExists);
    }

    #[test]
    fn test_replay_preserves_queue_order() {
        let queue = vec![
            PendingOperation::SaveManualShopping {
                entry: manual("s1"),
            },
            PendingOperation::SaveProposal {
                proposal: proposal("p1", DAY1),
            },
            PendingOperation::DeleteShopping {
                shopping_id: "s1".into(),
            },
        ];
        let plan = plan(&queue, &ApiState::default());
        assert_eq!(plan.replay, queue);
    }
}
