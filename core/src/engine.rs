use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::models::{ApiState, MealIngredient, MealProposal, ShoppingEntry};
use crate::pending::PendingOperation;
use crate::reconcile::{self, Skip};
use crate::remote::RemoteClient;
use crate::state::{Loadable, StatePublisher};
use crate::store::LocalStore;

/// Outcome of one `sync_pending` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Operations sent to the backend.
    pub replayed: usize,
    /// Operations dropped because the backend already reflected them.
    pub skipped: usize,
    /// Operations dropped because a concurrent remote edit won.
    pub conflicts: usize,
    /// Whether the closing refresh managed to pull the canonical state.
    pub refreshed: bool,
}

/// Snapshot and queue, always read and written together under the gate.
struct Local {
    snapshot: Option<ApiState>,
    queue: Vec<PendingOperation>,
}

/// Offline-first repository: local mutations are applied optimistically and queued,
/// `sync_pending` reconciles the queue against the backend.
pub struct SyncEngine<R, S> {
    remote: R,
    store: S,
    publisher: StatePublisher,
    gate: Mutex<Local>,
    // Serializes sync passes so a pass only ever removes the queue prefix it replayed.
    pass: Mutex<()>,
}

impl<R: RemoteClient, S: LocalStore> SyncEngine<R, S> {
    /// Build an engine primed from whatever the store holds.
    pub fn new(remote: R, store: S) -> Self {
        let snapshot = store.read();
        let queue = store.read_pending();
        let initial = snapshot.clone().map_or(Loadable::Idle, Loadable::Ready);
        debug!(
            cached = snapshot.is_some(),
            pending = queue.len(),
            "engine initialized"
        );
        Self {
            remote,
            store,
            publisher: StatePublisher::new(initial),
            gate: Mutex::new(Local { snapshot, queue }),
            pass: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Loadable<ApiState>> {
        self.publisher.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> Loadable<ApiState> {
        self.publisher.current()
    }

    /// Latest known snapshot, or an empty one if nothing was ever loaded.
    #[must_use]
    pub fn snapshot(&self) -> ApiState {
        self.publisher.current().data().cloned().unwrap_or_default()
    }

    pub async fn pending(&self) -> Vec<PendingOperation> {
        self.gate.lock().await.queue.clone()
    }

    /// Pull the backend state and make it the current snapshot.
    ///
    /// Derived shopping entries are rebuilt from the fetched ingredients, then operations
    /// still waiting in the queue are re-applied on top so a refresh never hides
    /// not-yet-synced local edits. A failure keeps the previous
    /// snapshot if there is one and only surfaces as `Error` when there is not.
    pub async fn refresh(&self) -> Result<ApiState> {
        {
            let local = self.gate.lock().await;
            if local.snapshot.is_none() {
                self.publisher.publish(Loadable::Loading);
            }
        }

        match self.remote.fetch_state().await {
            Ok(fetched) => {
                let mut local = self.gate.lock().await;
                let mut next = fetched;
                // The backend rebuilds its list asynchronously, so derive it here.
                next.rebuild_shopping();
                for op in &local.queue {
                    op.apply_to(&mut next);
                }
                if let Err(e) = self.store.write(&next) {
                    warn!(error = %e, "could not persist refreshed state");
                }
                local.snapshot = Some(next.clone());
                self.publisher.publish(Loadable::Ready(next.clone()));
                debug!(
                    proposals = next.proposals.len(),
                    ingredients = next.ingredients.len(),
                    shopping = next.shopping.len(),
                    "refreshed"
                );
                Ok(next)
            }
            Err(e) => {
                let local = self.gate.lock().await;
                match &local.snapshot {
                    Some(stale) => {
                        warn!(error = %e, "refresh failed, keeping cached state");
                        self.publisher.publish(Loadable::Ready(stale.clone()));
                    }
                    None => {
                        warn!(error = %e, "refresh failed with nothing cached");
                        self.publisher.publish(Loadable::Error(e.clone()));
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn save_proposal(&self, proposal: MealProposal) -> Result<ApiState> {
        proposal.validate()?;
        self.mutate(|_| Ok(PendingOperation::SaveProposal { proposal }))
            .await
    }

    pub async fn save_proposal_with_ingredients(
        &self,
        proposal: MealProposal,
        ingredients: Vec<MealIngredient>,
    ) -> Result<ApiState> {
        proposal.validate()?;
        for ingredient in &ingredients {
            ingredient.validate()?;
            if ingredient.proposal_id != proposal.proposal_id {
                return Err(SyncError::validation(
                    "proposal_id",
                    format!(
                        "ingredient {} belongs to {}, not {}",
                        ingredient.ingredient_id, ingredient.proposal_id, proposal.proposal_id
                    ),
                ));
            }
        }
        self.mutate(|_| {
            Ok(PendingOperation::SaveProposalWithIngredients {
                proposal,
                ingredients,
            })
        })
        .await
    }

    pub async fn delete_proposal(&self, proposal_id: &str) -> Result<ApiState> {
        require_id("proposal_id", proposal_id)?;
        self.mutate(|_| {
            Ok(PendingOperation::DeleteProposal {
                proposal_id: proposal_id.to_string(),
            })
        })
        .await
    }

    /// Queue an ingredient save, remembering the `updated_at` this device last saw so
    /// the sync pass can tell whether someone else edited it in the meantime.
    pub async fn save_ingredient(&self, ingredient: MealIngredient) -> Result<ApiState> {
        ingredient.validate()?;
        self.mutate(|current| {
            let expected_updated_at = current
                .ingredient(&ingredient.ingredient_id)
                .map(|existing| existing.updated_at.clone());
            Ok(PendingOperation::SaveIngredient {
                ingredient,
                expected_updated_at,
            })
        })
        .await
    }

    pub async fn delete_ingredient(&self, ingredient_id: &str) -> Result<ApiState> {
        require_id("ingredient_id", ingredient_id)?;
        self.mutate(|_| {
            Ok(PendingOperation::DeleteIngredient {
                ingredient_id: ingredient_id.to_string(),
            })
        })
        .await
    }

    pub async fn save_manual_shopping_item(&self, entry: ShoppingEntry) -> Result<ApiState> {
        entry.validate_manual()?;
        self.mutate(|_| Ok(PendingOperation::SaveManualShopping { entry }))
            .await
    }

    pub async fn delete_shopping_item(&self, shopping_id: &str) -> Result<ApiState> {
        require_id("shopping_id", shopping_id)?;
        self.mutate(|_| {
            Ok(PendingOperation::DeleteShopping {
                shopping_id: shopping_id.to_string(),
            })
        })
        .await
    }

    /// Tick entries off the shopping list. Manual entries are deleted; derived entries
    /// clear `need_to_buy` on their ingredient, which drops them on the next rebuild.
    pub async fn complete_shopping_entries(&self, entries: &[ShoppingEntry]) -> Result<ApiState> {
        let mut state = self.snapshot();
        for entry in entries {
            state = match &entry.ingredient_id {
                None => self.delete_shopping_item(&entry.shopping_id).await?,
                Some(ingredient_id) => self.mark_purchased(ingredient_id).await?,
            };
        }
        Ok(state)
    }

    /// Remove entries from the shopping list. Derived entries take their ingredient
    /// with them.
    pub async fn delete_shopping_entries(&self, entries: &[ShoppingEntry]) -> Result<ApiState> {
        let mut state = self.snapshot();
        for entry in entries {
            state = match &entry.ingredient_id {
                None => self.delete_shopping_item(&entry.shopping_id).await?,
                Some(ingredient_id) => self.delete_ingredient(ingredient_id).await?,
            };
        }
        Ok(state)
    }

    pub async fn mark_purchased(&self, ingredient_id: &str) -> Result<ApiState> {
        self.mutate(|current| {
            let existing = current.ingredient(ingredient_id).ok_or_else(|| {
                SyncError::validation("ingredient_id", format!("unknown ingredient {ingredient_id}"))
            })?;
            Ok(PendingOperation::SaveIngredient {
                ingredient: existing.with_need_to_buy(false),
                expected_updated_at: Some(existing.updated_at.clone()),
            })
        })
        .await
    }

    /// Queue deletion of every proposal, ingredient and manual shopping entry.
    pub async fn reset_all(&self) -> Result<ApiState> {
        let current = self.snapshot();
        let mut state = current.clone();
        for proposal in &current.proposals {
            state = self.delete_proposal(&proposal.proposal_id).await?;
        }
        for ingredient in &current.ingredients {
            state = self.delete_ingredient(&ingredient.ingredient_id).await?;
        }
        for entry in current.shopping.iter().filter(|s| s.is_manual()) {
            state = self.delete_shopping_item(&entry.shopping_id).await?;
        }
        Ok(state)
    }

    /// Reconcile the queue against the backend and replay what is still needed.
    ///
    /// A failed fetch or a failed replay aborts the pass with the queue untouched; the
    /// skip rules make re-running the whole batch safe.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        let _pass = self.pass.lock().await;

        let batch = self.gate.lock().await.queue.clone();
        if batch.is_empty() {
            let refreshed = self.refresh().await.is_ok();
            return Ok(SyncReport {
                refreshed,
                ..SyncReport::default()
            });
        }

        let remote = self.remote.fetch_state().await?;
        let plan = reconcile::plan(&batch, &remote);
        for (op, skip) in &plan.skipped {
            if let Skip::Conflict(conflict) = skip {
                info!(kind = op.kind(), %conflict, "dropping operation, remote edit wins");
            }
        }

        for op in &plan.replay {
            if let Err(e) = replay(&self.remote, op).await {
                warn!(kind = op.kind(), id = op.entity_id(), error = %e, "replay failed, keeping queue");
                return Err(e);
            }
        }

        {
            let mut local = self.gate.lock().await;
            let keep = batch.len().min(local.queue.len());
            let remaining = local.queue.split_off(keep);
            if let Err(e) = self.store.write_pending(&remaining) {
                // Put the batch back; replaying it again is harmless.
                let mut restored = batch.clone();
                restored.extend(remaining);
                local.queue = restored;
                return Err(e);
            }
            local.queue = remaining;
        }

        let report = SyncReport {
            replayed: plan.replay.len(),
            skipped: plan.skipped.len() - plan.conflicts(),
            conflicts: plan.conflicts(),
            refreshed: self.refresh().await.is_ok(),
        };
        info!(
            replayed = report.replayed,
            skipped = report.skipped,
            conflicts = report.conflicts,
            "sync pass complete"
        );
        Ok(report)
    }

    /// Build an operation from the current snapshot, apply it, queue it and persist
    /// both. Nothing changes in memory unless the store accepted the write.
    async fn mutate<F>(&self, build: F) -> Result<ApiState>
    where
        F: FnOnce(&ApiState) -> Result<PendingOperation>,
    {
        let mut local = self.gate.lock().await;
        let mut next = local.snapshot.clone().unwrap_or_default();
        let op = build(&next)?;
        op.apply_to(&mut next);

        let mut queue = local.queue.clone();
        queue.push(op);
        self.store.commit(&next, &queue)?;

        debug!(
            kind = queue.last().map(PendingOperation::kind),
            pending = queue.len(),
            "queued"
        );
        local.queue = queue;
        local.snapshot = Some(next.clone());
        self.publisher.publish(Loadable::Ready(next.clone()));
        Ok(next)
    }
}

async fn replay<R: RemoteClient>(remote: &R, op: &PendingOperation) -> Result<()> {
    match op {
        PendingOperation::SaveProposalWithIngredients {
            proposal,
            ingredients,
        } => {
            remote
                .save_proposal_with_ingredients(proposal, ingredients)
                .await
        }
        PendingOperation::SaveProposal { proposal } => remote.save_proposal(proposal).await,
        PendingOperation::DeleteProposal { proposal_id } => {
            remote.delete_proposal(proposal_id).await
        }
        PendingOperation::SaveIngredient { ingredient, .. } => {
            remote.save_ingredient(ingredient).await
        }
        PendingOperation::DeleteIngredient { ingredient_id } => {
            remote.delete_ingredient(ingredient_id).await
        }
        PendingOperation::SaveManualShopping { entry } => {
            remote.save_manual_shopping_item(entry).await
        }
        PendingOperation::DeleteShopping { shopping_id } => {
            remote.delete_shopping_item(shopping_id).await
        }
    }
}

fn require_id(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(SyncError::validation(field, "must not be empty"))
    } else {
        Ok(())
    }
}
