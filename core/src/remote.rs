use std::future::Future;

use crate::error::Result;
use crate::models::{ApiState, MealIngredient, MealProposal, ShoppingEntry};

/// Request/response access to the household backend.
///
/// One call is one request: implementations never retry. Every mutation carries the
/// whole entity, so sending it twice is an upsert and not an error.
pub trait RemoteClient: Send + Sync {
    fn fetch_state(&self) -> impl Future<Output = Result<ApiState>> + Send;

    fn save_proposal(&self, proposal: &MealProposal) -> impl Future<Output = Result<()>> + Send;

    fn save_proposal_with_ingredients(
        &self,
        proposal: &MealProposal,
        ingredients: &[MealIngredient],
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_proposal(&self, proposal_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn save_ingredient(&self, ingredient: &MealIngredient)
    -> impl Future<Output = Result<()>> + Send;

    fn delete_ingredient(&self, ingredient_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn save_manual_shopping_item(
        &self,
        entry: &ShoppingEntry,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_shopping_item(&self, shopping_id: &str) -> impl Future<Output = Result<()>> + Send;
}
