use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use larder_core::error::{self, SyncError};
use larder_core::models::{ApiState, MealIngredient, MealProposal, ShoppingEntry};
use larder_core::remote::RemoteClient;
use larder_core::wire::{
    self, ActionRequest, IngredientRef, ProposalRef, ProposalWithIngredients, ShoppingRef,
};

/// `RemoteClient` for the household backend: one GET for the full state, one POST
/// endpoint for every mutation.
pub struct HttpMenuClient {
    client: reqwest::Client,
    base_url: Option<String>,
    token: String,
}

impl HttpMenuClient {
    pub fn new(base_url: Option<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            token: token.unwrap_or_default(),
        })
    }

    fn endpoint(&self) -> error::Result<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| SyncError::Network("backend URL is not configured".to_string()))
    }

    fn action<P: Serialize>(
        &self,
        endpoint: &str,
        action: &str,
        payload: P,
    ) -> reqwest::RequestBuilder {
        self.client.post(endpoint).json(&ActionRequest {
            action,
            token: &self.token,
            payload,
        })
    }

    async fn send(request: reqwest::RequestBuilder, action: &str) -> error::Result<()> {
        let resp = request
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("failed to reach backend: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!(
                "HTTP {} for action {action}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

impl RemoteClient for HttpMenuClient {
    async fn fetch_state(&self) -> error::Result<ApiState> {
        let endpoint = self.endpoint()?;
        let resp = self
            .client
            .get(endpoint)
            .query(&[("action", wire::LIST_STATE), ("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("failed to reach backend: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!("HTTP {}", status.as_u16())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SyncError::Network(format!("failed to read response: {e}")))?;
        wire::parse_state(&body)
    }

    async fn save_proposal(&self, proposal: &MealProposal) -> error::Result<()> {
        let request = self.action(self.endpoint()?, wire::SAVE_PROPOSAL, proposal);
        Self::send(request, wire::SAVE_PROPOSAL).await
    }

    async fn save_proposal_with_ingredients(
        &self,
        proposal: &MealProposal,
        ingredients: &[MealIngredient],
    ) -> error::Result<()> {
        let request = self.action(
            self.endpoint()?,
            wire::SAVE_PROPOSAL_WITH_INGREDIENTS,
            ProposalWithIngredients {
                proposal,
                ingredients,
            },
        );
        Self::send(request, wire::SAVE_PROPOSAL_WITH_INGREDIENTS).await
    }

    async fn delete_proposal(&self, proposal_id: &str) -> error::Result<()> {
        let request = self.action(
            self.endpoint()?,
            wire::DELETE_PROPOSAL,
            ProposalRef { proposal_id },
        );
        Self::send(request, wire::DELETE_PROPOSAL).await
    }

    async fn save_ingredient(&self, ingredient: &MealIngredient) -> error::Result<()> {
        let request = self.action(self.endpoint()?, wire::SAVE_INGREDIENT, ingredient);
        Self::send(request, wire::SAVE_INGREDIENT).await
    }

    async fn delete_ingredient(&self, ingredient_id: &str) -> error::Result<()> {
        let request = self.action(
            self.endpoint()?,
            wire::DELETE_INGREDIENT,
            IngredientRef { ingredient_id },
        );
        Self::send(request, wire::DELETE_INGREDIENT).await
    }

    async fn save_manual_shopping_item(&self, entry: &ShoppingEntry) -> error::Result<()> {
        let request = self.action(self.endpoint()?, wire::SAVE_SHOPPING_ITEM, entry);
        Self::send(request, wire::SAVE_SHOPPING_ITEM).await
    }

    async fn delete_shopping_item(&self, shopping_id: &str) -> error::Result<()> {
        let request = self.action(
            self.endpoint()?,
            wire::DELETE_SHOPPING_ITEM,
            ShoppingRef { shopping_id },
        );
        Self::send(request, wire::DELETE_SHOPPING_ITEM).await
    }
}
