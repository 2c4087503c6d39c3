use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use larder_core::engine::SyncReport;
use larder_core::error::SyncError;
use larder_core::state::Loadable;

use super::Engine;
use super::helpers::print_pending_table;
use crate::config::Config;

const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Run sync passes until one succeeds, a non-transient error shows up, or `retries`
/// extra attempts are used up. The wait grows linearly with each attempt.
///
/// Both outcomes carry the number of passes actually run.
pub(crate) async fn sync_with_retries(
    engine: &Engine,
    retries: u32,
    backoff: Duration,
) -> Result<(SyncReport, u32), (SyncError, u32)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match engine.sync_pending().await {
            Ok(report) => return Ok((report, attempt)),
            Err(e) if e.is_retryable() && attempt <= retries => {
                warn!(attempt, error = %e, "sync failed, retrying");
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}

pub(crate) async fn cmd_sync(
    engine: &Engine,
    config: &Config,
    retries: u32,
    json: bool,
) -> Result<()> {
    config.require_remote()?;
    let pending = engine.pending().await.len();
    let (report, attempts) = match sync_with_retries(engine, retries, RETRY_BACKOFF).await {
        Ok(done) => done,
        Err((e, attempts)) => {
            return Err(anyhow::Error::new(e).context(format!(
                "Sync failed after {attempts} attempt(s), {pending} change(s) kept"
            )));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Synced: {} sent, {} already applied, {} superseded by other devices",
            report.replayed, report.skipped, report.conflicts
        );
        if attempts > 1 {
            println!("  (succeeded on attempt {attempts})");
        }
        if !report.refreshed {
            eprintln!("Warning: could not refresh after syncing, showing cached state");
        }
    }

    Ok(())
}

pub(crate) async fn cmd_refresh(engine: &Engine, config: &Config, json: bool) -> Result<()> {
    config.require_remote()?;
    let state = engine
        .refresh()
        .await
        .context("Failed to fetch household state")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!(
            "Fetched {} meal(s), {} ingredient(s), {} shopping entr{}",
            state.proposals.len(),
            state.ingredients.len(),
            state.shopping.len(),
            if state.shopping.len() == 1 { "y" } else { "ies" }
        );
    }

    Ok(())
}

pub(crate) async fn cmd_pending(engine: &Engine, json: bool) -> Result<()> {
    let ops = engine.pending().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
    } else if ops.is_empty() {
        println!("Nothing waiting to sync.");
    } else {
        print_pending_table(&ops);
    }

    Ok(())
}

#[derive(Serialize)]
struct StatusView {
    state: &'static str,
    proposals: usize,
    ingredients: usize,
    shopping: usize,
    pending: usize,
    backend: Option<String>,
    cache: String,
}

pub(crate) async fn cmd_status(engine: &Engine, config: &Config, json: bool) -> Result<()> {
    let current = engine.state();
    let snapshot = current.data().cloned().unwrap_or_default();
    let view = StatusView {
        state: match current {
            Loadable::Idle => "never synced",
            Loadable::Loading => "loading",
            Loadable::Ready(_) => "ready",
            Loadable::Error(_) => "error",
        },
        proposals: snapshot.proposals.len(),
        ingredients: snapshot.ingredients.len(),
        shopping: snapshot.shopping.len(),
        pending: engine.pending().await.len(),
        backend: config.base_url.clone(),
        cache: config.db_path.display().to_string(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("State:    {}", view.state);
        println!(
            "Data:     {} meal(s), {} ingredient(s), {} shopping entries",
            view.proposals, view.ingredients, view.shopping
        );
        println!("Pending:  {}", view.pending);
        println!(
            "Backend:  {}",
            view.backend.as_deref().unwrap_or("not configured")
        );
        println!("Cache:    {}", view.cache);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpMenuClient;
    use larder_core::engine::SyncEngine;
    use larder_core::models::MealProposal;
    use larder_core::store::SqliteStore;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine(server: &MockServer) -> Engine {
        SyncEngine::new(
            HttpMenuClient::new(Some(server.uri()), Some("tok".to_string())).unwrap(),
            SqliteStore::open_in_memory().unwrap(),
        )
    }

    fn empty_state() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "proposals": [], "ingredients": [], "shopping": []
        }))
    }

    #[tokio::test]
    async fn test_retry_recovers_from_outage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(empty_state())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine(&server);
        let proposal = MealProposal::new("dinner", "Stew", "", "ana").unwrap();
        engine.save_proposal(proposal).await.unwrap();

        let (report, attempts) = sync_with_retries(&engine, 2, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(report.replayed, 1);
        assert!(engine.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_retry_gives_up_and_keeps_queue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let engine = engine(&server);
        let proposal = MealProposal::new("lunch", "Salad", "", "ana").unwrap();
        engine.save_proposal(proposal).await.unwrap();

        let (err, attempts) = sync_with_retries(&engine, 1, Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(attempts, 2);
        assert_eq!(engine.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_error_reports_attempts_made() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let engine = engine(&server);
        engine
            .save_proposal(MealProposal::new("dinner", "Curry", "", "ana").unwrap())
            .await
            .unwrap();
        let config = Config {
            db_path: "larder.db".into(),
            config_path: "config.toml".into(),
            base_url: Some(server.uri()),
            token: Some("tok".to_string()),
            author: "ana".to_string(),
        };

        let err = cmd_sync(&engine, &config, 0, true).await.unwrap_err();

        assert_eq!(err.to_string(), "Sync failed after 1 attempt(s), 1 change(s) kept");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_failure_is_retried_as_whole_pass() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(empty_state())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let engine = engine(&server);
        engine
            .save_proposal(MealProposal::new("dinner", "Tacos", "", "ana").unwrap())
            .await
            .unwrap();

        let (report, attempts) = sync_with_retries(&engine, 2, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(report.replayed, 1);
        assert!(report.refreshed);
    }
}
