mod helpers;
mod ingredient;
mod proposal;
mod shopping;
mod sync;

use larder_core::engine::SyncEngine;
use larder_core::store::SqliteStore;

use crate::client::HttpMenuClient;

pub(crate) use ingredient::{
    cmd_ingredient_add, cmd_ingredient_list, cmd_ingredient_remove, cmd_ingredient_rename,
    cmd_ingredient_set_need,
};
pub(crate) use proposal::{cmd_edit, cmd_propose, cmd_remove, cmd_set_status, cmd_show};
pub(crate) use shopping::{cmd_reset, cmd_shop_add, cmd_shop_done, cmd_shop_remove, cmd_shopping};
pub(crate) use sync::{cmd_pending, cmd_refresh, cmd_status, cmd_sync};

pub(crate) type Engine = SyncEngine<HttpMenuClient, SqliteStore>;

/// Reminder printed after a local change: it lives in the queue until the next sync.
pub(super) async fn print_queued_note(engine: &Engine) {
    let pending = engine.pending().await.len();
    let noun = if pending == 1 { "change" } else { "changes" };
    eprintln!("{pending} {noun} waiting to sync (run `larder sync`)");
}
