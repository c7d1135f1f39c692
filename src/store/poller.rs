/*!
 * Change Poller
 * Long-polls the repository and invalidates the top level on change
 */

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use super::context::StoreContext;
use super::Store;
use crate::core::serde::to_secs_f64;

pub fn spawn(store: Weak<Store>, ctx: Arc<StoreContext>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("uvfs-poller".to_string())
        .spawn(move || run(&store, &ctx))
}

fn run(store: &Weak<Store>, ctx: &StoreContext) {
    let max_delay = ctx.config.poll_max_delay;
    let refresh_after = ctx.config.refresh_after.as_secs_f64();
    let mut prev = to_secs_f64(SystemTime::now());
    info!("change poller started");
    loop {
        if ctx.is_shutdown() {
            break;
        }
        thread::sleep(ctx.config.poll_pause);
        let Some(store) = store.upgrade() else {
            break;
        };
        store.reap_expired();

        match ctx.repo.patient_mod_time(max_delay, prev) {
            Ok(None) => {
                info!("repository shut down; poller exiting");
                break;
            }
            Ok(Some(modified)) if modified > prev => {
                debug!(modified, prev, "repository changed");
                prev = modified;
                store.invalidate_top_level();
            }
            Ok(Some(_)) => {}
            Err(e) => warn!(error = %e, "modification poll failed"),
        }

        let now = to_secs_f64(SystemTime::now());
        if now > prev + refresh_after {
            debug!("periodic top-level refresh");
            prev = now;
            store.invalidate_top_level();
        }
    }
    debug!("change poller stopped");
}
