use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct Counters {
    pub w_upgrade: AtomicI64,
    pub w_upgrade_30: AtomicI64,
    pub w_reject: AtomicI64,
    pub w_reject_30: AtomicI64,
    pub w_connect: AtomicI64,
    pub w_connect_30: AtomicI64,
    pub login: AtomicI64,
    pub login_30: AtomicI64,
    pub w_disconnect: AtomicI64,
    pub w_disconnect_30: AtomicI64,
    pub logout: AtomicI64,
    pub logout_30: AtomicI64,
    pub subscribe: AtomicI64,
    pub subscribe_30: AtomicI64,
    pub unsubscribe: AtomicI64,
    pub unsubscribe_30: AtomicI64,
    pub w_bad_method: AtomicI64,
    pub w_bad_method_30: AtomicI64,
    pub w_error: AtomicI64,
    pub w_error_30: AtomicI64,
    pub bbs_message: AtomicI64,
    pub bbs_message_30: AtomicI64,
    pub bbs_bad_method: AtomicI64,
    pub bbs_bad_method_30: AtomicI64,
    pub bbs_error: AtomicI64,
    pub bbs_error_30: AtomicI64,
    pub bbs_drops: AtomicI64,
    pub bbs_drops_30: AtomicI64,
    pub ws_drops: AtomicI64,
    pub ws_drops_30: AtomicI64,
    pub ep_point_drops: AtomicI64,
    pub ep_point_drops_30: AtomicI64,
    pub ep_client_drops: AtomicI64,
    pub ep_client_drops_30: AtomicI64,
}

/// A snapshot suitable for JSON serialization on the status route.
#[derive(serde::Serialize)]
pub struct CountersSnapshot {
    pub w_upgrade: i64,
    pub w_upgrade_30: i64,
    pub w_reject: i64,
    pub w_reject_30: i64,
    pub w_connect: i64,
    pub w_connect_30: i64,
    pub login: i64,
    pub login_30: i64,
    pub w_disconnect: i64,
    pub w_disconnect_30: i64,
    pub logout: i64,
    pub logout_30: i64,
    pub subscribe: i64,
    pub subscribe_30: i64,
    pub unsubscribe: i64,
    pub unsubscribe_30: i64,
    pub w_bad_method: i64,
    pub w_bad_method_30: i64,
    pub w_error: i64,
    pub w_error_30: i64,
    pub bbs_message: i64,
    pub bbs_message_30: i64,
    pub bbs_bad_method: i64,
    pub bbs_bad_method_30: i64,
    pub bbs_error: i64,
    pub bbs_error_30: i64,
    pub bbs_drops: i64,
    pub bbs_drops_30: i64,
    pub ws_drops: i64,
    pub ws_drops_30: i64,
    pub ep_point_drops: i64,
    pub ep_point_drops_30: i64,
    pub ep_client_drops: i64,
    pub ep_client_drops_30: i64,
}

macro_rules! bump {
    ($self:ident, $field:ident, $field30:ident) => {
        pub fn $field(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            self.$field30.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl Counters {
    bump!(self, count_w_upgrade, w_upgrade_30);
    bump!(self, count_w_reject, w_reject_30);
    bump!(self, count_w_connect, w_connect_30);
    bump!(self, count_login, login_30);
    bump!(self, count_w_disconnect, w_disconnect_30);
    bump!(self, count_logout, logout_30);
    bump!(self, count_subscribe, subscribe_30);
    bump!(self, count_unsubscribe, unsubscribe_30);
    bump!(self, count_w_bad_method, w_bad_method_30);
    bump!(self, count_w_error, w_error_30);
    bump!(self, count_bbs_message, bbs_message_30);
    bump!(self, count_bbs_bad_method, bbs_bad_method_30);
    bump!(self, count_bbs_error, bbs_error_30);
    bump!(self, count_bbs_drops, bbs_drops_30);

    /// One wallet-service drop event, carrying the endpoints and clients it
    /// took down with it — mirrors the original `CountWSDrop(epoints, clients)`.
    pub fn count_ws_drop(&self, endpoints: i64, clients: i64) {
        self.ws_drops.fetch_add(1, Ordering::Relaxed);
        self.ws_drops_30.fetch_add(1, Ordering::Relaxed);
        self.ep_point_drops.fetch_add(endpoints, Ordering::Relaxed);
        self.ep_point_drops_30.fetch_add(endpoints, Ordering::Relaxed);
        self.ep_client_drops.fetch_add(clients, Ordering::Relaxed);
        self.ep_client_drops_30.fetch_add(clients, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let l = |a: &AtomicI64| a.load(Ordering::Relaxed);
        CountersSnapshot {
            w_upgrade: l(&self.w_upgrade),
            w_upgrade_30: l(&self.w_upgrade_30),
            w_reject: l(&self.w_reject),
            w_reject_30: l(&self.w_reject_30),
            w_connect: l(&self.w_connect),
            w_connect_30: l(&self.w_connect_30),
            login: l(&self.login),
            login_30: l(&self.login_30),
            w_disconnect: l(&self.w_disconnect),
            w_disconnect_30: l(&self.w_disconnect_30),
            logout: l(&self.logout),
            logout_30: l(&self.logout_30),
            subscribe: l(&self.subscribe),
            subscribe_30: l(&self.subscribe_30),
            unsubscribe: l(&self.unsubscribe),
            unsubscribe_30: l(&self.unsubscribe_30),
            w_bad_method: l(&self.w_bad_method),
            w_bad_method_30: l(&self.w_bad_method_30),
            w_error: l(&self.w_error),
            w_error_30: l(&self.w_error_30),
            bbs_message: l(&self.bbs_message),
            bbs_message_30: l(&self.bbs_message_30),
            bbs_bad_method: l(&self.bbs_bad_method),
            bbs_bad_method_30: l(&self.bbs_bad_method_30),
            bbs_error: l(&self.bbs_error),
            bbs_error_30: l(&self.bbs_error_30),
            bbs_drops: l(&self.bbs_drops),
            bbs_drops_30: l(&self.bbs_drops_30),
            ws_drops: l(&self.ws_drops),
            ws_drops_30: l(&self.ws_drops_30),
            ep_point_drops: l(&self.ep_point_drops),
            ep_point_drops_30: l(&self.ep_point_drops_30),
            ep_client_drops: l(&self.ep_client_drops),
            ep_client_drops_30: l(&self.ep_client_drops_30),
        }
    }

    fn reset30(&self) {
        let z = |a: &AtomicI64| a.store(0, Ordering::Relaxed);
        z(&self.w_upgrade_30);
        z(&self.w_reject_30);
        z(&self.w_connect_30);
        z(&self.login_30);
        z(&self.w_disconnect_30);
        z(&self.logout_30);
        z(&self.subscribe_30);
        z(&self.unsubscribe_30);
        z(&self.w_bad_method_30);
        z(&self.w_error_30);
        z(&self.bbs_message_30);
        z(&self.bbs_bad_method_30);
        z(&self.bbs_error_30);
        z(&self.bbs_drops_30);
        z(&self.ws_drops_30);
        z(&self.ep_point_drops_30);
        z(&self.ep_client_drops_30);
    }
}

/// Spawns the 30-minute counter-window reset loop.
pub fn spawn_reset_task(counters: Arc<Counters>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30 * 60));
        tick.tick().await; // first tick fires immediately; skip it
        loop {
            tick.tick().await;
            counters.reset30();
            tracing::debug!("30-minute counters reset");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset30_zeroes_window_not_total() {
        let c = Counters::default();
        c.count_login();
        c.count_login();
        assert_eq!(c.login.load(Ordering::Relaxed), 2);
        assert_eq!(c.login_30.load(Ordering::Relaxed), 2);
        c.reset30();
        assert_eq!(c.login.load(Ordering::Relaxed), 2);
        assert_eq!(c.login_30.load(Ordering::Relaxed), 0);
    }
}
