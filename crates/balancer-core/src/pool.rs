use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::pidstats::cpu_ticks;
use crate::supervisor::{self, Child, SupervisorConfig, SupervisorError};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no available service slot")]
    Empty,
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

pub struct Slot {
    pub child: Option<Child>,
}

/// A fixed-size collection of supervised children, port allocation, and the
/// two-tier next-child dispatch.
pub struct ServicePool {
    slots: Mutex<Vec<Slot>>,
    rr_cursor: Mutex<usize>,
    port_cursor: Mutex<u16>,
    first_port: u16,
    last_port: u16,
    supervisor_cfg: SupervisorConfig,
    pub dropped_tx: mpsc::Sender<usize>,
    pub restarted_tx: mpsc::Sender<usize>,
    alive_timeout: Duration,
}

impl ServicePool {
    pub async fn new(
        count: usize,
        first_port: u16,
        last_port: u16,
        supervisor_cfg: SupervisorConfig,
        alive_timeout: Duration,
        dropped_tx: mpsc::Sender<usize>,
        restarted_tx: mpsc::Sender<usize>,
    ) -> Result<Arc<Self>, PoolError> {
        let mut port_cursor = first_port;
        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            let port = port_cursor;
            port_cursor = next_port(port_cursor, first_port, last_port);
            let child = supervisor::spawn(index, port, &supervisor_cfg).await?;
            slots.push(Slot { child: Some(child) });
        }

        let pool = Arc::new(Self {
            slots: Mutex::new(slots),
            rr_cursor: Mutex::new(0),
            port_cursor: Mutex::new(port_cursor),
            first_port,
            last_port,
            supervisor_cfg,
            dropped_tx,
            restarted_tx,
            alive_timeout,
        });

        for index in 0..count {
            tokio::spawn(Arc::clone(&pool).run_slot_monitor(index));
        }

        Ok(pool)
    }

    async fn next_port(&self) -> u16 {
        let mut cursor = self.port_cursor.lock().await;
        let port = *cursor;
        *cursor = next_port(port, self.first_port, self.last_port);
        port
    }

    /// Per-slot monitor: resets a timer on every heartbeat, shuts the child
    /// down on silence, and relaunches it on exit. Owns the slot's receivers
    /// for as long as that child instance lives; a relaunch hands it a fresh
    /// pair for the new instance.
    async fn run_slot_monitor(self: Arc<Self>, index: usize) {
        loop {
            let (mut alive_rx, mut exit_rx) = {
                let mut slots = self.slots.lock().await;
                match slots[index].child.as_mut() {
                    Some(child) => {
                        let (empty_tx, empty_rx) = mpsc::channel(1);
                        drop(empty_tx);
                        (std::mem::replace(&mut child.alive_rx, empty_rx), child.exit_rx.clone())
                    }
                    None => return,
                }
            };

            let timeout = tokio::time::sleep(self.alive_timeout);
            tokio::pin!(timeout);
            // Disabled once it fires: shutdown is requested exactly once,
            // then this loop just blocks on `exit_rx` instead of spinning
            // on an already-elapsed timer.
            let mut timeout_active = true;

            loop {
                tokio::select! {
                    _ = &mut timeout, if timeout_active => {
                        let slots = self.slots.lock().await;
                        if let Some(child) = slots[index].child.as_ref() {
                            child.shutdown();
                        }
                        timeout_active = false;
                        // keep waiting for the exit signal below; don't return
                    }
                    got = alive_rx.recv() => {
                        if got.is_some() {
                            timeout.as_mut().reset(tokio::time::Instant::now() + self.alive_timeout);
                            timeout_active = true;
                        }
                    }
                    changed = exit_rx.changed() => {
                        if changed.is_err() || *exit_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Err(e) = self.drop_and_relaunch(index).await {
                tracing::error!(index, error = %e, "failed to relaunch service slot");
                if self.active_count().await == 0 {
                    tracing::error!("all service slots dead after failed relaunch, aborting");
                    std::process::exit(1);
                }
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.slots.lock().await.iter().filter(|s| s.child.is_some()).count()
    }

    /// Empties the slot, announces the drop, relaunches at a fresh port, and
    /// announces the restart. Holds the pool lock across the relaunch —
    /// intentionally, to serialise concurrent relaunch attempts on this slot.
    pub async fn drop_and_relaunch(&self, index: usize) -> Result<(), PoolError> {
        let mut slots = self.slots.lock().await;
        slots[index].child = None;
        drop(slots);

        let _ = self.dropped_tx.send(index).await;

        let port = self.next_port().await;
        let child = supervisor::spawn(index, port, &self.supervisor_cfg).await?;

        let mut slots = self.slots.lock().await;
        slots[index].child = Some(child);
        drop(slots);

        let _ = self.restarted_tx.send(index).await;
        Ok(())
    }

    /// Chooses the next child to serve a new wallet-id: lowest CPU usage
    /// first, round-robin fallback.
    pub async fn get_next(&self) -> Result<usize, PoolError> {
        let slots = self.slots.lock().await;
        if let Some(index) = self.get_next_by_usage(&slots) {
            // Updated even on the usage-tier path: the source advances this
            // cursor unconditionally, which biases later round-robin
            // fallbacks. Preserved here rather than "fixed".
            *self.rr_cursor.lock().await = index + 1;
            return Ok(index);
        }
        self.get_next_by_index(&slots).await
    }

    fn get_next_by_usage(&self, slots: &[Slot]) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (index, slot) in slots.iter().enumerate() {
            let Some(child) = slot.child.as_ref() else { continue };
            let Some(pid) = child.pid() else { continue };
            let Ok(ticks) = cpu_ticks(pid) else { continue };
            if best.map(|(_, best_ticks)| ticks < best_ticks).unwrap_or(true) {
                best = Some((index, ticks));
            }
        }
        best.map(|(index, _)| index)
    }

    async fn get_next_by_index(&self, slots: &[Slot]) -> Result<usize, PoolError> {
        let cursor = *self.rr_cursor.lock().await;
        let n = slots.len();
        for offset in 0..n {
            let index = (cursor + offset) % n;
            if slots[index].child.is_some() {
                return Ok(index);
            }
        }
        Err(PoolError::Empty)
    }

    pub async fn pid_at(&self, index: usize) -> Option<u32> {
        self.slots.lock().await.get(index).and_then(|s| s.child.as_ref()).and_then(|c| c.pid())
    }

    pub async fn port_at(&self, index: usize) -> Option<u16> {
        self.slots.lock().await.get(index).and_then(|s| s.child.as_ref()).map(|c| c.port)
    }

    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn shutdown_all(&self) {
        let slots = self.slots.lock().await;
        for slot in slots.iter() {
            if let Some(child) = slot.child.as_ref() {
                child.shutdown();
            }
        }
    }
}

fn next_port(current: u16, first: u16, last: u16) -> u16 {
    if current >= last {
        first
    } else {
        current + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_cursor_wraps_at_last() {
        assert_eq!(next_port(100, 100, 110), 101);
        assert_eq!(next_port(110, 100, 110), 100);
        assert_eq!(next_port(109, 100, 110), 110);
    }
}
