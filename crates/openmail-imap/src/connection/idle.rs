//! Background IDLE monitoring (RFC 2177).
//!
//! One task shares the session's connection mutex. While idling it
//! holds the lock and waits on the socket; a foreground command rings
//! the interrupt `Notify` before taking the lock, which bounces the
//! monitor off the socket immediately. The monitor re-enters IDLE only
//! after the activation delay has passed since the last foreground
//! command, so bursts of commands do not churn IDLE/DONE pairs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::session::{Conn, SessionState};
use crate::error::Error;

/// Refresh IDLE before the RFC 2177 30-minute server limit.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(29 * 60);

/// Delay after the last foreground command before (re-)entering IDLE.
pub const IDLE_ACTIVATION_DELAY: Duration = Duration::from_secs(5);

/// Backoff after a failed IDLE attempt.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Event delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailEvent {
    /// The mailbox grew; `exists` is the server's new message count.
    NewMail {
        /// Message count reported by EXISTS.
        exists: u32,
    },
    /// A message was expunged.
    Expunged {
        /// Sequence number of the expunged message.
        seq: u32,
    },
    /// The connection is gone (server BYE or socket failure). The
    /// session is unusable; observers may build a new one.
    Disconnected {
        /// Server text or error description.
        reason: String,
    },
}

/// Handle over the spawned monitor task.
pub(crate) struct IdleMonitor {
    handle: JoinHandle<()>,
    stopped: Arc<AtomicBool>,
    stop: Arc<Notify>,
    interrupt: Arc<Notify>,
}

impl IdleMonitor {
    /// Spawns the monitor over a shared connection.
    pub(crate) fn spawn<S>(conn: Arc<Mutex<Conn<S>>>, interrupt: Arc<Notify>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let stopped = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(run(
            conn,
            Arc::clone(&interrupt),
            Arc::clone(&stopped),
            Arc::clone(&stop),
        ));

        Self {
            handle,
            stopped,
            stop,
            interrupt,
        }
    }

    /// Stops the monitor and waits for the task to finish. The IDLE
    /// still active on the wire is left for the caller to suspend.
    pub(crate) async fn stop(self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();
        self.interrupt.notify_waiters();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "IDLE monitor task panicked");
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn run<S>(
    conn: Arc<Mutex<Conn<S>>>,
    interrupt: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    stop: Arc<Notify>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let mut guard = conn.lock().await;
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        match guard.state {
            SessionState::LoggedOut | SessionState::Disconnected => {
                debug!("IDLE monitor stopping: session not usable");
                break;
            }
            _ => {}
        }

        if guard.idle.is_none() {
            // Debounce: let bursts of foreground commands finish
            let since_activity = guard.last_activity.elapsed();
            if since_activity < IDLE_ACTIVATION_DELAY {
                drop(guard);
                wait_or_stop(IDLE_ACTIVATION_DELAY - since_activity, &stop).await;
                continue;
            }

            if let Err(e) = guard.ensure_inbox_selected().await {
                if terminal(&guard, &e) {
                    break;
                }
                warn!(error = %e, "IDLE monitor could not select INBOX");
                drop(guard);
                wait_or_stop(RETRY_DELAY, &stop).await;
                continue;
            }

            if let Err(e) = guard.enter_idle().await {
                if terminal(&guard, &e) {
                    break;
                }
                warn!(error = %e, "IDLE command failed");
                drop(guard);
                wait_or_stop(RETRY_DELAY, &stop).await;
                continue;
            }
        }

        // Refresh before the server's 30-minute limit
        let idle_for = guard
            .idle
            .as_ref()
            .map_or(Duration::ZERO, |idle| idle.entered_at.elapsed());
        if idle_for >= IDLE_TIMEOUT {
            if let Err(e) = guard.refresh_idle().await {
                if terminal(&guard, &e) {
                    break;
                }
                warn!(error = %e, "IDLE refresh failed");
                drop(guard);
                wait_or_stop(RETRY_DELAY, &stop).await;
            }
            continue;
        }
        let refresh_in = IDLE_TIMEOUT - idle_for;

        // Wait on the socket, the foreground interrupt, or the refresh
        // deadline, whichever fires first. Partially read lines stay
        // buffered in the framed stream across an interrupt.
        let outcome = tokio::select! {
            result = guard.pump_idle_response() => Some(result),
            () = interrupt.notified() => None,
            () = tokio::time::sleep(refresh_in) => None,
        };

        match outcome {
            Some(Ok(true)) | None => {}
            Some(Ok(false)) => {
                // BYE already surfaced by the pump
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "IDLE read failed");
                guard.fail_disconnected(&e.to_string());
                break;
            }
        }

        drop(guard);
        // Give a waiting foreground command the lock
        tokio::task::yield_now().await;
    }
}

/// True when the error means the session is gone; the pump has already
/// surfaced the event in that case.
fn terminal<S>(guard: &Conn<S>, error: &Error) -> bool {
    matches!(error, Error::LoggedOut(_))
        || matches!(
            guard.state,
            SessionState::LoggedOut | SessionState::Disconnected
        )
}

async fn wait_or_stop(duration: Duration, stop: &Notify) {
    tokio::select! {
        () = tokio::time::sleep(duration) => {}
        () = stop.notified() => {}
    }
}
