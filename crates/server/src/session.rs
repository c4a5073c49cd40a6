//! Session lifecycle
//!
//! One `Session` per connected client. The session owns the barge-in
//! coordinator and the last-vision-image slot; the manager owns the
//! session table, capacity, and idle expiry.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use avatar_core::{InterruptCoordinator, VisionImage};

use crate::ServerError;

/// Per-connection session state.
pub struct Session {
    pub id: String,
    pub persona_id: String,
    pub user_id: Option<String>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
    active: RwLock<bool>,
    /// Barge-in flag + current turn cancellation.
    pub coordinator: Arc<InterruptCoordinator>,
    /// Last captured vision image, replaced on every frame.
    vision: Mutex<Option<VisionImage>>,
}

impl Session {
    pub fn new(id: impl Into<String>, persona_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            persona_id: persona_id.into(),
            user_id,
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            active: RwLock::new(true),
            coordinator: Arc::new(InterruptCoordinator::new()),
            vision: Mutex::new(None),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    pub fn close(&self) {
        *self.active.write() = false;
        self.coordinator.cancel_current();
    }

    pub fn is_active(&self) -> bool {
        *self.active.read()
    }

    /// Replace the vision slot with a freshly captured image.
    pub fn set_vision(&self, bytes: Vec<u8>) {
        *self.vision.lock() = Some(VisionImage::new(bytes));
    }

    /// Snapshot for inlining into the current turn (age < 30 s).
    pub fn vision_inline_url(&self) -> Option<String> {
        self.vision
            .lock()
            .as_ref()
            .filter(|image| image.fresh_for_inline())
            .map(VisionImage::data_url)
    }

    /// Snapshot for tool-invoked style requests (age < 5 min).
    pub fn vision_recent_url(&self) -> Option<String> {
        self.vision
            .lock()
            .as_ref()
            .filter(|image| image.fresh_for_tools())
            .map(VisionImage::data_url)
    }
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_config(
            max_sessions,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        )
    }

    pub fn with_config(
        max_sessions: usize,
        session_timeout: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Start the background expiry task. Returns a shutdown sender.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let before = manager.count();
                        manager.cleanup_expired();
                        let after = manager.count();
                        if before != after {
                            tracing::info!(
                                removed = before - after,
                                remaining = after,
                                "expired sessions cleaned up"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Create a new session.
    pub fn create(
        &self,
        persona_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Session("max sessions reached".to_string()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(&id, persona_id, user_id));
        sessions.insert(id.clone(), session.clone());

        tracing::info!(session_id = %id, persona_id = %session.persona_id, "session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        if let Some(session) = self.sessions.write().remove(id) {
            session.close();
            tracing::info!(session_id = %id, "session removed");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions);
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                session.close();
                tracing::info!(session_id = %id, "session expired");
            }
        }
    }
}
