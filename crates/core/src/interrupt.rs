//! Interrupt/barge-in coordination
//!
//! One coordinator per session owns the `avatar_speaking` flag and the
//! cancellation signal of the current turn. Barge-in is a single method
//! that atomically reads-and-clears the flag and cancels the handle; the
//! flag is single-shot per turn, so a second consecutive interruption does
//! not re-fire.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// In-flight orchestration handle for one user utterance.
///
/// Created when a final transcript is accepted; terminates on
/// stop/tool_calls/error/cancel.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    token: CancellationToken,
}

impl TurnHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for TurnHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session barge-in coordinator.
#[derive(Debug, Default)]
pub struct InterruptCoordinator {
    speaking: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new turn. The speaking flag starts cleared; the TTS sink
    /// sets it on its first chunk.
    pub fn begin_turn(&self) -> TurnHandle {
        let handle = TurnHandle::new();
        *self.current.lock() = Some(handle.token());
        self.speaking.store(false, Ordering::SeqCst);
        handle
    }

    /// Clear turn state after the terminal event.
    pub fn finish_turn(&self) {
        *self.current.lock() = None;
        self.speaking.store(false, Ordering::SeqCst);
    }

    /// The TTS sink received its first chunk for this turn.
    pub fn mark_speaking(&self) {
        self.speaking.store(true, Ordering::SeqCst);
    }

    pub fn clear_speaking(&self) {
        self.speaking.store(false, Ordering::SeqCst);
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Barge-in: if the avatar was speaking, clear the flag, cancel the
    /// current turn, and return true (emit `user_spoke` exactly once).
    pub fn barge_in(&self) -> bool {
        if self.speaking.swap(false, Ordering::SeqCst) {
            if let Some(token) = self.current.lock().as_ref() {
                token.cancel();
            }
            true
        } else {
            false
        }
    }

    /// Cancel the current turn without the barge-in protocol (client end,
    /// session shutdown).
    pub fn cancel_current(&self) {
        if let Some(token) = self.current.lock().as_ref() {
            token.cancel();
        }
        self.speaking.store(false, Ordering::SeqCst);
    }
}
