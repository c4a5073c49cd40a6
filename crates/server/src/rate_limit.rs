//! Per-connection inbound budget
//!
//! Fixed one-second windows for message count and audio volume; protects
//! the transcriber channel from runaway clients.

use std::time::{Duration, Instant};
use thiserror::Error;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("too many messages ({0}/s)")]
    Messages(u32),

    #[error("too much audio ({0} bytes/s)")]
    Audio(usize),
}

/// Sliding-window limiter, one per connection.
pub struct RateLimiter {
    messages_per_second: u32,
    audio_bytes_per_second: usize,
    window_start: Instant,
    messages: u32,
    audio_bytes: usize,
}

impl RateLimiter {
    pub fn new(messages_per_second: u32, audio_bytes_per_second: usize) -> Self {
        Self {
            messages_per_second,
            audio_bytes_per_second,
            window_start: Instant::now(),
            messages: 0,
            audio_bytes: 0,
        }
    }

    fn roll_window(&mut self) {
        if self.window_start.elapsed() >= WINDOW {
            self.window_start = Instant::now();
            self.messages = 0;
            self.audio_bytes = 0;
        }
    }

    pub fn check_message(&mut self) -> Result<(), RateLimitError> {
        self.roll_window();
        self.messages += 1;
        if self.messages > self.messages_per_second {
            return Err(RateLimitError::Messages(self.messages_per_second));
        }
        Ok(())
    }

    pub fn check_audio(&mut self, bytes: usize) -> Result<(), RateLimitError> {
        self.roll_window();
        self.audio_bytes += bytes;
        if self.audio_bytes > self.audio_bytes_per_second {
            return Err(RateLimitError::Audio(self.audio_bytes_per_second));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_budget_trips() {
        let mut limiter = RateLimiter::new(2, 1024);
        assert!(limiter.check_message().is_ok());
        assert!(limiter.check_message().is_ok());
        assert!(limiter.check_message().is_err());
    }

    #[test]
    fn audio_budget_trips() {
        let mut limiter = RateLimiter::new(10, 100);
        assert!(limiter.check_audio(60).is_ok());
        assert!(limiter.check_audio(60).is_err());
    }
}
