// Limitation des tentatives de connexion par adresse IP.
// Fenêtre fixe : 5 tentatives par 15 minutes, remise à zéro après un succès.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{AppError, AppResult};

pub const MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Clé utilisée quand l'adresse du client est inconnue
const UNKNOWN_CLIENT: &str = "unknown";

struct Window {
    count: u32,
    started_at: Instant,
}

pub struct LoginLimiter {
    attempts: Mutex<HashMap<String, Window>>,
    max_attempts: u32,
    window: Duration,
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS, LOGIN_WINDOW)
    }
}

impl LoginLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Compte une tentative ; refuse au-delà du quota de la fenêtre
    pub fn check(&self, client: Option<&str>) -> AppResult<()> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: Option<&str>, now: Instant) -> AppResult<()> {
        let key = client.unwrap_or(UNKNOWN_CLIENT);
        let mut attempts = self.attempts.lock();

        // purge des fenêtres écoulées
        attempts.retain(|_, w| now.duration_since(w.started_at) < self.window);

        let window = attempts.entry(key.to_string()).or_insert(Window {
            count: 0,
            started_at: now,
        });
        if window.count >= self.max_attempts {
            warn!("⚠️ Login rate limit reached for {}", key);
            return Err(AppError::TooManyRequests(format!(
                "Too many login attempts, retry in {} minutes",
                self.window.as_secs() / 60
            )));
        }
        window.count += 1;
        Ok(())
    }

    pub fn reset(&self, client: Option<&str>) {
        self.attempts.lock().remove(client.unwrap_or(UNKNOWN_CLIENT));
    }
}
