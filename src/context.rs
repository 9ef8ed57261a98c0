//! credentials and cancellation shared by one detection session
//!
//! One [`ProbeContext`] is built per session and passed explicitly to every
//! probe. `cancel` is the only operation meant to be called from another
//! thread while detection runs, so the context is normally held in an `Arc`.

use crate::error::Error;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Callback asked for a password the first time a format needs one
pub type PasswordProvider = Box<dyn Fn() -> Option<String> + Send + Sync>;

#[derive(Default)]
pub struct ProbeContext {
    password: Option<String>,
    provider: Option<PasswordProvider>,
    provided: Mutex<Option<Option<String>>>,
    cancelled: AtomicBool,
    password_requested: AtomicBool,
    last_fatal_error: Mutex<Option<String>>,
}

impl ProbeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn with_password_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Ask for the session password on behalf of a format.
    ///
    /// Marks the session as having requested a password even when none is
    /// available. The provider runs at most once per session and without any
    /// lock held, since it may block on a human.
    pub fn request_password(&self) -> Option<String> {
        self.password_requested.store(true, Ordering::SeqCst);

        if let Some(password) = &self.password {
            return Some(password.clone());
        }
        let provider = self.provider.as_ref()?;
        if let Some(cached) = self.provided.lock().as_ref() {
            return cached.clone();
        }

        let answer = provider().filter(|password| !password.is_empty());
        let mut slot = self.provided.lock();
        slot.get_or_insert(answer).clone()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn password_requested(&self) -> bool {
        self.password_requested.load(Ordering::SeqCst)
    }

    /// Request cancellation. Once set it stays set.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Remember a fatal error; only the first one is kept
    pub fn record_fatal(&self, error: &Error) {
        let mut slot = self.last_fatal_error.lock();
        if slot.is_none() {
            *slot = Some(error.to_string());
        }
    }

    pub fn last_fatal_error(&self) -> Option<String> {
        self.last_fatal_error.lock().clone()
    }
}

impl std::fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeContext")
            .field("has_password", &self.password.is_some())
            .field("has_provider", &self.provider.is_some())
            .field("cancelled", &self.is_cancelled())
            .field("password_requested", &self.password_requested())
            .finish()
    }
}
