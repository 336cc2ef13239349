//! Lightweight wall-clock profiler shared across one query.
//!
//! A disabled profiler (the default) records nothing and costs one branch.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    start: Instant,
    finish: Instant,
}

impl Profile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn finish(&self) -> Instant {
        self.finish
    }

    pub fn duration(&self) -> Duration {
        self.finish.duration_since(self.start)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Profiler {
    profiles: Option<Arc<Mutex<Vec<Profile>>>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            profiles: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn disabled() -> Self {
        Self { profiles: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.profiles.is_some()
    }

    /// Start timing `name`; the entry is appended when the guard drops.
    pub fn record(&self, name: impl Into<String>) -> ProfileGuard {
        ProfileGuard {
            profiles: self.profiles.clone(),
            name: name.into(),
            start: Instant::now(),
        }
    }

    pub fn all(&self) -> Vec<Profile> {
        match &self.profiles {
            Some(p) => p.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            None => Vec::new(),
        }
    }
}

/// RAII timer returned by [`Profiler::record`].
pub struct ProfileGuard {
    profiles: Option<Arc<Mutex<Vec<Profile>>>>,
    name: String,
    start: Instant,
}

impl Drop for ProfileGuard {
    fn drop(&mut self) {
        if let Some(profiles) = &self.profiles {
            let entry = Profile {
                name: std::mem::take(&mut self.name),
                start: self.start,
                finish: Instant::now(),
            };
            profiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entry);
        }
    }
}
