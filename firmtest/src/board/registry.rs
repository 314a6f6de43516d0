//! Global registry of board profiles.

use std::sync::{LazyLock, PoisonError, RwLock};

use indexmap::IndexMap;

use super::profile::BoardProfile;
use crate::error::{DeviceError, Result};

static REGISTRY: LazyLock<RwLock<BoardRegistry>> =
    LazyLock::new(|| RwLock::new(BoardRegistry::with_builtins()));

/// Board profiles by name, in registration order.
#[derive(Debug, Default)]
pub struct BoardRegistry {
    boards: IndexMap<String, BoardProfile>,
}

impl BoardRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in profiles.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for profile in [
            BoardProfile::zephyr_uart(),
            BoardProfile::zephyr_rtt(),
            BoardProfile::sense_core(),
        ] {
            registry.boards.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// The process-wide registry.
    pub fn global() -> &'static RwLock<BoardRegistry> {
        &REGISTRY
    }

    /// Clone a profile out of the global registry.
    pub fn lookup(name: &str) -> Result<BoardProfile> {
        let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        registry.get(name).cloned().ok_or_else(|| {
            DeviceError::UnknownBoard {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Add a profile to the global registry.
    pub fn register_global(profile: BoardProfile) -> Result<()> {
        REGISTRY
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(profile)
    }

    /// Add a profile. Names are unique.
    pub fn register(&mut self, profile: BoardProfile) -> Result<()> {
        if self.boards.contains_key(&profile.name) {
            return Err(DeviceError::AlreadyRegistered { name: profile.name }.into());
        }
        self.boards.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BoardProfile> {
        self.boards.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.boards.contains_key(name)
    }

    /// Registered names, oldest first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(String::as_str)
    }
}
