use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::HostError;
use crate::module::{Module, ModuleContext};

/// Builds a module instance from its context.
pub type Constructor = fn(ModuleContext) -> anyhow::Result<Arc<dyn Module>>;

/// A module type that descriptors can refer to by name.
#[derive(Clone, Copy)]
pub struct ModuleEntry {
    pub name: &'static str,
    pub construct: Constructor,
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry").field("name", &self.name).finish()
    }
}

/// Global distributed slice collecting every linked module type
#[linkme::distributed_slice]
pub static MODULES: [ModuleEntry] = [..];

/// Name to constructor lookup used when instantiating descriptors.
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    entries: BTreeMap<&'static str, ModuleEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every module linked into the binary through [`MODULES`].
    pub fn linked() -> Result<Self, HostError> {
        let mut registry = Self::new();
        for entry in MODULES.iter() {
            registry.register(*entry)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, entry: ModuleEntry) -> Result<(), HostError> {
        match self.entries.entry(entry.name) {
            Entry::Occupied(_) => Err(HostError::DuplicateModule {
                module: entry.name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn with(mut self, entry: ModuleEntry) -> Result<Self, HostError> {
        self.register(entry)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<Constructor, HostError> {
        self.entries
            .get(name)
            .map(|entry| entry.construct)
            .ok_or_else(|| HostError::UnknownModule {
                module: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}
