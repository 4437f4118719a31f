//! A store shared between threads.
//!
//! Mutation needs the write lock and excludes every reader, so a pull or a
//! pattern match always sees both indexes in the same state. Reads may run
//! side by side, including on background threads through
//! [`SharedStore::spawn_pull`].

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use tracing::debug;

use crate::assertion::{AssertReport, Facts};
use crate::construct::{Attribute, Eid};
use crate::error::{Result, TriplError};
use crate::pattern::Pattern;
use crate::pull::{PullExpr, PullTarget, Record};
use crate::store::Store;

#[derive(Clone)]
pub struct SharedStore {
    store: Arc<RwLock<Store>>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Runs `f` under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&Store) -> T) -> Result<T> {
        let guard = self
            .store
            .read()
            .map_err(|e| TriplError::Lock(e.to_string()))?;
        Ok(f(&guard))
    }

    /// Runs `f` under the write lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut Store) -> T) -> Result<T> {
        let mut guard = self
            .store
            .write()
            .map_err(|e| TriplError::Lock(e.to_string()))?;
        Ok(f(&mut guard))
    }

    pub fn pull(&self, expr: &PullExpr, target: impl Into<PullTarget>) -> Result<Record> {
        let target = target.into();
        self.read(|store| store.pull(expr, target))?
    }

    pub fn match_pattern(&self, pattern: &Pattern) -> Result<BTreeSet<Eid>> {
        self.read(|store| store.match_pattern(pattern))
    }

    pub fn assert_facts(&self, facts: Facts<'static>, id_attrs: &[Attribute]) -> Result<AssertReport> {
        self.write(|store| store.assert_facts(facts, id_attrs))?
    }

    /// Pulls on a background thread.
    pub fn spawn_pull(&self, expr: PullExpr, target: PullTarget) -> JoinHandle<Result<Record>> {
        let shared = self.clone();
        std::thread::spawn(move || {
            debug!(%expr, "pull started");
            shared.pull(&expr, target)
        })
    }

    /// Gives the store back once no other handle is left.
    pub fn into_inner(self) -> Result<Store> {
        let lock = Arc::try_unwrap(self.store)
            .map_err(|_| TriplError::Lock("the store is still shared".into()))?;
        lock.into_inner().map_err(|e| TriplError::Lock(e.to_string()))
    }
}
