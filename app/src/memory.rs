//! A document store held in process memory. Serves small demo catalogs and
//! stands in for PostgreSQL in tests.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Context, Result};
use log::*;
use serde_json::Value;

use infra::documents::{Document, Named, Version};
use infra::ids::Id;
use infra::persistence::{ConcurrencyError, NameQuery, Storage, Store};

use crate::catalog::search;

/// Documents keyed by collection, each kept in insertion order.
type Collections = HashMap<&'static str, Vec<Value>>;

#[derive(Debug, Default)]
struct Inner {
    collections: Collections,
    txid: u64,
}

/// A handle onto a shared in-memory store; clones see the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocuments {
    inner: Arc<RwLock<Inner>>,
}

/// A frozen copy of every collection, taken under one lock.
#[derive(Debug)]
pub struct MemorySnapshot {
    collections: Collections,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    docs: MemoryDocuments,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl Storage for MemoryDocuments {
    fn load<D: Document>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        load(&self.read()?.collections, id)
    }

    fn load_all<D: Document>(&mut self) -> Result<Vec<D>> {
        load_all(&self.read()?.collections)
    }

    fn find_named<D: Document + Named>(&mut self, query: &NameQuery) -> Result<Vec<D>> {
        find_named(&self.read()?.collections, query)
    }
}

impl Store for MemoryDocuments {
    type Snapshot<'a> = MemorySnapshot;

    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn save<D: Document>(&mut self, document: &mut D) -> Result<Version> {
        let mut inner = self.write()?;
        let id = document.meta().id.to_string();
        let current = inner
            .collections
            .get(D::COLLECTION)
            .and_then(|docs| docs.iter().position(|doc| doc["_id"] == id.as_str()));

        let stale = match current {
            None => !document.meta().version.is_new(),
            Some(idx) => {
                let stored = &inner.collections[D::COLLECTION][idx]["_version"];
                *stored != document.meta().version.to_string().as_str()
            }
        };
        if stale {
            warn!("Stale save of {} {}", D::COLLECTION, id);
            return Err(ConcurrencyError.into());
        }

        inner.txid += 1;
        let version = Version::from(format!("{:x}", inner.txid));
        let previous = std::mem::replace(&mut document.meta_mut().version, version.clone());
        let json = match serde_json::to_value(&*document) {
            Ok(json) => json,
            Err(e) => {
                document.meta_mut().version = previous;
                return Err(e).context("encode document");
            }
        };

        let docs = inner.collections.entry(D::COLLECTION).or_default();
        match current {
            Some(idx) => docs[idx] = json,
            None => docs.push(json),
        }
        debug!("Saved {} at {}", id, version);
        Ok(version)
    }

    fn snapshot(&mut self) -> Result<MemorySnapshot> {
        let collections = self.read()?.collections.clone();
        Ok(MemorySnapshot { collections })
    }
}

impl Storage for MemorySnapshot {
    fn load<D: Document>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        load(&self.collections, id)
    }

    fn load_all<D: Document>(&mut self) -> Result<Vec<D>> {
        load_all(&self.collections)
    }

    fn find_named<D: Document + Named>(&mut self, query: &NameQuery) -> Result<Vec<D>> {
        find_named(&self.collections, query)
    }
}

fn documents<D: Document>(collections: &Collections) -> &[Value] {
    collections
        .get(D::COLLECTION)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn decode<D: Document>(json: &Value) -> Result<D> {
    let doc = serde_json::from_value(json.clone())
        .with_context(|| format!("decode document from {}", D::COLLECTION))?;
    Ok(doc)
}

fn load<D: Document>(collections: &Collections, id: &Id<D>) -> Result<Option<D>> {
    let id = id.to_string();
    documents::<D>(collections)
        .iter()
        .find(|doc| doc["_id"] == id.as_str())
        .map(decode)
        .transpose()
}

fn load_all<D: Document>(collections: &Collections) -> Result<Vec<D>> {
    documents::<D>(collections).iter().map(decode).collect()
}

fn find_named<D: Document + Named>(collections: &Collections, query: &NameQuery) -> Result<Vec<D>> {
    let all = load_all::<D>(collections)?;
    let found = match query {
        NameQuery::Containing(name) => search::search(all, Some(name)),
        NameQuery::Exactly(_) => all
            .into_iter()
            .filter(|doc| search::matches(query, doc.name()))
            .collect(),
    };
    trace!("Find {} {:?}: {} found", D::COLLECTION, query, found.len());
    Ok(found)
}

impl MemoryConnectionManager {
    pub fn new(docs: MemoryDocuments) -> Self {
        MemoryConnectionManager { docs }
    }
}

impl r2d2::ManageConnection for MemoryConnectionManager {
    type Connection = MemoryDocuments;
    type Error = Infallible;

    fn connect(&self) -> Result<MemoryDocuments, Infallible> {
        Ok(self.docs.clone())
    }

    fn is_valid(&self, _: &mut MemoryDocuments) -> Result<(), Infallible> {
        Ok(())
    }

    fn has_broken(&self, _: &mut MemoryDocuments) -> bool {
        false
    }
}
