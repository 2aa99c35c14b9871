use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use infra::documents::Document;
use infra::ids::Id;
use infra::persistence::Store;

use super::models::{Drink, Glass, Ingredient};
use super::Catalog;
use crate::error::Error;
use crate::services::{Commandable, Request};

/// The on-disk shape of a catalog dump.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub drinks: Vec<Value>,
    #[serde(default)]
    pub ingredients: Vec<Value>,
    #[serde(default)]
    pub glasses: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ImportCatalog {
    pub catalog: CatalogFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub drinks: usize,
    pub ingredients: usize,
    pub glasses: usize,
}

impl CatalogFile {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        let catalog = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse catalog from {:?}", path))?;
        Ok(catalog)
    }
}

impl ImportCatalog {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let catalog = CatalogFile::from_path(path)?;
        Ok(ImportCatalog { catalog })
    }
}

impl Request for ImportCatalog {
    type Resp = ImportSummary;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static>
    Commandable<ImportCatalog> for Catalog<M>
{
    fn execute(&self, req: ImportCatalog) -> Result<ImportSummary, Error> {
        let CatalogFile {
            drinks,
            ingredients,
            glasses,
        } = req.catalog;
        let mut conn = self.connection()?;

        let summary = ImportSummary {
            drinks: import_all::<Drink, D>(&mut *conn, drinks)?,
            ingredients: import_all::<Ingredient, D>(&mut *conn, ingredients)?,
            glasses: import_all::<Glass, D>(&mut *conn, glasses)?,
        };
        info!("Imported {:?}", summary);
        Ok(summary)
    }
}

/// Ids minted elsewhere are hashed into ours, so the same source record
/// always lands on the same document.
fn rekeyed<T: Document>(foreign: &str) -> Id<T> {
    trace!("Re-keying foreign {} id {:?}", T::COLLECTION, foreign);
    Id::hashed(foreign)
}

/// Saves each record, deriving an id from the name when there is none and
/// overwriting whatever is already stored under that id.
fn import_all<T: Document, S: Store>(store: &mut S, records: Vec<Value>) -> anyhow::Result<usize> {
    let mut count = 0;
    for mut record in records {
        let fields = record
            .as_object_mut()
            .ok_or_else(|| anyhow!("{} record is not an object", T::COLLECTION))?;
        let id = match fields.get("_id") {
            Some(Value::String(raw)) => raw
                .parse::<Id<T>>()
                .unwrap_or_else(|_| rekeyed::<T>(raw)),
            Some(other) => rekeyed::<T>(&other.to_string()),
            None => {
                let name = fields.get("name").and_then(Value::as_str).ok_or_else(|| {
                    anyhow!("{} record has neither _id nor name", T::COLLECTION)
                })?;
                Id::<T>::hashed(name)
            }
        };
        fields.insert("_id".to_string(), Value::String(id.to_string()));
        fields.remove("_version");

        let mut doc: T = serde_json::from_value(record)
            .with_context(|| format!("decode {} record", T::COLLECTION))?;
        if let Some(existing) = store.load::<T>(&doc.meta().id)? {
            doc.meta_mut().version = existing.meta().version.clone();
        }
        let version = store.save(&mut doc)?;
        trace!("Saved {} at {}", doc.meta().id, version);
        count += 1;
    }
    debug!("Imported {} {}", count, T::COLLECTION);
    Ok(count)
}
