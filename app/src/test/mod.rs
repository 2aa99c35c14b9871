use std::env;

use log::*;
use r2d2::Pool;

use infra::persistence::{DocumentConnectionManager, Documents};

use crate::catalog::{Catalog, CatalogFile, ImportCatalog};
use crate::memory::{MemoryConnectionManager, MemoryDocuments};
use crate::services::Commandable;

pub(crate) const SEED: &str = include_str!("../../seed/catalog.json");

type PgError = <DocumentConnectionManager as r2d2::ManageConnection>::Error;

#[derive(Debug)]
struct UseTempSchema(String);

impl r2d2::CustomizeConnection<Documents, PgError> for UseTempSchema {
    fn on_acquire(&self, conn: &mut Documents) -> Result<(), PgError> {
        conn.client()
            .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.0))?;
        conn.client()
            .batch_execute(&format!("SET search_path TO \"{}\"", self.0))?;
        Ok(())
    }
}

pub(crate) fn seed() -> CatalogFile {
    serde_json::from_str(SEED).expect("parse seed catalog")
}

pub(crate) fn memory_catalog() -> Catalog<MemoryConnectionManager> {
    let _ = env_logger::try_init();
    let pool = Pool::builder()
        .max_size(2)
        .build(MemoryConnectionManager::new(MemoryDocuments::new()))
        .expect("pool");
    let catalog = Catalog::new(pool);
    catalog
        .execute(ImportCatalog { catalog: seed() })
        .expect("import seed");
    catalog
}

/// A seeded catalog in its own schema, or `None` when `$POSTGRES_URL` is
/// not set.
pub(crate) fn postgres_catalog(schema: &str) -> Option<Catalog<DocumentConnectionManager>> {
    let _ = env_logger::try_init();
    let url = match env::var("POSTGRES_URL") {
        Ok(url) => url,
        Err(_) => {
            info!("$POSTGRES_URL unset; skipping {}", schema);
            return None;
        }
    };
    debug!("Build pool for {}", schema);
    let manager = DocumentConnectionManager::from_url(&url).expect("postgres url");
    let pool = Pool::builder()
        .max_size(2)
        .connection_customizer(Box::new(UseTempSchema(schema.to_string())))
        .build(manager)
        .expect("pool");

    {
        let mut conn = pool.get().expect("temp connection");
        debug!("Clean old tables in {}", schema);
        conn.client()
            .batch_execute("DROP TABLE IF EXISTS documents")
            .expect("drop documents");
    }

    let catalog = Catalog::new(pool);
    catalog.setup().expect("setup");
    catalog
        .execute(ImportCatalog { catalog: seed() })
        .expect("import seed");
    Some(catalog)
}
