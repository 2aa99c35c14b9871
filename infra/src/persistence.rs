use std::fmt;

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;
use postgres::{GenericClient, IsolationLevel, NoTls, Row, Transaction};
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;

use crate::documents::{Document, Named, Version};
use crate::ids::Id;

#[derive(Error, Debug, PartialEq, Eq)]
#[error(display = "stale version")]
pub struct ConcurrencyError;

/// How to match the `name` member of a document, ignoring case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameQuery {
    Containing(String),
    Exactly(String),
}

/// Read access to the document collections.
pub trait Storage {
    fn load<D: Document>(&mut self, id: &Id<D>) -> Result<Option<D>>;
    /// Every document of the collection, in the order they were first stored.
    fn load_all<D: Document>(&mut self) -> Result<Vec<D>>;
    fn find_named<D: Document + Named>(&mut self, query: &NameQuery) -> Result<Vec<D>>;
}

pub trait Store: Storage {
    /// A consistent view across collections for the lifetime of the value.
    type Snapshot<'a>: Storage
    where
        Self: 'a;

    fn setup(&mut self) -> Result<()>;
    fn save<D: Document>(&mut self, document: &mut D) -> Result<Version>;
    fn snapshot(&mut self) -> Result<Self::Snapshot<'_>>;
}

pub struct Documents {
    client: postgres::Client,
}

pub struct DocumentSnapshot<'a> {
    txn: Transaction<'a>,
}

pub struct DocumentConnectionManager {
    inner: PostgresConnectionManager<NoTls>,
}

const SETUP_SQL: &str = include_str!("persistence.sql");
const LOAD_SQL: &str = "SELECT body FROM documents WHERE collection = $1 AND id = $2";
const LOAD_ALL_SQL: &str = "SELECT body FROM documents WHERE collection = $1 ORDER BY seq";
const FIND_CONTAINING_SQL: &str = "SELECT body FROM documents \
                                   WHERE collection = $1 \
                                   AND strpos(lower(body ->> 'name'), lower($2)) > 0 \
                                   ORDER BY seq";
const FIND_EXACTLY_SQL: &str = "SELECT body FROM documents \
                                WHERE collection = $1 \
                                AND lower(body ->> 'name') = lower($2) \
                                ORDER BY seq";
const INSERT_SQL: &str = "WITH a AS (
                              SELECT $2::jsonb AS body
                          )
                          INSERT INTO documents (collection, id, body)
                          SELECT $1::text, a.body ->> '_id',
                              jsonb_set(a.body, '{_version}', to_jsonb(to_hex(txid_current())))
                          FROM a
                          WHERE NOT EXISTS (
                              SELECT 1 FROM documents d WHERE d.id = a.body ->> '_id'
                          )";
const UPDATE_SQL: &str = "WITH a AS (
                              SELECT $2::jsonb AS body
                          )
                          UPDATE documents AS d
                              SET body = jsonb_set(a.body, '{_version}', to_jsonb(to_hex(txid_current())))
                              FROM a
                              WHERE d.collection = $1::text
                              AND d.id = a.body ->> '_id'
                              AND d.body -> '_version' = a.body -> '_version'";
const VERSION_SQL: &str = "SELECT to_hex(txid_current())";

impl Documents {
    pub fn wrap(client: postgres::Client) -> Self {
        Documents { client }
    }

    pub fn client(&mut self) -> &mut postgres::Client {
        &mut self.client
    }
}

impl Storage for Documents {
    fn load<D: Document>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        load(&mut self.client, id)
    }

    fn load_all<D: Document>(&mut self) -> Result<Vec<D>> {
        load_all(&mut self.client)
    }

    fn find_named<D: Document + Named>(&mut self, query: &NameQuery) -> Result<Vec<D>> {
        find_named(&mut self.client, query)
    }
}

impl Store for Documents {
    type Snapshot<'a> = DocumentSnapshot<'a>;

    fn setup(&mut self) -> Result<()> {
        self.client
            .batch_execute(SETUP_SQL)
            .context("create document schema")?;
        Ok(())
    }

    fn save<D: Document>(&mut self, document: &mut D) -> Result<Version> {
        let json = serde_json::to_value(&*document).context("encode document")?;
        let mut t = self.client.transaction()?;

        let nrows = if document.meta().version.is_new() {
            t.execute(INSERT_SQL, &[&D::COLLECTION, &json])?
        } else {
            t.execute(UPDATE_SQL, &[&D::COLLECTION, &json])?
        };
        debug!("Save {} modified {} rows", document.meta().id, nrows);
        if nrows != 1 {
            warn!("Save of {} impacted {} rows not 1", document.meta().id, nrows);
            return Err(ConcurrencyError.into());
        }

        let version: String = t.query_one(VERSION_SQL, &[])?.try_get(0)?;
        t.commit()?;

        let version = Version::from(version);
        document.meta_mut().version = version.clone();
        Ok(version)
    }

    fn snapshot(&mut self) -> Result<DocumentSnapshot<'_>> {
        let txn = self
            .client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .context("begin snapshot")?;
        Ok(DocumentSnapshot { txn })
    }
}

impl<'a> Storage for DocumentSnapshot<'a> {
    fn load<D: Document>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        load(&mut self.txn, id)
    }

    fn load_all<D: Document>(&mut self) -> Result<Vec<D>> {
        load_all(&mut self.txn)
    }

    fn find_named<D: Document + Named>(&mut self, query: &NameQuery) -> Result<Vec<D>> {
        find_named(&mut self.txn, query)
    }
}

fn load<C: GenericClient, D: Document>(conn: &mut C, id: &Id<D>) -> Result<Option<D>> {
    let row = conn.query_opt(LOAD_SQL, &[&D::COLLECTION, &id.to_string()])?;
    let doc = row.map(|row| decode::<D>(&row)).transpose()?;
    debug!("Load {} -> found:{}", id, doc.is_some());
    Ok(doc)
}

fn load_all<C: GenericClient, D: Document>(conn: &mut C) -> Result<Vec<D>> {
    let rows = conn.query(LOAD_ALL_SQL, &[&D::COLLECTION])?;
    debug!("Load all {}: {} rows", D::COLLECTION, rows.len());
    rows.iter().map(decode).collect()
}

fn find_named<C: GenericClient, D: Document>(conn: &mut C, query: &NameQuery) -> Result<Vec<D>> {
    let rows = match query {
        NameQuery::Containing(name) => conn.query(FIND_CONTAINING_SQL, &[&D::COLLECTION, name])?,
        NameQuery::Exactly(name) => conn.query(FIND_EXACTLY_SQL, &[&D::COLLECTION, name])?,
    };
    debug!("Find {} {:?}: {} rows", D::COLLECTION, query, rows.len());
    rows.iter().map(decode).collect()
}

fn decode<D: Document>(row: &Row) -> Result<D> {
    let json: Value = row.try_get(0)?;
    let doc = serde_json::from_value(json)
        .with_context(|| format!("decode document from {}", D::COLLECTION))?;
    Ok(doc)
}

impl DocumentConnectionManager {
    pub fn new(inner: PostgresConnectionManager<NoTls>) -> Self {
        DocumentConnectionManager { inner }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        let config = url
            .parse::<postgres::Config>()
            .context("parse postgres url")?;
        Ok(Self::new(PostgresConnectionManager::new(config, NoTls)))
    }
}

impl r2d2::ManageConnection for DocumentConnectionManager {
    type Connection = Documents;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Documents, postgres::Error> {
        self.inner.connect().map(Documents::wrap)
    }

    fn is_valid(&self, conn: &mut Documents) -> Result<(), postgres::Error> {
        self.inner.is_valid(&mut conn.client)
    }

    fn has_broken(&self, conn: &mut Documents) -> bool {
        self.inner.has_broken(&mut conn.client)
    }
}

impl fmt::Debug for DocumentConnectionManager {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DocumentConnectionManager").finish()
    }
}

impl fmt::Debug for Documents {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Documents").finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents::{DocMeta, HasMeta};
    use crate::ids::{Entity, Id};
    use r2d2::Pool;
    use rand::random;
    use serde::{Deserialize, Serialize};
    use std::env;

    #[derive(Debug)]
    struct UseTempSchema(String);

    impl r2d2::CustomizeConnection<Documents, postgres::Error> for UseTempSchema {
        fn on_acquire(&self, conn: &mut Documents) -> Result<(), postgres::Error> {
            conn.client()
                .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.0))?;
            conn.client()
                .batch_execute(&format!("SET search_path TO \"{}\"", self.0))?;
            Ok(())
        }
    }

    fn pool(schema: &str) -> Option<Pool<DocumentConnectionManager>> {
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
        let pool = r2d2::Pool::builder()
            .max_size(2)
            .connection_customizer(Box::new(UseTempSchema(schema.to_string())))
            .build(manager)
            .expect("pool");

        let mut conn = pool.get().expect("temp connection");
        conn.client()
            .batch_execute("DROP TABLE IF EXISTS documents")
            .expect("drop documents");
        debug!("Init schema in {}", schema);
        conn.setup().expect("setup");

        Some(pool)
    }

    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Default)]
    struct ADocument {
        #[serde(flatten)]
        meta: DocMeta<ADocument>,
        name: String,
    }

    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Default)]
    struct Other {
        #[serde(flatten)]
        meta: DocMeta<Other>,
        name: String,
    }

    impl Entity for ADocument {
        const PREFIX: &'static str = "adocument";
        const COLLECTION: &'static str = "adocuments";
    }

    impl HasMeta for ADocument {
        fn meta(&self) -> &DocMeta<Self> {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut DocMeta<Self> {
            &mut self.meta
        }
    }

    impl Named for ADocument {
        fn name(&self) -> &str {
            &self.name
        }
    }

    impl Entity for Other {
        const PREFIX: &'static str = "other";
        const COLLECTION: &'static str = "others";
    }

    impl HasMeta for Other {
        fn meta(&self) -> &DocMeta<Self> {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut DocMeta<Self> {
            &mut self.meta
        }
    }

    fn named(name: &str) -> ADocument {
        ADocument {
            meta: DocMeta::new_with_id(random()),
            name: name.to_string(),
        }
    }

    #[test]
    fn load_missing_document_should_return_none() {
        let pool = match pool("load_missing_document_should_return_none") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        let loaded = docs
            .load::<ADocument>(&random::<Id<ADocument>>())
            .expect("load");

        assert_eq!(None, loaded);
    }

    #[test]
    fn save_load() {
        let pool = match pool("save_load") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        let mut some_doc = named("Dave");
        for i in 0..4 {
            docs.save(&mut named(&format!("before {}", i)))
                .expect("save");
        }
        docs.save(&mut some_doc).expect("save");
        for i in 0..4 {
            docs.save(&mut named(&format!("after {}", i))).expect("save");
        }

        let loaded = docs.load(&some_doc.meta.id).expect("load");
        info!("Loaded document: {:?}", loaded);

        assert_eq!(Some(some_doc), loaded);
    }

    #[test]
    fn should_update_on_overwrite() {
        let pool = match pool("should_update_on_overwrite") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        let mut some_doc = named("Version 1");
        docs.save(&mut some_doc).expect("save original");

        some_doc.name = "Version 2".to_string();
        docs.save(&mut some_doc).expect("save modified");

        let loaded = docs.load(&some_doc.meta.id).expect("load");

        assert_eq!(Some("Version 2".to_string()), loaded.map(|d| d.name));
    }

    #[test]
    fn should_fail_on_overwrite_with_new() {
        let pool = match pool("should_fail_on_overwrite_with_new") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        let mut some_doc = named("Version 1");
        docs.save(&mut some_doc).expect("save original");

        let mut modified_doc = ADocument {
            meta: DocMeta::new_with_id(some_doc.meta.id),
            name: "Version 2".to_string(),
        };
        let err = docs.save(&mut modified_doc).expect_err("save should fail");

        assert_eq!(
            err.downcast_ref::<ConcurrencyError>(),
            Some(&ConcurrencyError),
            "Error: {:?}",
            err
        );
    }

    #[test]
    fn load_all_keeps_store_order_within_collection() {
        let pool = match pool("load_all_keeps_store_order_within_collection") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        for name in &["Zebra", "Apple", "Mango"] {
            docs.save(&mut named(name)).expect("save");
        }
        docs.save(&mut Other {
            meta: DocMeta::new_with_id(random()),
            name: "Apple".to_string(),
        })
        .expect("save other");

        let names = docs
            .load_all::<ADocument>()
            .expect("load all")
            .into_iter()
            .map(|d| d.name)
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["Zebra", "Apple", "Mango"]);
    }

    #[test]
    fn find_named_ignores_case() {
        let pool = match pool("find_named_ignores_case") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        for name in &["Margarita", "Strawberry Margarita", "Mojito"] {
            docs.save(&mut named(name)).expect("save");
        }

        let mut snapshot = docs.snapshot().expect("snapshot");
        let containing = snapshot
            .find_named::<ADocument>(&NameQuery::Containing("MARGA".into()))
            .expect("find containing");
        let exactly = snapshot
            .find_named::<ADocument>(&NameQuery::Exactly("margarita".into()))
            .expect("find exactly");

        assert_eq!(
            containing.into_iter().map(|d| d.name).collect::<Vec<_>>(),
            vec!["Margarita", "Strawberry Margarita"]
        );
        assert_eq!(
            exactly.into_iter().map(|d| d.name).collect::<Vec<_>>(),
            vec!["Margarita"]
        );
    }

    #[test]
    fn find_containing_treats_query_as_literal() {
        let pool = match pool("find_containing_treats_query_as_literal") {
            Some(pool) => pool,
            None => return,
        };
        let mut docs = pool.get().expect("temp connection");

        docs.save(&mut named("Mai Tai")).expect("save");

        let found = docs
            .find_named::<ADocument>(&NameQuery::Containing("M.*".into()))
            .expect("find");

        assert!(found.is_empty(), "found: {:?}", found);
    }
}
