use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ids::{Entity, Id};

/// Opaque token assigned by the store on every save.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
pub struct Version(String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(bound = "T: Entity")]
pub struct DocMeta<T> {
    #[serde(rename = "_id")]
    pub id: Id<T>,
    #[serde(rename = "_version", default)]
    pub version: Version,
    #[serde(skip)]
    pub _phantom: PhantomData<T>,
}

pub trait HasMeta: Sized {
    fn meta(&self) -> &DocMeta<Self>;
    fn meta_mut(&mut self) -> &mut DocMeta<Self>;
}

/// Documents that can be looked up by a human readable name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Everything the store needs to persist and reload a document.
pub trait Document: Entity + HasMeta + Serialize + DeserializeOwned {}

impl<T: Entity + HasMeta + Serialize + DeserializeOwned> Document for T {}

impl<T> Default for DocMeta<T> {
    fn default() -> Self {
        let id = Default::default();
        let version = Default::default();
        let _phantom = Default::default();
        DocMeta {
            id,
            version,
            _phantom,
        }
    }
}

impl<T> DocMeta<T> {
    pub fn new_with_id(id: Id<T>) -> Self {
        DocMeta {
            id,
            ..Default::default()
        }
    }
}

impl Version {
    pub fn is_new(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Version {
    fn from(version: String) -> Self {
        Version(version)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(fmt)
    }
}
