use log::*;
use r2d2::Pool;

use infra::documents::{Document, Named};
use infra::persistence::{NameQuery, Storage, Store};

use crate::error::{Error, NotFound};
use crate::services::{Queryable, Request};

pub mod enrich;
pub mod import;
pub mod models;
mod resources;
pub mod search;

pub use self::enrich::{enrich_drink, enrich_glass, enrich_ingredient, NameIndex};
pub use self::import::{CatalogFile, ImportCatalog, ImportSummary};
pub use self::models::{Catalogued, Drink, Glass, Ingredient, Reference};

/// Read access to drinks, ingredients and glasses, enriched with each
/// other's images.
#[derive(Debug)]
pub struct Catalog<M: r2d2::ManageConnection> {
    db: Pool<M>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListDrinks {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowDrink {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListIngredients {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowIngredient {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListGlasses {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowGlass {
    pub name: String,
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static> Catalog<M> {
    pub fn new(db: Pool<M>) -> Self {
        Catalog { db }
    }

    pub fn setup(&self) -> Result<(), Error> {
        debug!("Init schema");
        self.db.get()?.setup()?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> Result<r2d2::PooledConnection<M>, Error> {
        Ok(self.db.get()?)
    }
}

impl<M: r2d2::ManageConnection> Clone for Catalog<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        Catalog { db }
    }
}

/// Records whose names contain `name`, or the whole collection when no
/// name is given. A name that matches nothing is an error; an empty
/// collection is not.
fn select<S: Storage, D: Document + Named + Catalogued>(
    store: &mut S,
    name: Option<&str>,
) -> Result<Vec<D>, Error> {
    match name.filter(|n| !n.is_empty()) {
        None => Ok(store.load_all()?),
        Some(name) => {
            let found = store.find_named(&NameQuery::Containing(name.to_string()))?;
            if found.is_empty() {
                return Err(NotFound::containing::<D>(name).into());
            }
            Ok(found)
        }
    }
}

fn select_one<S: Storage, D: Document + Named + Catalogued>(
    store: &mut S,
    name: &str,
) -> Result<D, Error> {
    let candidates = store.find_named(&NameQuery::Exactly(name.to_string()))?;
    if candidates.len() > 1 {
        debug!(
            "{} {} records named {:?}; using the first",
            candidates.len(),
            D::COLLECTION,
            name
        );
    }
    search::find_exact(candidates, name).ok_or_else(|| NotFound::named::<D>(name).into())
}

fn enrich_drinks<S: Storage>(store: &mut S, drinks: Vec<Drink>) -> Result<Vec<Drink>, Error> {
    let ingredients = store.load_all::<Ingredient>()?;
    let glasses = store.load_all::<Glass>()?;
    let ingredients = NameIndex::build(&ingredients);
    let glasses = NameIndex::build(&glasses);
    trace!(
        "Enrich {} drinks from {} ingredients, {} glasses",
        drinks.len(),
        ingredients.len(),
        glasses.len()
    );

    Ok(drinks
        .into_iter()
        .map(|drink| enrich_drink(drink, &ingredients, &glasses))
        .collect())
}

fn enrich_ingredients<S: Storage>(
    store: &mut S,
    ingredients: Vec<Ingredient>,
) -> Result<Vec<Ingredient>, Error> {
    let drinks = store.load_all::<Drink>()?;
    let drinks = NameIndex::build(&drinks);

    Ok(ingredients
        .into_iter()
        .map(|ingredient| enrich_ingredient(ingredient, &drinks))
        .collect())
}

fn enrich_glasses<S: Storage>(store: &mut S, glasses: Vec<Glass>) -> Result<Vec<Glass>, Error> {
    let drinks = store.load_all::<Drink>()?;
    let drinks = NameIndex::build(&drinks);

    Ok(glasses
        .into_iter()
        .map(|glass| enrich_glass(glass, &drinks))
        .collect())
}

fn single<T>(mut records: Vec<T>) -> Result<T, Error> {
    records
        .pop()
        .ok_or_else(|| Error::Unhandled(anyhow::anyhow!("enrichment dropped a record")))
}

impl Request for ListDrinks {
    type Resp = Vec<Drink>;
}

impl Request for ShowDrink {
    type Resp = Drink;
}

impl Request for ListIngredients {
    type Resp = Vec<Ingredient>;
}

impl Request for ShowIngredient {
    type Resp = Ingredient;
}

impl Request for ListGlasses {
    type Resp = Vec<Glass>;
}

impl Request for ShowGlass {
    type Resp = Glass;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static> Queryable<ListDrinks>
    for Catalog<M>
{
    fn query(&self, req: ListDrinks) -> Result<Vec<Drink>, Error> {
        let mut conn = self.db.get()?;
        // Every collection read below comes from the same snapshot.
        let mut snapshot = conn.snapshot()?;
        let drinks = select(&mut snapshot, req.name.as_deref())?;
        enrich_drinks(&mut snapshot, drinks)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static> Queryable<ShowDrink>
    for Catalog<M>
{
    fn query(&self, req: ShowDrink) -> Result<Drink, Error> {
        let mut conn = self.db.get()?;
        let mut snapshot = conn.snapshot()?;
        let drink = select_one(&mut snapshot, &req.name)?;
        single(enrich_drinks(&mut snapshot, vec![drink])?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static>
    Queryable<ListIngredients> for Catalog<M>
{
    fn query(&self, req: ListIngredients) -> Result<Vec<Ingredient>, Error> {
        let mut conn = self.db.get()?;
        let mut snapshot = conn.snapshot()?;
        let ingredients = select(&mut snapshot, req.name.as_deref())?;
        enrich_ingredients(&mut snapshot, ingredients)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static>
    Queryable<ShowIngredient> for Catalog<M>
{
    fn query(&self, req: ShowIngredient) -> Result<Ingredient, Error> {
        let mut conn = self.db.get()?;
        let mut snapshot = conn.snapshot()?;
        let ingredient = select_one(&mut snapshot, &req.name)?;
        single(enrich_ingredients(&mut snapshot, vec![ingredient])?)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static> Queryable<ListGlasses>
    for Catalog<M>
{
    fn query(&self, req: ListGlasses) -> Result<Vec<Glass>, Error> {
        let mut conn = self.db.get()?;
        let mut snapshot = conn.snapshot()?;
        let glasses = select(&mut snapshot, req.name.as_deref())?;
        enrich_glasses(&mut snapshot, glasses)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static> Queryable<ShowGlass>
    for Catalog<M>
{
    fn query(&self, req: ShowGlass) -> Result<Glass, Error> {
        let mut conn = self.db.get()?;
        let mut snapshot = conn.snapshot()?;
        let glass = select_one(&mut snapshot, &req.name)?;
        single(enrich_glasses(&mut snapshot, vec![glass])?)
    }
}
