//! Stitches the independently stored collections together by name.
//!
//! Every lookup here is a soft reference: a name that cannot be resolved
//! leaves the referring entry without an image rather than failing.

use std::collections::HashMap;

use log::*;

use infra::documents::Named;

use super::models::{Drink, Glass, Illustrated, Ingredient, Reference, UsedInDrinks};

/// Exact, case sensitive name lookup over one collection. When names
/// collide the first record wins.
#[derive(Debug)]
pub struct NameIndex<'a, T> {
    by_name: HashMap<&'a str, &'a T>,
}

impl<'a, T: Named> NameIndex<'a, T> {
    pub fn build(records: &'a [T]) -> Self {
        let mut by_name = HashMap::with_capacity(records.len());
        for record in records {
            by_name.entry(record.name()).or_insert(record);
        }
        NameIndex { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&'a T> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl<'a, T: Named + Illustrated> NameIndex<'a, T> {
    fn image_of(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(Illustrated::image)
            .map(str::to_string)
    }

    fn attach_image(&self, reference: &mut Reference) {
        reference.image = self.image_of(&reference.name);
        if reference.image.is_none() {
            trace!("No image for {:?}", reference.name);
        }
    }
}

pub fn enrich_drink(
    mut drink: Drink,
    ingredients: &NameIndex<Ingredient>,
    glasses: &NameIndex<Glass>,
) -> Drink {
    for ingredient in drink.ingredients.iter_mut() {
        ingredients.attach_image(ingredient);
    }
    if let Some(glass) = drink.glass.as_mut() {
        glasses.attach_image(glass);
    }
    drink
}

pub fn enrich_ingredient(ingredient: Ingredient, drinks: &NameIndex<Drink>) -> Ingredient {
    enrich_used_in(ingredient, drinks)
}

pub fn enrich_glass(glass: Glass, drinks: &NameIndex<Drink>) -> Glass {
    enrich_used_in(glass, drinks)
}

fn enrich_used_in<T: UsedInDrinks>(mut record: T, drinks: &NameIndex<Drink>) -> T {
    for drink in record.drinks_mut().iter_mut() {
        drinks.attach_image(drink);
    }
    record
}
