use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use infra::documents::{DocMeta, HasMeta, Named};
use infra::ids::Entity;

/// Attributes we carry through without interpreting them.
pub type Attributes = Map<String, Value>;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Drink {
    #[serde(flatten)]
    pub meta: DocMeta<Drink>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ingredients: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glass: Option<Reference>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Ingredient {
    #[serde(flatten)]
    pub meta: DocMeta<Ingredient>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub drinks: Vec<Reference>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Glass {
    #[serde(flatten)]
    pub meta: DocMeta<Glass>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub drinks: Vec<Reference>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// A soft reference to another record by name. Stored either as a bare
/// name or as an object; always written back as an object.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(from = "ReferenceRepr")]
pub struct Reference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReferenceRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        image: Option<String>,
        #[serde(flatten)]
        attributes: Attributes,
    },
}

/// Records which can lend their image to whatever refers to them.
pub trait Illustrated {
    fn image(&self) -> Option<&str>;
}

/// Records which list the drinks that use them.
pub trait UsedInDrinks {
    fn drinks_mut(&mut self) -> &mut Vec<Reference>;
}

/// How a collection is described to API consumers.
pub trait Catalogued: Entity {
    const TITLE: &'static str;
}

/// Reads an explicit `null` list the same as a missing one.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Reference {
    pub fn to(name: &str) -> Self {
        Reference {
            name: name.to_string(),
            image: None,
            attributes: Attributes::new(),
        }
    }
}

impl From<ReferenceRepr> for Reference {
    fn from(repr: ReferenceRepr) -> Self {
        match repr {
            ReferenceRepr::Name(name) => Reference::to(&name),
            ReferenceRepr::Full {
                name,
                image,
                attributes,
            } => Reference {
                name,
                image,
                attributes,
            },
        }
    }
}

impl Entity for Drink {
    const PREFIX: &'static str = "drink";
    const COLLECTION: &'static str = "drinks";
}

impl Catalogued for Drink {
    const TITLE: &'static str = "Drink";
}

impl HasMeta for Drink {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

impl Named for Drink {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Illustrated for Drink {
    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

impl Entity for Ingredient {
    const PREFIX: &'static str = "ingredient";
    const COLLECTION: &'static str = "ingredients";
}

impl Catalogued for Ingredient {
    const TITLE: &'static str = "Ingredient";
}

impl HasMeta for Ingredient {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

impl Named for Ingredient {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Illustrated for Ingredient {
    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

impl UsedInDrinks for Ingredient {
    fn drinks_mut(&mut self) -> &mut Vec<Reference> {
        &mut self.drinks
    }
}

impl Entity for Glass {
    const PREFIX: &'static str = "glass";
    const COLLECTION: &'static str = "glasses";
}

impl Catalogued for Glass {
    const TITLE: &'static str = "Glass";
}

impl HasMeta for Glass {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}

impl Named for Glass {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Illustrated for Glass {
    fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

impl UsedInDrinks for Glass {
    fn drinks_mut(&mut self) -> &mut Vec<Reference> {
        &mut self.drinks
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use infra::ids::Id;
    use serde_json::json;

    #[test]
    fn should_accept_bare_and_object_references() {
        let drink: Drink = serde_json::from_value(json!({
            "_id": Id::<Drink>::hashed("Mojito").to_string(),
            "name": "Mojito",
            "ingredients": ["Mint", {"name": "Light rum", "measure": "2 oz"}],
            "glass": "Highball glass",
        }))
        .expect("decode drink");

        assert_eq!(drink.ingredients[0], Reference::to("Mint"));
        assert_eq!(drink.ingredients[1].name, "Light rum");
        assert_eq!(drink.ingredients[1].attributes["measure"], json!("2 oz"));
        assert_eq!(drink.glass, Some(Reference::to("Highball glass")));
    }

    #[test]
    fn should_preserve_unknown_attributes() {
        let source = json!({
            "_id": Id::<Glass>::hashed("Tiki mug").to_string(),
            "_version": "1f",
            "name": "Tiki mug",
            "material": "ceramic",
        });
        let glass: Glass = serde_json::from_value(source).expect("decode glass");

        assert_eq!(glass.attributes.get("material"), Some(&json!("ceramic")));
        assert!(!glass.attributes.contains_key("_id"));
        assert!(!glass.attributes.contains_key("name"));

        let written = serde_json::to_value(&glass).expect("encode glass");
        assert_eq!(written["material"], json!("ceramic"));
        assert_eq!(written["drinks"], json!([]));
        assert!(written["_id"].is_string());
    }

    #[test]
    fn should_read_null_lists_as_empty() {
        let drink: Drink = serde_json::from_value(json!({
            "_id": Id::<Drink>::hashed("Water").to_string(),
            "name": "Water",
            "ingredients": null,
            "glass": null,
        }))
        .expect("decode drink");
        let glass: Glass = serde_json::from_value(json!({
            "_id": Id::<Glass>::hashed("Shot glass").to_string(),
            "name": "Shot glass",
            "drinks": null,
        }))
        .expect("decode glass");

        assert!(drink.ingredients.is_empty());
        assert_eq!(drink.glass, None);
        assert_eq!(
            serde_json::to_value(&glass).expect("encode glass")["drinks"],
            json!([])
        );
    }

    #[test]
    fn should_write_references_as_objects_without_missing_images() {
        let written = serde_json::to_value(&Reference::to("Salt")).expect("encode");

        assert_eq!(written, json!({"name": "Salt"}));
    }
}
