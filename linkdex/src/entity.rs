//! Value accessor contract between the entity store and the index engine.

use indexmap::IndexMap;

/// Gives the index engine read access to an entity's attributes.
///
/// Implemented by the entity store for each entity type it wants indexed.
/// `field_value` returns an empty string for an unset field, never an
/// error; the manager refuses to index empty values.
///
/// # Examples
///
/// ```rust
/// use linkdex::entity::Indexable;
///
/// struct User {
///     id: String,
///     email: String,
/// }
///
/// impl Indexable for User {
///     fn type_name(&self) -> &str {
///         "User"
///     }
///
///     fn field_value(&self, field: &str) -> String {
///         match field {
///             "Id" => self.id.clone(),
///             "Email" => self.email.clone(),
///             _ => String::new(),
///         }
///     }
/// }
/// ```
pub trait Indexable {
    /// Type name the indices of this entity are registered under.
    fn type_name(&self) -> &str;

    /// String form of `field`, or an empty string when unset.
    fn field_value(&self, field: &str) -> String;
}

/// Loosely typed entity: a type name plus named string attributes.
///
/// Handy for stores that keep entities as generic records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    type_name: String,
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new(type_name: &str) -> Self {
        Record {
            type_name: type_name.to_string(),
            fields: IndexMap::new(),
        }
    }

    /// Sets `field` and returns the record, for chained construction.
    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: &str) {
        self.fields.insert(field.to_string(), value.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl Indexable for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field_value(&self, field: &str) -> String {
        self.get(field).unwrap_or_default().to_string()
    }
}
