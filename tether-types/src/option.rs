//! The option store: ordered, bounded, unique-key metadata.

use crate::error::Status;
use crate::limits::OPTION_MAX;
use crate::name::validate_name;
use crate::value::{Convert, FromValue, Value};
use serde::{Deserialize, Serialize};

/// One named value inside an [`OptionStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    /// Unique name within the store. Dotted names (`mqtt.host`) are plain
    /// names; path-style addressing is a naming convention.
    pub name: String,
    /// The stored value.
    pub value: Value,
}

/// An insertion-ordered mapping from option name to [`Value`].
///
/// Used both as per-item metadata (units, thresholds) and as the
/// process-wide configuration store. Keys are unique; `set` on an existing
/// key replaces type and payload together. Capacity is bounded by the
/// store's limit ([`OPTION_MAX`] by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionStore {
    entries: Vec<OptionEntry>,
    limit: usize,
}

impl OptionStore {
    /// Create an empty store with the default capacity.
    pub fn new() -> Self {
        Self::with_limit(OPTION_MAX)
    }

    /// Create an empty store with an explicit capacity.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    /// Number of stored options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.iter()
    }

    /// Look up an entry's value by name.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    /// Create or overwrite an option.
    ///
    /// Overwriting replaces both the type and the payload of the prior
    /// entry; its buffers are released with it.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid name, [`Status::Full`] when a
    /// new entry would exceed the store's capacity.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Status> {
        validate_name(name)?;
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.value = value;
            return Ok(());
        }
        if self.entries.len() >= self.limit {
            return Err(Status::Full);
        }
        self.entries.push(OptionEntry {
            name: name.to_owned(),
            value,
        });
        Ok(())
    }

    /// Typed read with optional coercion.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] when the name is absent; [`Status::BadRequest`]
    /// on a kind mismatch that `convert` does not permit. A failed read
    /// does not mutate the store.
    pub fn get<T: FromValue>(&self, name: &str, convert: Convert) -> Result<T, Status> {
        let value = self.find(name).ok_or(Status::NotFound)?;
        value.extract(convert)
    }

    /// Borrow a raw payload as one slice.
    ///
    /// With [`Convert::Loose`], a stored string is readable as its UTF-8
    /// bytes.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] when absent, [`Status::BadRequest`] when the
    /// entry is neither raw nor (loosely) a string.
    pub fn get_raw(&self, name: &str, convert: Convert) -> Result<&[u8], Status> {
        let value = self.find(name).ok_or(Status::NotFound)?;
        match (value, convert) {
            (Value::Raw(bytes), _) => Ok(bytes),
            (Value::String(s), Convert::Loose) => Ok(s.as_bytes()),
            _ => Err(Status::BadRequest),
        }
    }

    /// Remove an option.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] when the name is absent.
    pub fn unset(&mut self, name: &str) -> Result<(), Status> {
        let index = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or(Status::NotFound)?;
        self.entries.remove(index);
        Ok(())
    }
}

impl Default for OptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn set_then_get_roundtrips() {
        let mut store = OptionStore::new();
        store.set("interval", 30u32).unwrap();
        assert_eq!(store.get::<u32>("interval", Convert::Exact), Ok(30));
    }

    #[test]
    fn get_converts_only_when_loose() {
        let mut store = OptionStore::new();
        store.set("interval", 30u32).unwrap();
        assert_eq!(store.get::<u8>("interval", Convert::Exact), Err(Status::BadRequest));
        assert_eq!(store.get::<u8>("interval", Convert::Loose), Ok(30));
    }

    #[test]
    fn missing_name_is_not_found() {
        let store = OptionStore::new();
        assert_eq!(store.get::<bool>("absent", Convert::Loose), Err(Status::NotFound));
    }

    #[test]
    fn overwrite_replaces_type_and_payload() {
        let mut store = OptionStore::new();
        store.set("mode", "eco").unwrap();
        store.set("mode", 2i32).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("mode").map(Value::kind), Some(ValueKind::Int32));
        assert_eq!(store.get::<i32>("mode", Convert::Exact), Ok(2));
    }

    #[test]
    fn capacity_is_bounded() {
        let mut store = OptionStore::with_limit(2);
        store.set("a", 1i32).unwrap();
        store.set("b", 2i32).unwrap();
        assert_eq!(store.set("c", 3i32), Err(Status::Full));
        // Overwriting at capacity still works.
        assert_eq!(store.set("a", 9i32), Ok(()));
    }

    #[test]
    fn names_are_validated() {
        let mut store = OptionStore::new();
        assert_eq!(store.set("a|b", 1i32), Err(Status::BadRequest));
        assert_eq!(store.set("", 1i32), Err(Status::BadRequest));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut store = OptionStore::new();
        for name in ["z", "a", "m"] {
            store.set(name, 0i32).unwrap();
        }
        let names: Vec<&str> = store.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn raw_reads_borrow_the_payload() {
        let mut store = OptionStore::new();
        store.set("blob", &b"\x00\x01"[..]).unwrap();
        assert_eq!(store.get_raw("blob", Convert::Exact), Ok(&b"\x00\x01"[..]));
        store.set("text", "abc").unwrap();
        assert_eq!(store.get_raw("text", Convert::Exact), Err(Status::BadRequest));
        assert_eq!(store.get_raw("text", Convert::Loose), Ok(&b"abc"[..]));
    }

    #[test]
    fn unset_removes() {
        let mut store = OptionStore::new();
        store.set("a", 1i32).unwrap();
        store.unset("a").unwrap();
        assert_eq!(store.unset("a"), Err(Status::NotFound));
        assert!(store.is_empty());
    }
}
