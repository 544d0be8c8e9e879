//! Discriminator-keyed layouts for multi-schema files.

use std::collections::HashSet;
use std::fmt;

use hopper_core::error::{Error, Result};
use hopper_core::schema::DataType;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::layout::ColumnLayout;

/// Insertion-ordered mapping from discriminator value to layout.
///
/// Keys are unique and all have the same length in characters. Duplicate
/// keys are an error everywhere, including while deserialising; there is no
/// last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMap {
    entries: Vec<(String, ColumnLayout)>,
    key_len: usize,
}

impl SchemaMap {
    pub fn new(entries: Vec<(String, ColumnLayout)>) -> Result<Self> {
        let Some((first, _)) = entries.first() else {
            return Err(Error::config("schema map has no entries"));
        };
        let key_len = first.chars().count();
        if key_len == 0 {
            return Err(Error::config("schema map key is empty"));
        }

        let mut seen = HashSet::new();
        for (key, _) in &entries {
            if !seen.insert(key.as_str()) {
                return Err(Error::config(format!("duplicate schema map key '{key}'")));
            }
            let len = key.chars().count();
            if len != key_len {
                return Err(Error::config(format!(
                    "schema map key '{key}' has {len} characters, expected {key_len}"
                )));
            }
        }
        Ok(Self { entries, key_len })
    }

    /// Parse `{ key: {"colspecs": [[offset, length], ...], "colnames": [...], "dtypes"?: [...]} }`.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Length in characters shared by every key.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&ColumnLayout> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn entry(&self, slot: usize) -> Option<(&str, &ColumnLayout)> {
        self.entries.get(slot).map(|(k, l)| (k.as_str(), l))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnLayout)> {
        self.entries.iter().map(|(k, l)| (k.as_str(), l))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct EntryDoc {
    colspecs: Vec<(usize, usize)>,
    colnames: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dtypes: Option<Vec<String>>,
}

impl EntryDoc {
    fn into_layout(self, key: &str) -> Result<ColumnLayout> {
        let dtypes = self
            .dtypes
            .map(|names| {
                names
                    .iter()
                    .map(|n| DataType::parse(n))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        ColumnLayout::from_parts(&self.colspecs, &self.colnames, dtypes.as_deref())
            .map_err(|e| Error::config(format!("schema '{key}': {e}")))
    }
}

impl<'de> Deserialize<'de> for SchemaMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = SchemaMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from discriminator to {colspecs, colnames}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<SchemaMap, A::Error> {
                let mut entries: Vec<(String, ColumnLayout)> = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(de::Error::custom(format!("duplicate schema map key '{key}'")));
                    }
                    let doc: EntryDoc = map.next_value()?;
                    let layout = doc.into_layout(&key).map_err(de::Error::custom)?;
                    entries.push((key, layout));
                }
                SchemaMap::new(entries).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Serialize for SchemaMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, layout) in &self.entries {
            let doc = EntryDoc {
                colspecs: layout.columns().iter().map(|c| (c.offset, c.width)).collect(),
                colnames: layout.columns().iter().map(|c| c.name.clone()).collect(),
                dtypes: layout
                    .columns()
                    .iter()
                    .any(|c| c.dtype.is_some())
                    .then(|| {
                        layout
                            .columns()
                            .iter()
                            .map(|c| c.dtype.unwrap_or(DataType::Utf8).name().to_string())
                            .collect()
                    }),
            };
            map.serialize_entry(key, &doc)?;
        }
        map.end()
    }
}
