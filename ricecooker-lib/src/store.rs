//! Persisted style overrides, keyed by selector.
//!
//! The whole selector map lives under one storage key and is read and
//! written as a single blob. There is no locking: two writers working from
//! the same snapshot will drop one another's changes.

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

pub const DEFAULT_BACKGROUND_SIZE: &str = "cover";
pub const DEFAULT_BACKGROUND_REPEAT: &str = "no-repeat";
pub const DEFAULT_BACKGROUND_POSITION: &str = "center";

/// Style and content properties recorded for one selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Image source, only honored on `<img>` elements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_repeat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_position: Option<String>,
    /// Keys this version does not know about, carried through rewrites.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The four background properties, always written and applied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundImage {
    /// A CSS image value, e.g. `url('https://x/y.png')`.
    pub image: String,
    pub size: String,
    pub repeat: String,
    pub position: String,
}

impl BackgroundImage {
    /// A background from an image URL and a size, with the repeat and
    /// position the Control Panel always uses.
    pub fn from_url(url: &str, size: &str) -> Self {
        BackgroundImage {
            image: format!("url('{}')", url),
            size: size.to_string(),
            repeat: DEFAULT_BACKGROUND_REPEAT.to_string(),
            position: DEFAULT_BACKGROUND_POSITION.to_string(),
        }
    }

    /// `(css property, value)` pairs in application order.
    pub fn declarations(&self) -> [(&'static str, &str); 4] {
        [
            ("background-image", self.image.as_str()),
            ("background-size", self.size.as_str()),
            ("background-repeat", self.repeat.as_str()),
            ("background-position", self.position.as_str()),
        ]
    }
}

impl StyleOverride {
    /// The background group, if an image is recorded. Missing companions
    /// fall back to `cover`, `no-repeat` and `center`.
    pub fn background(&self) -> Option<BackgroundImage> {
        let image = self.background_image.clone()?;
        Some(BackgroundImage {
            image,
            size: self
                .background_size
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKGROUND_SIZE.to_string()),
            repeat: self
                .background_repeat
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKGROUND_REPEAT.to_string()),
            position: self
                .background_position
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKGROUND_POSITION.to_string()),
        })
    }

    pub fn set_background(&mut self, background: &BackgroundImage) {
        self.background_image = Some(background.image.clone());
        self.background_size = Some(background.size.clone());
        self.background_repeat = Some(background.repeat.clone());
        self.background_position = Some(background.position.clone());
    }

    /// Plain style properties as `(css property, value)` pairs.
    pub fn style_declarations(&self) -> Vec<(&'static str, &str)> {
        [
            ("color", &self.color),
            ("background-color", &self.background_color),
            ("font-size", &self.font_size),
            ("font-family", &self.font_family),
        ]
        .into_iter()
        .filter_map(|(prop, value)| value.as_deref().map(|v| (prop, v)))
        .collect()
    }
}

/// The full selector -> override map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleStore {
    entries: BTreeMap<String, StyleOverride>,
}

impl StyleStore {
    /// Read the store from `storage`. A missing key is an empty store.
    pub fn load(storage: &dyn StorageArea, key: &str) -> Result<Self> {
        match storage.get(key)? {
            None | Some(Value::Null) => Ok(StyleStore::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::Storage(format!("'{}' holds malformed overrides: {}", key, e))),
        }
    }

    /// Write the whole store back under `key`.
    pub fn save(&self, storage: &dyn StorageArea, key: &str) -> Result<()> {
        debug!("Saving {} style override(s) under '{}'", self.entries.len(), key);
        storage.set(key, serde_json::to_value(self)?)
    }

    pub fn get(&self, selector: &str) -> Option<&StyleOverride> {
        self.entries.get(selector)
    }

    /// The override for `selector`, created empty if absent.
    pub fn entry(&mut self, selector: &str) -> &mut StyleOverride {
        self.entries.entry(selector.to_string()).or_default()
    }

    pub fn remove(&mut self, selector: &str) -> Option<StyleOverride> {
        self.entries.remove(selector)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StyleOverride)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, StyleOverride)> for StyleStore {
    fn from_iter<I: IntoIterator<Item = (String, StyleOverride)>>(iter: I) -> Self {
        StyleStore {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A flat key-value storage area shared by every surface.
pub trait StorageArea {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// In-process storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.items.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

/// Storage backed by one JSON object file. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStorage { path: path.into() }
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl StorageArea for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(all))?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const KEY: &str = "elementStyles";

    #[test]
    fn wire_format_uses_camel_case_and_skips_unset() {
        let mut store = StyleStore::default();
        store.entry("#hero").color = Some("red".into());
        store.entry("#hero").font_size = Some("16px".into());
        assert_eq!(
            serde_json::to_value(&store).unwrap(),
            json!({"#hero": {"color": "red", "fontSize": "16px"}})
        );
    }

    #[test]
    fn unknown_keys_survive_rewrite() {
        let storage = MemoryStorage::new();
        storage
            .set(KEY, json!({".a": {"color": "blue", "letterSpacing": "2px"}}))
            .unwrap();

        let mut store = StyleStore::load(&storage, KEY).unwrap();
        store.entry(".a").font_family = Some("serif".into());
        store.save(&storage, KEY).unwrap();

        assert_eq!(
            storage.get(KEY).unwrap().unwrap(),
            json!({".a": {"color": "blue", "fontFamily": "serif", "letterSpacing": "2px"}})
        );
    }

    #[test]
    fn background_is_written_as_a_unit() {
        let mut entry = StyleOverride::default();
        entry.set_background(&BackgroundImage::from_url("https://x/y.png", "contain"));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "backgroundImage": "url('https://x/y.png')",
                "backgroundSize": "contain",
                "backgroundRepeat": "no-repeat",
                "backgroundPosition": "center"
            })
        );
    }

    #[test]
    fn background_read_fills_defaults() {
        let entry: StyleOverride =
            serde_json::from_value(json!({"backgroundImage": "url('a.png')"})).unwrap();
        let background = entry.background().unwrap();
        assert_eq!(background.size, "cover");
        assert_eq!(background.repeat, "no-repeat");
        assert_eq!(background.position, "center");

        let no_image: StyleOverride =
            serde_json::from_value(json!({"backgroundSize": "contain"})).unwrap();
        assert!(no_image.background().is_none());
    }

    #[test]
    fn remove_touches_only_its_selector() {
        let storage = MemoryStorage::new();
        storage
            .set(KEY, json!({"#a": {"color": "red"}, ".b": {"color": "blue"}}))
            .unwrap();
        let mut store = StyleStore::load(&storage, KEY).unwrap();
        assert!(store.remove("#a").is_some());
        store.save(&storage, KEY).unwrap();
        assert_eq!(storage.get(KEY).unwrap().unwrap(), json!({".b": {"color": "blue"}}));
    }

    #[test]
    fn malformed_blob_is_a_storage_error() {
        let storage = MemoryStorage::new();
        storage.set(KEY, json!(["not", "a", "map"])).unwrap();
        assert!(matches!(StyleStore::load(&storage, KEY), Err(Error::Storage(_))));
    }

    #[test]
    fn file_storage_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested").join("storage.json"));
        assert_eq!(storage.get(KEY).unwrap(), None);

        storage.set("other", json!(1)).unwrap();
        let store: StyleStore = [("#x".to_string(), StyleOverride {
            color: Some("green".into()),
            ..Default::default()
        })]
        .into_iter()
        .collect();
        store.save(&storage, KEY).unwrap();

        assert_eq!(storage.get("other").unwrap(), Some(json!(1)));
        assert_eq!(StyleStore::load(&storage, KEY).unwrap(), store);
    }
}
