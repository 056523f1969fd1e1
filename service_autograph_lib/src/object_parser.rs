//! Decoding of response bodies into collections of models.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// `(property name, JSON key)`.
pub type KeyBinding = (&'static str, &'static str);

/// Binds a model's property names to the keys used in JSON payloads.
///
/// Properties missing from [KeyMap::KEYS] are decoded under their own name.
pub trait KeyMap {
    const KEYS: &'static [KeyBinding];
}

/// Key maps looked up by model type.
#[derive(Debug, Clone, Default)]
pub struct KeyMaps {
    maps: HashMap<TypeId, &'static [KeyBinding]>,
}
impl KeyMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: KeyMap + 'static>(&mut self) {
        self.maps.insert(TypeId::of::<M>(), M::KEYS);
    }

    /// Key map of `M`, empty if none was registered.
    pub fn get<M: 'static>(&self) -> &'static [KeyBinding] {
        self.maps.get(&TypeId::of::<M>()).copied().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Finds every `M` in a JSON document.
///
/// Objects are tried wherever they appear in the tree; scalars only at the
/// top level or as array elements. Entries that fail to decode are left out
/// of the result.
pub struct ObjectParser<M> {
    keys: &'static [KeyBinding],
    log_errors: bool,
    _model: PhantomData<fn() -> M>,
}
impl<M: DeserializeOwned> ObjectParser<M> {
    pub fn new() -> Self {
        ObjectParser {
            keys: &[],
            log_errors: false,
            _model: PhantomData,
        }
    }

    pub fn with_keys(mut self, keys: &'static [KeyBinding]) -> Self {
        self.keys = keys;
        self
    }

    /// Report dropped entries at warn level instead of debug.
    pub fn log_errors(mut self, log_errors: bool) -> Self {
        self.log_errors = log_errors;
        self
    }

    pub fn parse_bytes(&self, body: &[u8]) -> Vec<M> {
        match self.body_value(body) {
            Some(value) => self.parse(&value),
            None => Vec::new(),
        }
    }

    /// Like [ObjectParser::parse_entries], from a response body.
    pub fn parse_entries_bytes<K: DeserializeOwned>(&self, body: &[u8]) -> Vec<(K, M)> {
        match self.body_value(body) {
            Some(value) => self.parse_entries(&value),
            None => Vec::new(),
        }
    }

    /// Decodes the members of a JSON object as `key: M` entries. An array is
    /// searched for such objects one level down.
    ///
    /// Keys that are not JSON strings of `K` are read as JSON text, so
    /// numeric keys work too.
    pub fn parse_entries<K: DeserializeOwned>(&self, value: &Value) -> Vec<(K, M)> {
        match value {
            Value::Object(object) => object
                .iter()
                .filter_map(|(key, value)| Some((self.decode_key(key)?, self.decode_value(value)?)))
                .collect(),
            Value::Array(elements) => elements
                .iter()
                .filter(|x| x.is_object())
                .flat_map(|x| self.parse_entries(x))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn parse(&self, value: &Value) -> Vec<M> {
        let mut models = Vec::new();
        self.collect(value, &mut models);
        models
    }

    fn collect(&self, value: &Value, models: &mut Vec<M>) {
        match value {
            Value::Object(object) => {
                models.extend(self.decode_object(object));
                for nested in object.values() {
                    if nested.is_object() || nested.is_array() {
                        self.collect(nested, models);
                    }
                }
            }
            Value::Array(elements) => {
                for element in elements {
                    self.collect(element, models);
                }
            }
            Value::Null => (),
            scalar => models.extend(self.decode(scalar.clone())),
        }
    }

    fn body_value(&self, body: &[u8]) -> Option<Value> {
        if body.is_empty() {
            return None;
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Some(value),
            Err(e) => {
                self.report(&e, "response body is not valid JSON");
                None
            }
        }
    }

    fn decode_key<K: DeserializeOwned>(&self, key: &str) -> Option<K> {
        match serde_json::from_value(Value::String(key.to_string())) {
            Ok(key) => Some(key),
            Err(_) => match serde_json::from_str(key) {
                Ok(key) => Some(key),
                Err(e) => {
                    self.report(&e, "skipping entry whose key does not decode");
                    None
                }
            },
        }
    }

    fn decode_value(&self, value: &Value) -> Option<M> {
        match value {
            Value::Object(object) => self.decode_object(object),
            other => self.decode(other.clone()),
        }
    }

    fn decode_object(&self, object: &Map<String, Value>) -> Option<M> {
        let mut renamed = object.clone();
        for (property, json_key) in self.keys {
            if property == json_key {
                continue;
            }
            if let Some(value) = renamed.remove(*json_key) {
                renamed.insert((*property).to_string(), value);
            }
        }
        self.decode(Value::Object(renamed))
    }

    fn decode(&self, value: Value) -> Option<M> {
        match serde_json::from_value::<M>(value) {
            Ok(model) => Some(model),
            Err(e) => {
                self.report(&e, "skipping entry that does not decode");
                None
            }
        }
    }

    fn report(&self, error: &serde_json::Error, message: &str) {
        if self.log_errors {
            warn!(model = type_name::<M>(), %error, "{message}");
        } else {
            debug!(model = type_name::<M>(), %error, "{message}");
        }
    }
}
impl<M: DeserializeOwned> Default for ObjectParser<M> {
    fn default() -> Self {
        Self::new()
    }
}
