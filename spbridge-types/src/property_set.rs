use crate::payload::{self, property_value, DataType};

/// An ordered collection of string metric properties.
///
/// Insertion order is kept so the encoded birth is stable for the same input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet(Vec<(String, Option<String>)>);

impl PropertySet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set `key`, replacing an existing value. `None` is encoded as a null property.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: Option<String>) {
        let key = key.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<PropertySet> for payload::PropertySet {
    fn from(set: PropertySet) -> Self {
        let (keys, values) = set
            .0
            .into_iter()
            .map(|(key, value)| {
                let value = payload::PropertyValue {
                    r#type: Some(DataType::String as u32),
                    is_null: value.is_none().then_some(true),
                    value: value.map(property_value::Value::StringValue),
                };
                (key, value)
            })
            .unzip();
        payload::PropertySet { keys, values }
    }
}

/// Read a string property out of an encoded property set.
pub fn string_property(set: &payload::PropertySet, key: &str) -> Option<String> {
    let index = set.keys.iter().position(|k| k == key)?;
    match set.values.get(index)?.value.as_ref()? {
        property_value::Value::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_existing_key() {
        let mut set = PropertySet::new();
        set.insert("engUnit", Some("degC".to_string()));
        set.insert("semanticId", Some("0173-1#02-AAB381#003".to_string()));
        set.insert("engUnit", Some("K".to_string()));
        assert_eq!(set.len(), 2);

        let encoded: payload::PropertySet = set.into();
        assert_eq!(encoded.keys, vec!["engUnit", "semanticId"]);
        assert_eq!(string_property(&encoded, "engUnit"), Some("K".into()));
        assert_eq!(string_property(&encoded, "missing"), None);
    }

    #[test]
    fn null_property_is_flagged() {
        let mut set = PropertySet::new();
        set.insert("source", None);
        let encoded: payload::PropertySet = set.into();
        assert_eq!(encoded.values[0].is_null, Some(true));
        assert_eq!(encoded.values[0].value, None);
        assert_eq!(encoded.values[0].r#type, Some(DataType::String as u32));
    }
}
