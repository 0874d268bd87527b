use super::models::{Document, Value, ValueType};
use super::reference::{convert_fields_to_serde_value, convert_value_to_serde_value};
use super::FirestoreError;
use serde::de::DeserializeOwned;

/// A snapshot of a document in Firestore.
///
/// It contains data read from a document in your Firestore database.
/// The data can be extracted with `.data()`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) document: Option<Document>,
    pub(crate) read_time: Option<String>,
}

impl DocumentSnapshot {
    /// The ID of the document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The path of the document below `documents`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if the document exists.
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// The time the document was created. Returns `None` if the document does not exist.
    pub fn create_time(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.create_time.as_str())
    }

    /// The time the document was last updated. Returns `None` if the document does not exist.
    pub fn update_time(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.update_time.as_str())
    }

    /// The time this snapshot was read, when the backend reported one.
    pub fn read_time(&self) -> Option<&str> {
        self.read_time.as_deref()
    }

    /// Retrieves all fields in the document as a specific type.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    pub fn data<T: DeserializeOwned>(&self) -> Result<Option<T>, FirestoreError> {
        if let Some(doc) = &self.document {
            let serde_value = convert_fields_to_serde_value(doc.fields.clone())?;
            let obj = serde_json::from_value(serde_value)?;
            Ok(Some(obj))
        } else {
            Ok(None)
        }
    }

    /// Retrieves a specific field from the document.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the field (e.g., "address.city"). Each segment but the last must
    ///   name a map field.
    pub fn get_field<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, FirestoreError> {
        let Some(doc) = &self.document else {
            return Ok(None);
        };

        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Ok(None);
        };
        let mut current: Option<&Value> = doc.fields.get(first);
        for segment in segments {
            current = match current.map(|v| &v.value_type) {
                Some(ValueType::MapValue(map)) => map.fields.get(segment),
                _ => None,
            };
        }

        match current {
            Some(value) => {
                let serde_value = convert_value_to_serde_value(value.clone())?;
                Ok(Some(serde_json::from_value(serde_value)?))
            }
            None => Ok(None),
        }
    }
}
