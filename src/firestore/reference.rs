use super::listen::{listen_request, ListenStream};
use super::models::{
    ArrayValue, Document, DocumentsTarget, ListenRequest, MapValue, Target, Value, ValueType,
};
use super::snapshot::DocumentSnapshot;
use super::FirestoreError;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::Error;
use serde::ser::Error as SerError;
use serde::Serialize;
use serde_json::map::Map;
use serde_json::Value as SerdeValue;
use std::collections::HashMap;

// Helper to convert Firestore's value map to a standard serde_json::Value
pub(crate) fn convert_fields_to_serde_value(
    fields: HashMap<String, Value>,
) -> Result<SerdeValue, FirestoreError> {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key, convert_value_to_serde_value(value)?);
    }
    Ok(SerdeValue::Object(map))
}

pub(crate) fn convert_value_to_serde_value(value: Value) -> Result<SerdeValue, FirestoreError> {
    use serde_json::json;
    Ok(match value.value_type {
        ValueType::StringValue(s) => SerdeValue::String(s),
        ValueType::IntegerValue(s) => {
            let i: i64 = s.parse().map_err(|e| {
                <serde_json::Error as Error>::custom(format!(
                    "Failed to parse integer string '{}': {}",
                    s, e
                ))
            })?;
            SerdeValue::Number(i.into())
        }
        ValueType::DoubleValue(d) => SerdeValue::Number(
            serde_json::Number::from_f64(d).ok_or_else(|| {
                <serde_json::Error as Error>::custom(format!("Invalid f64 value: {}", d))
            })?,
        ),
        ValueType::BooleanValue(b) => SerdeValue::Bool(b),
        ValueType::MapValue(map_value) => convert_fields_to_serde_value(map_value.fields)?,
        ValueType::ArrayValue(array_value) => {
            let values = array_value
                .values
                .into_iter()
                .map(convert_value_to_serde_value)
                .collect::<Result<Vec<_>, _>>()?;
            SerdeValue::Array(values)
        }
        ValueType::NullValue(_) => SerdeValue::Null,
        ValueType::TimestampValue(s) => SerdeValue::String(s),
        ValueType::GeoPointValue(gp) => {
            json!({ "latitude": gp.latitude, "longitude": gp.longitude })
        }
        ValueType::BytesValue(s) => SerdeValue::String(s),
        ValueType::ReferenceValue(s) => SerdeValue::String(s),
    })
}

// Helper to convert a serializable Rust struct to Firestore's value map
fn convert_serializable_to_fields<T: Serialize>(
    value: &T,
) -> Result<HashMap<String, Value>, FirestoreError> {
    let serde_value = serde_json::to_value(value)?;
    if let SerdeValue::Object(map) = serde_value {
        let mut fields = HashMap::new();
        for (k, v) in map {
            fields.insert(k, convert_serde_value_to_firestore_value(v)?);
        }
        Ok(fields)
    } else {
        Err(FirestoreError::SerializationError(SerError::custom(
            "Can only set objects as documents",
        )))
    }
}

fn convert_serde_value_to_firestore_value(value: SerdeValue) -> Result<Value, FirestoreError> {
    let value_type = match value {
        SerdeValue::Null => ValueType::NullValue(()),
        SerdeValue::Bool(b) => ValueType::BooleanValue(b),
        SerdeValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                ValueType::IntegerValue(i.to_string())
            } else if let Some(f) = n.as_f64() {
                ValueType::DoubleValue(f)
            } else {
                return Err(FirestoreError::SerializationError(SerError::custom(
                    format!("Unsupported number type: {}", n)
                )));
            }
        }
        SerdeValue::String(s) => ValueType::StringValue(s),
        SerdeValue::Array(a) => {
            let values = a
                .into_iter()
                .map(convert_serde_value_to_firestore_value)
                .collect::<Result<Vec<_>, _>>()?;
            ValueType::ArrayValue(ArrayValue { values })
        }
        SerdeValue::Object(o) => {
            let mut fields = HashMap::new();
            for (k, v) in o {
                fields.insert(k, convert_serde_value_to_firestore_value(v)?);
            }
            ValueType::MapValue(MapValue { fields })
        }
    };
    Ok(Value { value_type })
}

/// Target id used for the single document watched by a listen stream.
const LISTEN_TARGET_ID: i32 = 1;

/// A reference to one document. Cheap to clone; carries its own client handle.
#[derive(Clone)]
pub struct DocumentReference {
    pub(crate) client: ClientWithMiddleware,
    /// `.../projects/{p}/databases/{d}` on the REST endpoint.
    pub(crate) database_url: String,
    /// `projects/{p}/databases/{d}`.
    pub(crate) database: String,
    /// Slash-separated path below `documents`, e.g. `users/alice`.
    pub(crate) path: String,
}

impl std::fmt::Debug for DocumentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentReference")
            .field("name", &self.name())
            .finish()
    }
}

impl DocumentReference {
    /// The last path segment.
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full resource name, `projects/{p}/databases/{d}/documents/{path}`.
    pub fn name(&self) -> String {
        format!("{}/documents/{}", self.database, self.path)
    }

    fn url(&self) -> String {
        format!("{}/documents/{}", self.database_url, self.path)
    }

    pub(crate) fn snapshot(&self, document: Option<Document>, read_time: Option<String>) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.id().to_string(),
            path: self.path.clone(),
            document,
            read_time,
        }
    }

    /// Reads the document. A missing document yields a snapshot whose `exists()` is `false`.
    pub async fn get(&self) -> Result<DocumentSnapshot, FirestoreError> {
        let response = self.client.get(self.url()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(self.snapshot(None, None));
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FirestoreError::ApiError(format!(
                "Get document failed {}: {}",
                status, text
            )));
        }

        let doc: Document = response.json().await?;
        Ok(self.snapshot(Some(doc), None))
    }

    /// Overwrites the document with `value`, creating it if needed.
    pub async fn set<T: Serialize>(&self, value: &T) -> Result<(), FirestoreError> {
        self.write(value, None).await
    }

    /// Writes only the fields named in `field_paths`.
    pub async fn update<T: Serialize>(
        &self,
        value: &T,
        field_paths: &[&str],
    ) -> Result<(), FirestoreError> {
        self.write(value, Some(field_paths)).await
    }

    async fn write<T: Serialize>(
        &self,
        value: &T,
        update_mask: Option<&[&str]>,
    ) -> Result<(), FirestoreError> {
        let fields = convert_serializable_to_fields(value)?;

        let mut url = url::Url::parse(&self.url())
            .map_err(|e| FirestoreError::ApiError(format!("Invalid document URL: {}", e)))?;
        if let Some(mask) = update_mask {
            let mut query = url.query_pairs_mut();
            for field in mask {
                query.append_pair("updateMask.fieldPaths", field);
            }
        }

        let body = serde_json::to_vec(&serde_json::json!({ "fields": fields }))?;

        let response = self
            .client
            .patch(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FirestoreError::ApiError(format!(
                "Set document failed {}: {}",
                status, text
            )));
        }

        Ok(())
    }

    pub async fn delete(&self) -> Result<(), FirestoreError> {
        let response = self.client.delete(self.url()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FirestoreError::ApiError(format!(
                "Delete document failed {}: {}",
                status, text
            )));
        }

        Ok(())
    }

    /// Opens a listen stream watching this document.
    pub async fn listen(&self) -> Result<ListenStream, FirestoreError> {
        let request = ListenRequest {
            database: self.database.clone(),
            add_target: Target {
                documents: DocumentsTarget {
                    documents: vec![self.name()],
                },
                target_id: LISTEN_TARGET_ID,
            },
        };
        listen_request(&self.client, &self.database_url, &request).await
    }
}
