//! Firestore REST backend.
//!
//! Reads go through `GET documents/{collection}/{id}`. Writes go through
//! `documents:commit` so that the field mask, the server timestamp transforms
//! and the "document must exist" precondition land in a single atomic write.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{DeviceRecord, DeviceStore, DeviceUpdate, PositionSample, Speed, StoreError, Timestamp};

const REQUEST_TIME: &str = "REQUEST_TIME";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub project_id: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Pre-issued OAuth bearer token, not needed against the emulator
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    String::from("https://firestore.googleapis.com/v1")
}

fn default_database() -> String {
    String::from("(default)")
}

fn default_collection() -> String {
    String::from("devices")
}

fn default_timeout_secs() -> u64 {
    30
}

pub struct FirestoreStore {
    config: FirestoreConfig,
    base_url: Url,
    http_client: reqwest::Client,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.base_url.clone()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    fn document_name(&self, id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database, self.config.collection, id
        )
    }

    fn endpoint(&self, tail: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database.as_str(),
            ])
            .extend(tail);

        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl DeviceStore for FirestoreStore {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let url = self.endpoint(&["documents", &self.config.collection, id])?;
        tracing::debug!("GET {}", url);

        let response = self.authorize(self.http_client.get(url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let document: Value = response.json().await?;
                decode_document(id, &document).map(Some)
            }
            status => Err(StoreError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn update(&self, id: &str, update: &DeviceUpdate) -> Result<(), StoreError> {
        let url = self.endpoint(&["documents:commit"])?;
        let body = encode_commit(&self.document_name(id), update)?;
        tracing::debug!("POST {} {}", url, body);

        let response = self
            .authorize(self.http_client.post(url))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            // Failed `exists` precondition
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(id.to_string())),
            status if status.is_success() => Ok(()),
            status => Err(StoreError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    update: Document,
    update_mask: DocumentMask,
    update_transforms: Vec<FieldTransform>,
    current_document: Precondition,
}

#[derive(Debug, Serialize)]
struct Document {
    name: String,
    fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentMask {
    field_paths: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform {
    field_path: &'static str,
    set_to_server_value: &'static str,
}

#[derive(Debug, Serialize)]
struct Precondition {
    exists: bool,
}

fn encode_commit(name: &str, update: &DeviceUpdate) -> Result<Value, StoreError> {
    let mut fields = Map::new();
    let mut transforms = vec![FieldTransform {
        field_path: "updatedAt",
        set_to_server_value: REQUEST_TIME,
    }];

    fields.insert("isActive".into(), json!({ "booleanValue": update.is_active }));

    if let Some(sample) = &update.last_position {
        fields.insert("lastPosition".into(), encode_sample(sample)?);

        if sample.timestamp == Timestamp::ServerAssigned {
            transforms.push(FieldTransform {
                field_path: "lastPosition.timestamp",
                set_to_server_value: REQUEST_TIME,
            });
        }
    }

    let request = CommitRequest {
        writes: vec![Write {
            update: Document {
                name: name.to_string(),
                fields,
            },
            update_mask: DocumentMask {
                field_paths: update.field_paths(),
            },
            update_transforms: transforms,
            current_document: Precondition { exists: true },
        }],
    };

    Ok(serde_json::to_value(request)?)
}

fn encode_sample(sample: &PositionSample) -> Result<Value, StoreError> {
    let mut fields = Map::new();
    fields.insert("lat".into(), json!({ "doubleValue": sample.lat }));
    fields.insert("lng".into(), json!({ "doubleValue": sample.lng }));
    fields.insert("speed".into(), json!({ "stringValue": sample.speed.to_string() }));
    // Firestore carries 64-bit integers as strings
    fields.insert("battery".into(), json!({ "integerValue": sample.battery.to_string() }));

    if let Timestamp::At(time) = sample.timestamp {
        let formatted = time
            .format(&Rfc3339)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        fields.insert("timestamp".into(), json!({ "timestampValue": formatted }));
    }

    Ok(json!({ "mapValue": { "fields": fields } }))
}

fn decode_document(id: &str, document: &Value) -> Result<DeviceRecord, StoreError> {
    let empty = Map::new();
    let fields = document
        .get("fields")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let is_active = match fields.get("isActive") {
        Some(value) => value
            .get("booleanValue")
            .and_then(Value::as_bool)
            .ok_or_else(|| StoreError::Decode(format!("isActive is not a boolean: {value}")))?,
        None => false,
    };

    let last_position = match fields.get("lastPosition") {
        None => None,
        Some(value) if value.get("nullValue").is_some() => None,
        Some(value) => Some(decode_sample(value)?),
    };

    let updated_at = fields
        .get("updatedAt")
        .map(decode_timestamp)
        .transpose()?;

    Ok(DeviceRecord {
        id: id.to_string(),
        is_active,
        last_position,
        updated_at,
    })
}

fn decode_sample(value: &Value) -> Result<PositionSample, StoreError> {
    let fields = value
        .pointer("/mapValue/fields")
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Decode(format!("lastPosition is not a map: {value}")))?;

    let speed = match sample_field(fields, "speed")?.get("stringValue").and_then(Value::as_str) {
        Some(text) => text.parse::<Speed>().map_err(StoreError::Decode)?,
        None => Speed(decode_number(sample_field(fields, "speed")?)?.round() as u32),
    };

    let battery = decode_number(sample_field(fields, "battery")?)?.round();
    if !(0.0..=100.0).contains(&battery) {
        return Err(StoreError::Decode(format!("battery out of range: {battery}")));
    }

    let timestamp = match fields.get("timestamp") {
        Some(value) => Timestamp::At(decode_timestamp(value)?),
        None => Timestamp::ServerAssigned,
    };

    Ok(PositionSample {
        lat: decode_number(sample_field(fields, "lat")?)?,
        lng: decode_number(sample_field(fields, "lng")?)?,
        speed,
        battery: battery as u8,
        timestamp,
    })
}

fn sample_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a Value, StoreError> {
    fields
        .get(name)
        .ok_or_else(|| StoreError::Decode(format!("lastPosition.{name} is missing")))
}

fn decode_number(value: &Value) -> Result<f64, StoreError> {
    if let Some(number) = value.get("doubleValue").and_then(Value::as_f64) {
        return Ok(number);
    }

    match value.get("integerValue") {
        Some(Value::String(text)) => text
            .parse::<i64>()
            .map(|n| n as f64)
            .map_err(|e| StoreError::Decode(format!("invalid integer '{text}': {e}"))),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| StoreError::Decode(format!("invalid integer {number}"))),
        _ => Err(StoreError::Decode(format!("expected a number: {value}"))),
    }
}

fn decode_timestamp(value: &Value) -> Result<OffsetDateTime, StoreError> {
    let text = value
        .get("timestampValue")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode(format!("expected a timestamp: {value}")))?;

    OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|e| StoreError::Decode(format!("invalid timestamp '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const NAME: &str = "projects/demo/databases/(default)/documents/devices/D1";

    fn sample(timestamp: Timestamp) -> PositionSample {
        PositionSample {
            lat: 37.7935,
            lng: -122.3965,
            speed: Speed(18),
            battery: 42,
            timestamp,
        }
    }

    #[test]
    fn test_encode_position_commit() {
        let update = DeviceUpdate::position(sample(Timestamp::ServerAssigned));
        let body = encode_commit(NAME, &update).unwrap();
        let write = &body["writes"][0];

        assert_eq!(write["update"]["name"], json!(NAME));
        assert_eq!(write["update"]["fields"]["isActive"], json!({ "booleanValue": true }));
        assert_eq!(
            write["update"]["fields"]["lastPosition"]["mapValue"]["fields"]["battery"],
            json!({ "integerValue": "42" })
        );
        assert_eq!(
            write["update"]["fields"]["lastPosition"]["mapValue"]["fields"]["speed"],
            json!({ "stringValue": "18 mph" })
        );
        assert!(write["update"]["fields"]["lastPosition"]["mapValue"]["fields"]
            .get("timestamp")
            .is_none());
        assert_eq!(write["updateMask"]["fieldPaths"], json!(["isActive", "lastPosition"]));
        assert_eq!(
            write["updateTransforms"],
            json!([
                { "fieldPath": "updatedAt", "setToServerValue": "REQUEST_TIME" },
                { "fieldPath": "lastPosition.timestamp", "setToServerValue": "REQUEST_TIME" }
            ])
        );
        assert_eq!(write["currentDocument"], json!({ "exists": true }));
    }

    #[test]
    fn test_encode_offline_commit_keeps_known_timestamp() {
        let written = datetime!(2024-05-01 12:00:00 UTC);
        let update = DeviceUpdate::presence(false, Some(sample(Timestamp::At(written))));
        let body = encode_commit(NAME, &update).unwrap();
        let write = &body["writes"][0];

        assert_eq!(write["update"]["fields"]["isActive"], json!({ "booleanValue": false }));
        assert_eq!(
            write["update"]["fields"]["lastPosition"]["mapValue"]["fields"]["timestamp"],
            json!({ "timestampValue": "2024-05-01T12:00:00Z" })
        );
        assert_eq!(
            write["updateTransforms"],
            json!([{ "fieldPath": "updatedAt", "setToServerValue": "REQUEST_TIME" }])
        );
    }

    #[test]
    fn test_decode_document() {
        let document = json!({
            "name": NAME,
            "fields": {
                "isActive": { "booleanValue": true },
                "updatedAt": { "timestampValue": "2024-05-01T12:00:05.250Z" },
                "lastPosition": { "mapValue": { "fields": {
                    "lat": { "doubleValue": 37.7935 },
                    "lng": { "doubleValue": -122.3965 },
                    "speed": { "stringValue": "18 mph" },
                    "battery": { "integerValue": "42" },
                    "timestamp": { "timestampValue": "2024-05-01T12:00:00Z" }
                } } },
                "name": { "stringValue": "Courier bike" }
            }
        });

        let record = decode_document("D1", &document).unwrap();
        assert_eq!(record.id, "D1");
        assert!(record.is_active);
        assert_eq!(record.updated_at, Some(datetime!(2024-05-01 12:00:05.25 UTC)));
        assert_eq!(
            record.last_position,
            Some(sample(Timestamp::At(datetime!(2024-05-01 12:00:00 UTC))))
        );
    }

    #[test]
    fn test_decode_document_without_position() {
        let document = json!({
            "name": NAME,
            "fields": { "lastPosition": { "nullValue": null } }
        });

        let record = decode_document("D1", &document).unwrap();
        assert!(!record.is_active);
        assert_eq!(record.last_position, None);
        assert_eq!(record.updated_at, None);
    }

    #[test]
    fn test_decode_rejects_malformed_position() {
        let document = json!({
            "fields": { "lastPosition": { "mapValue": { "fields": {
                "lat": { "doubleValue": 37.7 },
                "speed": { "stringValue": "9 mph" },
                "battery": { "integerValue": "50" }
            } } } }
        });

        let err = decode_document("D1", &document).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn test_endpoint_encodes_device_id() {
        let store = FirestoreStore::new(FirestoreConfig {
            base_url: String::from("http://localhost:8080/v1/"),
            project_id: String::from("demo"),
            database: default_database(),
            collection: default_collection(),
            access_token: None,
            timeout_secs: 5,
        })
        .unwrap();

        let url = store.endpoint(&["documents", "devices", "bike 7"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/devices/bike%207"
        );
        assert_eq!(
            store.endpoint(&["documents:commit"]).unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents:commit"
        );
    }
}
