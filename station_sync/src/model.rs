//! # Data Model
//!
//! Devices as reported by the WCS, goods lines and pick tasks as reported by the
//! WMS, and the per-station state published to the dashboard.
//!
//! Device documents arrive as arbitrary JSON. `Device::from_payload` is the one
//! place where they are validated; anything past it works on typed values.

use chrono::{DateTime, Utc};
use lib_common::ingestors::ConnectionState;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Returns `true` for container codes that mean "nothing there".
pub fn is_vacant(container: &str) -> bool {
    let trimmed = container.trim();
    trimmed.is_empty() || trimmed == "0"
}

/// A string-or-number JSON scalar, as the WCS is not consistent about either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevice {
    #[serde(default)]
    code: Option<Scalar>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pallet_code: Option<Scalar>,
    #[serde(default)]
    work_status: Option<Scalar>,
    #[serde(default)]
    operation_mode: Option<String>,
    #[serde(default)]
    children_device: Option<Vec<Value>>,
}

/// One piece of equipment or station slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique key. Empty only for children that were reported without one.
    pub code: String,
    pub name: Option<String>,
    /// Container currently held; `""`/`"0"` mean empty.
    pub pallet_code: Option<String>,
    /// Activity code; `0`/absent mean idle.
    pub work_status: Option<i64>,
    pub operation_mode: Option<String>,
    /// Logical sub-slots reported by a compound unit.
    pub children: Vec<Device>,
}

impl Device {
    /// Validates a raw device document.
    ///
    /// `fallback_code` is used when the document carries no `code` of its own.
    /// The document must be a JSON object and every known field must have a
    /// compatible type; unknown fields are ignored.
    pub fn from_payload(fallback_code: &str, payload: &Value) -> Result<Device, SyncError> {
        Self::parse(fallback_code, payload, true)
    }

    fn parse(
        fallback_code: &str,
        payload: &Value,
        require_code: bool,
    ) -> Result<Device, SyncError> {
        let malformed = |reason: String| SyncError::MalformedDevice {
            code: fallback_code.to_string(),
            reason,
        };

        if !payload.is_object() {
            return Err(malformed(format!("expected an object, got {}", json_kind(payload))));
        }
        let raw: RawDevice =
            serde_json::from_value(payload.clone()).map_err(|e| malformed(e.to_string()))?;

        let code = raw
            .code
            .map(Scalar::into_text)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| fallback_code.to_string());
        if require_code && code.trim().is_empty() {
            return Err(malformed("missing device code".to_string()));
        }

        let work_status = match raw.work_status {
            None => None,
            Some(scalar) => Some(
                scalar
                    .as_i64()
                    .ok_or_else(|| malformed("workStatus is not numeric".to_string()))?,
            ),
        };

        let mut children = Vec::new();
        for child in raw.children_device.unwrap_or_default() {
            children.push(Self::parse("", &child, false).map_err(|e| match e {
                SyncError::MalformedDevice { reason, .. } => {
                    malformed(format!("child device: {}", reason))
                }
                other => other,
            })?);
        }

        Ok(Device {
            code,
            name: raw.name,
            pallet_code: raw.pallet_code.map(Scalar::into_text),
            work_status,
            operation_mode: raw.operation_mode,
            children,
        })
    }

    /// The tray this device holds, if any.
    pub fn tray(&self) -> Option<&str> {
        self.pallet_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !is_vacant(code))
    }

    /// `true` when the device reports a non-idle work status.
    pub fn is_working(&self) -> bool {
        matches!(self.work_status, Some(status) if status != 0)
    }

    /// Non-empty display name.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Non-empty operation mode.
    pub fn reported_mode(&self) -> Option<&str> {
        self.operation_mode.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(Scalar::into_text)
        .unwrap_or_default())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Scalar::Text(s)) => s.trim().parse().unwrap_or_default(),
        None => 0.0,
    })
}

/// One manifest entry of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsLine {
    #[serde(default, deserialize_with = "string_or_default")]
    pub goods_no: String,
    #[serde(default, deserialize_with = "string_or_default")]
    pub goods_name: String,
    #[serde(default)]
    pub goods_spec: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "string_or_default")]
    pub unit: String,
    /// Outstanding pick demand, merged in from the pick-task source.
    #[serde(default, skip_deserializing)]
    pub pick_quantity: f64,
}

/// `GET /Inventory/container/{containerCode}` body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<GoodsLine>>,
}

/// One outstanding pick demand. The quantity is kept raw and parsed during
/// aggregation, where unparsable entries are dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickTask {
    #[serde(default, deserialize_with = "string_or_default")]
    pub goods_no: String,
    #[serde(default)]
    pub pick_quantity: Value,
}

impl PickTask {
    /// The quantity as a number, when it is one (or a numeric string).
    pub fn quantity(&self) -> Option<f64> {
        match &self.pick_quantity {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|q: &f64| q.is_finite())
    }
}

/// `GET /StockOutOrder/PickTask?containerCode=...` body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickTaskResponse {
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<PickTask>>,
}

/// State of one station as published to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationState {
    pub station_no: String,
    pub station_name: String,
    /// Empty when the station is vacant.
    pub current_container: String,
    pub local_goods: Vec<GoodsLine>,
    pub is_loading: bool,
    /// Empty when the last load succeeded.
    pub error_message: String,
    /// When goods were last applied, successfully or not.
    pub last_loaded: Option<DateTime<Utc>>,
}

impl StationState {
    /// A vacant station named after its code.
    pub fn new(station_no: &str) -> Self {
        Self {
            station_no: station_no.to_string(),
            station_name: station_no.to_string(),
            current_container: String::new(),
            local_goods: Vec::new(),
            is_loading: false,
            error_message: String::new(),
            last_loaded: None,
        }
    }
}

/// Reachability of the two back-ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    /// Follows manifest fetches.
    pub wms: ConnectionState,
    /// Follows the live channel lifecycle.
    pub wcs: ConnectionState,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            wms: ConnectionState::Connecting,
            wcs: ConnectionState::Connecting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_compound_device() {
        let payload = json!({
            "code": "TranLine3000",
            "name": "Line 3000",
            "workStatus": "2",
            "operationMode": "In",
            "currentLocation": { "code": "L1", "row": 1, "col": 2, "layer": 3 },
            "childrenDevice": [
                { "code": "Tran3001", "palletCode": 1234 },
                { "palletCode": "PAL-9" }
            ]
        });
        let device = Device::from_payload("TranLine3000", &payload).unwrap();
        assert_eq!(device.work_status, Some(2));
        assert_eq!(device.reported_mode(), Some("In"));
        assert_eq!(device.children.len(), 2);
        assert_eq!(device.children[0].tray(), Some("1234"));
        assert_eq!(device.children[1].code, "");
        assert_eq!(device.children[1].tray(), Some("PAL-9"));
    }

    #[test]
    fn falls_back_to_event_code() {
        let device = Device::from_payload("Crn2001", &json!({ "palletCode": null })).unwrap();
        assert_eq!(device.code, "Crn2001");
        assert_eq!(device.tray(), None);
        assert!(!device.is_working());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            Device::from_payload("Tran3001", &json!(["Tran3001"])),
            Err(SyncError::MalformedDevice { .. })
        ));
        assert!(Device::from_payload("Tran3001", &json!({ "workStatus": "busy" })).is_err());
        assert!(Device::from_payload("Tran3001", &json!({ "name": 5 })).is_err());
        assert!(Device::from_payload("Tran3001", &json!({ "childrenDevice": [1] })).is_err());
        assert!(Device::from_payload("", &json!({})).is_err());
    }

    #[test]
    fn vacancy_markers() {
        assert!(is_vacant(""));
        assert!(is_vacant("0"));
        assert!(is_vacant("   "));
        assert!(!is_vacant("PAL-77"));
        let device = Device { pallet_code: Some(" 0 ".into()), ..Device::default() };
        assert_eq!(device.tray(), None);
    }

    #[test]
    fn goods_line_tolerates_loose_types() {
        let line: GoodsLine = serde_json::from_value(json!({
            "goodsNo": 1001,
            "goodsName": null,
            "quantity": "12.5",
            "unit": "pcs",
            "pickQuantity": 99
        }))
        .unwrap();
        assert_eq!(line.goods_no, "1001");
        assert_eq!(line.goods_name, "");
        assert_eq!(line.quantity, 12.5);
        assert_eq!(line.pick_quantity, 0.0);
    }

    #[test]
    fn manifest_line_without_goods_number_still_decodes() {
        let response: ManifestResponse = serde_json::from_value(json!({
            "errCode": 0,
            "data": [
                { "goodsNo": "G1", "quantity": 2 },
                { "goodsName": "loose bolts", "quantity": 7 }
            ]
        }))
        .unwrap();
        let lines = response.data.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].goods_no, "");
        assert_eq!(lines[1].goods_name, "loose bolts");
        assert_eq!(lines[1].quantity, 7.0);

        let task: PickTask = serde_json::from_value(json!({ "pickQuantity": 1 })).unwrap();
        assert_eq!(task.goods_no, "");
    }

    #[test]
    fn pick_task_quantity_parsing() {
        let task = |q: Value| PickTask { goods_no: "G1".into(), pick_quantity: q };
        assert_eq!(task(json!(3)).quantity(), Some(3.0));
        assert_eq!(task(json!(" 4 ")).quantity(), Some(4.0));
        assert_eq!(task(json!("n/a")).quantity(), None);
        assert_eq!(task(Value::Null).quantity(), None);
    }
}
