//! Endpoint construction and the index payload decoder.
//!
//! Index payload shape:
//! `{ "data": { "<city>": [ { "index": "traffic", "components": [57, 114] } ] } }`

use cityboard_core::types::{ComponentRef, DashboardQuery};
use cityboard_gateway::trim_base_url;
use serde_json::Value;

use crate::error::DashboardError;

/// `GET {base}/api/v1/dashboard?city={city}`
pub fn index_url(base: &str, city: &str) -> String {
    format!(
        "{}/api/v1/dashboard?city={}",
        trim_base_url(base),
        urlencoding::encode(city)
    )
}

/// `GET {base}/api/v1/component/{id}/chart?city={city}`
pub fn component_url(base: &str, component: ComponentRef, city: &str) -> String {
    format!(
        "{}/api/v1/component/{}/chart?city={}",
        trim_base_url(base),
        component.id,
        urlencoding::encode(city)
    )
}

/// Decode an index response into the component list for `query`.
///
/// `data[city]` must be a list, otherwise `PayloadShape`. The first entry
/// whose `index` equals `query.index` exactly wins; none matching is
/// `IndexNotFound`. Entries that are not objects are skipped. A matched entry
/// without a `components` list resolves to no components. The result keeps
/// payload order and is cut to `max(1, limit)` items.
pub fn resolve_components(
    payload: &Value,
    query: &DashboardQuery,
) -> Result<Vec<ComponentRef>, DashboardError> {
    let group = payload
        .get("data")
        .and_then(|data| data.get(&query.city))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            DashboardError::payload_shape(format!("data.{} is not a list", query.city))
        })?;

    let entry = group
        .iter()
        .find(|entry| entry.get("index").and_then(Value::as_str) == Some(query.index.as_str()))
        .ok_or_else(|| DashboardError::IndexNotFound {
            city: query.city.clone(),
            index: query.index.clone(),
        })?;

    let ids = match entry.get("components").and_then(Value::as_array) {
        Some(ids) => ids,
        None => return Ok(Vec::new()),
    };

    ids.iter()
        .take(query.effective_limit())
        .map(|id| {
            component_id(id).map(ComponentRef::new).ok_or_else(|| {
                DashboardError::payload_shape(format!(
                    "component id {} under index \"{}\" is not a non-negative integer",
                    id, query.index
                ))
            })
        })
        .collect()
}

/// A component id is any non-negative integral number, `57.0` included.
fn component_id(value: &Value) -> Option<u64> {
    if let Some(id) = value.as_u64() {
        return Some(id);
    }
    let id = value.as_f64()?;
    // u64::MAX as f64 rounds up to 2^64, which is out of range.
    if id.is_finite() && id >= 0.0 && id.fract() == 0.0 && id < u64::MAX as f64 {
        Some(id as u64)
    } else {
        None
    }
}
