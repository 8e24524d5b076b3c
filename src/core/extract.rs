//! Device fact extraction.
//!
//! Extraction is a collaborator of the scan: it receives an open session and
//! returns a flat name→value map. A fact the device will not give us becomes
//! `N/A`; only a dead session or a dead link fails the device.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::session::Session;
use crate::error::{Result, ScanError};

/// Placeholder for facts that could not be read.
pub const NOT_AVAILABLE: &str = "N/A";

/// Extracted facts, keyed by column name.
pub type DeviceFields = BTreeMap<String, String>;

/// Reads facts from a device over an open session.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Column names this extractor fills, in output order.
    fn columns(&self) -> &[&'static str];

    /// Read every column. Missing facts are `N/A`.
    ///
    /// # Errors
    ///
    /// Session expiry and connectivity loss; nothing else.
    async fn extract(&self, session: &Session) -> Result<DeviceFields>;
}

/// Inventory facts every scan collects.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardExtractor;

const STANDARD_COLUMNS: &[&str] = &[
    "hostname",
    "platform",
    "serial_number",
    "registration_key",
    "active_version",
    "available_versions",
    "ha_status",
];

#[async_trait]
impl FieldExtractor for StandardExtractor {
    fn columns(&self) -> &[&'static str] {
        STANDARD_COLUMNS
    }

    async fn extract(&self, session: &Session) -> Result<DeviceFields> {
        let mut fields = DeviceFields::new();

        let settings = lookup(session, "/mgmt/tm/sys/global-settings").await?;
        put(&mut fields, "hostname", settings.as_ref().and_then(|v| str_field(v, "hostname")));

        let hardware = lookup(session, "/mgmt/tm/sys/hardware").await?;
        let system_info = hardware.as_ref().and_then(|v| subtree(v, "system-info"));
        put(&mut fields, "platform", system_info.and_then(|v| find_description(v, "platform")));
        put(
            &mut fields,
            "serial_number",
            hardware
                .as_ref()
                .and_then(|v| find_description(v, "bigipChassisSerialNum")),
        );

        let license = lookup(session, "/mgmt/tm/sys/license").await?;
        put(
            &mut fields,
            "registration_key",
            license.as_ref().and_then(|v| find_description(v, "registrationKey")),
        );

        let (active, available) = software_versions(session).await?;
        put(&mut fields, "active_version", active);
        put(&mut fields, "available_versions", available);

        put(&mut fields, "ha_status", Some(ha_status(session).await?));

        tracing::debug!(host = %session.host(), fields = fields.len(), "Extracted device facts");
        Ok(fields)
    }
}

fn put(fields: &mut DeviceFields, column: &str, value: Option<String>) {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "-")
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    fields.insert(column.to_string(), value);
}

/// GET that treats API-level failures as "no data".
async fn lookup(session: &Session, path: &str) -> Result<Option<Value>> {
    match session.get_json(path).await {
        Ok(body) => Ok(Some(body)),
        Err(e) if matches!(e, ScanError::SessionExpired { .. }) || e.is_connectivity() => Err(e),
        Err(e) => {
            tracing::debug!(host = %session.host(), path, error = %e, "Fact lookup failed");
            Ok(None)
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// First nested object whose key contains `fragment`. Stats responses key
/// their entries by self-link URL, e.g. `https://localhost/mgmt/tm/sys/hardware/system-info`.
fn subtree<'a>(value: &'a Value, fragment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.iter().find_map(|(key, child)| {
            if key.contains(fragment) {
                Some(child)
            } else {
                subtree(child, fragment)
            }
        }),
        Value::Array(items) => items.iter().find_map(|item| subtree(item, fragment)),
        _ => None,
    }
}

/// Depth-first search for `key`, returning its `description` (stats shape)
/// or its string value.
fn find_description(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                let text = match found {
                    Value::String(s) => Some(s.clone()),
                    other => other
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                if text.is_some() {
                    return text;
                }
            }
            map.values().find_map(|child| find_description(child, key))
        }
        Value::Array(items) => items.iter().find_map(|item| find_description(item, key)),
        _ => None,
    }
}

/// Active boot volume version plus a `; `-joined list of every volume.
async fn software_versions(session: &Session) -> Result<(Option<String>, Option<String>)> {
    let mut active = None;
    let mut available = Vec::new();

    if let Some(volumes) = lookup(session, "/mgmt/tm/sys/software/volume").await? {
        for volume in volumes.get("items").and_then(Value::as_array).into_iter().flatten() {
            let name = volume.get("name").and_then(Value::as_str).unwrap_or("Unknown");
            let version = volume.get("version").and_then(Value::as_str).unwrap_or("Unknown");
            match volume.get("product").and_then(Value::as_str) {
                Some(product) if !product.is_empty() => {
                    available.push(format!("{name} ({version}) - {product}"));
                }
                _ => available.push(format!("{name} ({version})")),
            }
            if volume.get("active").and_then(Value::as_bool).unwrap_or(false) {
                active = Some(version.to_string());
            }
        }
    }

    if active.is_none() {
        if let Some(version) = lookup(session, "/mgmt/tm/sys/version").await? {
            active = find_description(&version, "Version");
        }
    }

    let available = (!available.is_empty()).then(|| available.join("; "));
    Ok((active, available))
}

/// Failover status if reported, otherwise inferred from the device group size.
async fn ha_status(session: &Session) -> Result<String> {
    if let Some(failover) = lookup(session, "/mgmt/tm/sys/failover").await? {
        if let Some(status) = str_field(&failover, "status")
            .or_else(|| find_description(&failover, "status"))
            .filter(|s| !s.trim().is_empty())
        {
            return Ok(status);
        }
    }

    if let Some(devices) = lookup(session, "/mgmt/tm/cm/device").await? {
        let count = devices
            .get("items")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if count > 1 {
            return Ok(format!("Clustered ({count} devices)"));
        }
    }
    Ok("Standalone".to_string())
}
