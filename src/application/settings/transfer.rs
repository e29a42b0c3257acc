//! Settings export/import payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::settings::SettingKey;

pub const EXPORT_FORMAT: &str = "vellum-settings";
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportMeta {
    pub format: String,
    pub format_version: u32,
    pub schema_version: i32,
    pub generator: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

impl ExportMeta {
    pub fn new(schema_version: i32, generated_at: OffsetDateTime) -> Self {
        Self {
            format: EXPORT_FORMAT.to_string(),
            format_version: EXPORT_FORMAT_VERSION,
            schema_version,
            generator: format!("vellum {}", env!("CARGO_PKG_VERSION")),
            generated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsExport {
    pub meta: ExportMeta,
    pub settings: BTreeMap<String, Value>,
}

/// Parse an import blob into validated entries without touching storage.
pub(crate) fn parse_import(blob: &str) -> Result<Vec<(SettingKey, Value)>, String> {
    let document: Value =
        serde_json::from_str(blob).map_err(|err| format!("payload is not valid JSON: {err}"))?;

    let Value::Object(mut root) = document else {
        return Err("payload must be a JSON object".to_string());
    };

    if let Some(meta) = root.get("meta") {
        check_meta(meta)?;
    }

    let settings = match root.remove("settings") {
        Some(Value::Object(settings)) => settings,
        Some(_) => return Err("`settings` must be a JSON object".to_string()),
        None => return Err("payload is missing the `settings` object".to_string()),
    };

    let mut entries = Vec::with_capacity(settings.len());
    for (raw_key, value) in settings {
        let key = SettingKey::parse(raw_key.as_str())
            .map_err(|err| format!("invalid key `{raw_key}`: {err}"))?;
        entries.push((key, value));
    }
    Ok(entries)
}

fn check_meta(meta: &Value) -> Result<(), String> {
    let Value::Object(meta) = meta else {
        return Err("`meta` must be a JSON object".to_string());
    };

    if let Some(format) = meta.get("format") {
        if format.as_str() != Some(EXPORT_FORMAT) {
            return Err(format!("unsupported export format {format}"));
        }
    }

    if let Some(version) = meta.get("format_version") {
        let supported = version
            .as_u64()
            .is_some_and(|version| version <= u64::from(EXPORT_FORMAT_VERSION));
        if !supported {
            return Err(format!("unsupported export format version {version}"));
        }
    }

    Ok(())
}
