//! Request parameter builders for portals, scripts and sorting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_PORTAL_OFFSET: u32 = 1;
pub const DEFAULT_PORTAL_LIMIT: u32 = 50;

/// Selects a portal (by object name) and the slice of related records to return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSpec {
    pub name: String,
    pub offset: u32,
    pub limit: u32,
}

impl PortalSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset: DEFAULT_PORTAL_OFFSET,
            limit: DEFAULT_PORTAL_LIMIT,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Builds portal parameters in the shape the server expects.
///
/// Query-string form (`names_as_string`): `portal=["P1", "P2"]&_offset.P1=1&_limit.P1=50`.
/// Body form: `{"portal": ["P1", "P2"], "offset.P1": 1, "limit.P1": 50}`.
pub fn build_portal_params(portals: &[PortalSpec], names_as_string: bool) -> Map<String, Value> {
    let mut params = Map::new();
    let names: Vec<&str> = portals.iter().map(|portal| portal.name.as_str()).collect();

    let prefix = if names_as_string {
        let quoted: Vec<String> = names.iter().map(|name| format!("\"{name}\"")).collect();
        params.insert(
            "portal".to_string(),
            Value::String(format!("[{}]", quoted.join(", "))),
        );
        "_"
    } else {
        params.insert(
            "portal".to_string(),
            Value::Array(names.iter().map(|name| Value::from(*name)).collect()),
        );
        ""
    };

    for portal in portals {
        params.insert(
            format!("{prefix}offset.{}", portal.name),
            Value::from(portal.offset),
        );
        params.insert(
            format!("{prefix}limit.{}", portal.name),
            Value::from(portal.limit),
        );
    }
    params
}

/// A script to run, with an optional parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptCall {
    pub name: String,
    pub param: Option<String>,
}

impl ScriptCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param: None,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }
}

/// Scripts to run around a request: before it, before sorting, and after it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    pub prerequest: Option<ScriptCall>,
    pub presort: Option<ScriptCall>,
    pub after: Option<ScriptCall>,
}

impl Scripts {
    pub fn prerequest(mut self, script: ScriptCall) -> Self {
        self.prerequest = Some(script);
        self
    }

    pub fn presort(mut self, script: ScriptCall) -> Self {
        self.presort = Some(script);
        self
    }

    pub fn after(mut self, script: ScriptCall) -> Self {
        self.after = Some(script);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prerequest.is_none() && self.presort.is_none() && self.after.is_none()
    }
}

/// Flattens [`Scripts`] into the `script.*` keys, omitting phases and params that are unset.
pub fn build_script_params(scripts: &Scripts) -> Map<String, Value> {
    let mut params = Map::new();
    let phases = [
        ("script.prerequest", &scripts.prerequest),
        ("script.presort", &scripts.presort),
        ("script", &scripts.after),
    ];
    for (key, call) in phases {
        let Some(call) = call else {
            continue;
        };
        params.insert(key.to_string(), Value::from(call.name.as_str()));
        if let Some(param) = &call.param {
            params.insert(format!("{key}.param"), Value::from(param.as_str()));
        }
    }
    params
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascend,
    Descend,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub field_name: String,
    pub sort_order: SortOrder,
}

impl SortSpec {
    pub fn ascend(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            sort_order: SortOrder::Ascend,
        }
    }

    pub fn descend(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            sort_order: SortOrder::Descend,
        }
    }
}

/// Extracts the file name (last path segment, without query string) from a container URL.
pub fn filename_from_url(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}
