//! Optional arguments of the record operations on [`crate::Server`].

use serde_json::{Map, Value};

use crate::params::{PortalSpec, Scripts, SortSpec};

pub const DEFAULT_OFFSET: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 100;

/// Options for `create_record` and `edit_record`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteOptions {
    /// Related records to create or edit through portals: `{portal name: [row, ...]}`.
    pub portal_data: Option<Map<String, Value>>,
    pub scripts: Scripts,
}

impl WriteOptions {
    pub fn with_portal_data(mut self, portal_data: Map<String, Value>) -> Self {
        self.portal_data = Some(portal_data);
        self
    }

    pub fn with_scripts(mut self, scripts: Scripts) -> Self {
        self.scripts = scripts;
        self
    }
}

/// Options for `get_record`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Portals to include; empty means every portal with server defaults.
    pub portals: Vec<PortalSpec>,
    pub scripts: Scripts,
    /// Layout whose fields and portals shape the response.
    pub response_layout: Option<String>,
}

impl ReadOptions {
    pub fn with_portals(mut self, portals: Vec<PortalSpec>) -> Self {
        self.portals = portals;
        self
    }

    pub fn with_scripts(mut self, scripts: Scripts) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_response_layout(mut self, layout: impl Into<String>) -> Self {
        self.response_layout = Some(layout.into());
        self
    }
}

/// Options for `list_records` and `find_records`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    /// 1-based position of the first record.
    pub offset: u32,
    pub limit: u32,
    pub sort: Vec<SortSpec>,
    pub portals: Vec<PortalSpec>,
    pub scripts: Scripts,
    pub response_layout: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            offset: DEFAULT_OFFSET,
            limit: DEFAULT_LIMIT,
            sort: Vec::new(),
            portals: Vec::new(),
            scripts: Scripts::default(),
            response_layout: None,
        }
    }
}

impl QueryOptions {
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_portals(mut self, portals: Vec<PortalSpec>) -> Self {
        self.portals = portals;
        self
    }

    pub fn with_scripts(mut self, scripts: Scripts) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_response_layout(mut self, layout: impl Into<String>) -> Self {
        self.response_layout = Some(layout.into());
        self
    }
}
