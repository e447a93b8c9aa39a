//! Data API paths and the server error codes the client interprets.

/// Field-name prefix of related-record (portal) foundsets inside a record.
pub const PORTAL_PREFIX: &str = "portal_";

pub const RECORD_ID_FIELD: &str = "recordId";
pub const MOD_ID_FIELD: &str = "modId";

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Server error codes referenced by the client.
pub mod codes {
    pub const SUCCESS: i64 = 0;
    pub const RECORD_MISSING: i64 = 101;
    pub const INVALID_USER_PASSWORD: i64 = 212;
    pub const INVALID_DAPI_TOKEN: i64 = 952;
}

const API_ROOT: &str = "/fmi/data/v1/databases";

pub fn auth_path(database: &str, token: &str) -> String {
    format!("{API_ROOT}/{database}/sessions/{token}")
}

pub fn records_path(database: &str, layout: &str) -> String {
    format!("{API_ROOT}/{database}/layouts/{layout}/records")
}

pub fn record_path(database: &str, layout: &str, record_id: i64) -> String {
    format!("{API_ROOT}/{database}/layouts/{layout}/records/{record_id}")
}

pub fn find_path(database: &str, layout: &str) -> String {
    format!("{API_ROOT}/{database}/layouts/{layout}/_find")
}

pub fn script_path(database: &str, layout: &str, script_name: &str) -> String {
    format!("{API_ROOT}/{database}/layouts/{layout}/script/{script_name}")
}

pub fn globals_path(database: &str) -> String {
    format!("{API_ROOT}/{database}/globals")
}

pub fn container_path(database: &str, layout: &str, record_id: i64, field_name: &str) -> String {
    format!(
        "{}/containers/{field_name}/1",
        record_path(database, layout, record_id)
    )
}
