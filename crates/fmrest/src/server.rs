use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::api::{self, CONTENT_TYPE_JSON, codes};
use crate::cloud::CloudAuth;
use crate::config::ServerConfig;
use crate::decoder::decode_foundset;
use crate::error::{Error, Result};
use crate::foundset::Foundset;
use crate::options::{QueryOptions, ReadOptions, WriteOptions};
use crate::params::{
    PortalSpec, Scripts, build_portal_params, build_script_params, filename_from_url,
};
use crate::record::Record;
use crate::relogin::{Reauthenticate, ReloginPolicy};
use crate::transport::{
    HttpRequest, Method, ReqwestTransport, RequestBody, Transport, parse_json_body,
};
use crate::value::FieldData;

const AUTHORIZATION: &str = "Authorization";
const CONTENT_TYPE: &str = "Content-Type";
const UPLOAD_FIELD: &str = "upload";

/// Script slot whose outcome the server reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptPhase {
    Prerequest,
    Presort,
    After,
}

impl ScriptPhase {
    fn response_keys(self) -> (&'static str, &'static str) {
        match self {
            Self::Prerequest => ("scriptError.prerequest", "scriptResult.prerequest"),
            Self::Presort => ("scriptError.presort", "scriptResult.presort"),
            Self::After => ("scriptError", "scriptResult"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptResult {
    pub error: i64,
    pub result: Option<String>,
}

/// A container file fetched through [`Server::fetch_file`].
pub struct FileDownload {
    /// Unique name taken from the container URL.
    pub filename: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl FileDownload {
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Debug for FileDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDownload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

struct ApiCall {
    operation: &'static str,
    method: Method,
    path: String,
    body: RequestBody,
    query: Map<String, Value>,
    basic_auth: bool,
}

impl ApiCall {
    fn new(operation: &'static str, method: Method, path: String) -> Self {
        Self {
            operation,
            method,
            path,
            body: RequestBody::Empty,
            query: Map::new(),
            basic_auth: false,
        }
    }

    /// An empty object is sent as no body at all.
    fn json(mut self, body: Map<String, Value>) -> Self {
        if !body.is_empty() {
            self.body = RequestBody::Json(Value::Object(body));
        }
        self
    }

    fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    fn query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    fn basic_auth(mut self) -> Self {
        self.basic_auth = true;
        self
    }
}

/// A session against one database of a FileMaker Server.
///
/// Holds the bearer token, the outgoing headers and the outcome of the last
/// request. Calls take `&mut self`; share a server across threads behind a
/// mutex or give each thread its own instance.
pub struct Server<T = ReqwestTransport> {
    config: ServerConfig,
    transport: T,
    cloud: Option<CloudAuth>,
    relogin: ReloginPolicy,
    token: Option<String>,
    identity_token: Option<String>,
    headers: BTreeMap<String, String>,
    last_error: Option<i64>,
    last_script_result: BTreeMap<ScriptPhase, ScriptResult>,
}

impl Server<ReqwestTransport> {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, transport)
    }

    /// A FileMaker Cloud server, logging in through Claris ID.
    pub fn cloud(config: ServerConfig, auth: CloudAuth) -> Result<Self> {
        Ok(Self::new(config)?.with_cloud_auth(auth))
    }
}

impl<T: Transport> Server<T> {
    /// Fails with [`Error::InvalidConfiguration`] before any request if the address is not https.
    pub fn with_transport(config: ServerConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let headers = BTreeMap::from([(CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string())]);
        Ok(Self {
            relogin: ReloginPolicy::new(config.auto_relogin),
            config,
            transport,
            cloud: None,
            token: None,
            identity_token: None,
            headers,
            last_error: None,
            last_script_result: BTreeMap::new(),
        })
    }

    pub fn with_cloud_auth(mut self, auth: CloudAuth) -> Self {
        self.cloud = Some(auth);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    pub fn layout(&self) -> &str {
        &self.config.layout
    }

    /// Switches the layout used by subsequent record operations.
    pub fn set_layout(&mut self, layout: impl Into<String>) {
        self.config.layout = layout.into();
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn auto_relogin(&self) -> bool {
        self.relogin.is_enabled()
    }

    pub fn set_auto_relogin(&mut self, enabled: bool) {
        self.config.auto_relogin = enabled;
        self.relogin = ReloginPolicy::new(enabled);
    }

    /// Error code of the last request; `-1` if the response carried none, `None` before any request.
    pub fn last_error(&self) -> Option<i64> {
        self.last_error
    }

    /// Script outcomes of the last request, only for phases that ran.
    pub fn last_script_result(&self) -> &BTreeMap<ScriptPhase, ScriptResult> {
        &self.last_script_result
    }

    fn succeeded(&self) -> bool {
        self.last_error == Some(codes::SUCCESS)
    }

    fn with_auto_relogin<R>(&mut self, operation: impl FnMut(&mut Self) -> Result<R>) -> Result<R> {
        let policy = self.relogin;
        policy.run(self, operation)
    }

    /// Logs in and returns the new session token.
    ///
    /// Uses basic auth, or the Claris ID exchange when cloud auth is configured.
    pub fn login(&mut self) -> Result<String> {
        self.token = None;
        let path = api::auth_path(&self.config.database, "");
        let mut body = Map::new();
        body.insert(
            "fmDataSource".to_string(),
            serde_json::to_value(&self.config.data_sources)?,
        );
        let call = ApiCall::new("login", Method::Post, path).json(body);

        debug!(
            database = %self.config.database,
            cloud = self.cloud.is_some(),
            "logging in"
        );
        let response = match self.cloud.clone() {
            Some(cloud) => {
                let identity = cloud.identity_token(&self.config.user, &self.config.password)?;
                self.identity_token = Some(identity);
                let response = self.call_filemaker(call);
                self.identity_token = None;
                response?
            }
            None => self.call_filemaker(call.basic_auth())?,
        };

        let token = response
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::response("login response carries no token"))?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Ends the session. The token is dropped even if the request fails.
    pub fn logout(&mut self) -> Result<bool> {
        let token = self.token.take().unwrap_or_default();
        let path = api::auth_path(&self.config.database, &token);
        debug!(database = %self.config.database, "logging out");
        self.call_filemaker(ApiCall::new("logout", Method::Delete, path))?;
        Ok(self.succeeded())
    }

    /// Creates a record on the current layout and returns its id.
    pub fn create_record(
        &mut self,
        field_data: &FieldData,
        options: &WriteOptions,
    ) -> Result<Option<i64>> {
        self.with_auto_relogin(|server| {
            let path = api::records_path(&server.config.database, &server.config.layout);
            let mut body = Map::new();
            body.insert("fieldData".to_string(), serde_json::to_value(field_data)?);
            insert_portal_data(&mut body, options);
            body.extend(build_script_params(&options.scripts));

            let response = server
                .call_filemaker(ApiCall::new("create_record", Method::Post, path).json(body))?;
            Ok(response.get(api::RECORD_ID_FIELD).and_then(integer))
        })
    }

    /// Updates the given fields of a record. With `mod_id` the server rejects
    /// the edit unless the record is still at that modification id.
    pub fn edit_record(
        &mut self,
        record_id: i64,
        field_data: &FieldData,
        mod_id: Option<i64>,
        options: &WriteOptions,
    ) -> Result<bool> {
        self.with_auto_relogin(|server| {
            let path = api::record_path(&server.config.database, &server.config.layout, record_id);
            let mut body = Map::new();
            body.insert("fieldData".to_string(), serde_json::to_value(field_data)?);
            if let Some(mod_id) = mod_id {
                body.insert(api::MOD_ID_FIELD.to_string(), Value::String(mod_id.to_string()));
            }
            insert_portal_data(&mut body, options);
            body.extend(build_script_params(&options.scripts));

            server.call_filemaker(ApiCall::new("edit_record", Method::Patch, path).json(body))?;
            Ok(server.succeeded())
        })
    }

    pub fn delete_record(&mut self, record_id: i64, scripts: &Scripts) -> Result<bool> {
        self.with_auto_relogin(|server| {
            let path = api::record_path(&server.config.database, &server.config.layout, record_id);
            let call = ApiCall::new("delete_record", Method::Delete, path)
                .query(build_script_params(scripts));
            server.call_filemaker(call)?;
            Ok(server.succeeded())
        })
    }

    pub fn get_record(&mut self, record_id: i64, options: &ReadOptions) -> Result<Record> {
        self.with_auto_relogin(|server| {
            let path = api::record_path(&server.config.database, &server.config.layout, record_id);
            let mut query = portal_query(&options.portals);
            insert_response_layout(&mut query, options.response_layout.as_deref());
            query.extend(build_script_params(&options.scripts));

            let response =
                server.call_filemaker(ApiCall::new("get_record", Method::Get, path).query(query))?;
            decode_foundset(response, server.config.type_conversion)?
                .first()
                .ok_or_else(|| Error::response("get_record response carries no record"))
        })
    }

    /// Lists records of the current layout, one page at a time.
    pub fn list_records(&mut self, options: &QueryOptions) -> Result<Foundset> {
        self.with_auto_relogin(|server| {
            let path = api::records_path(&server.config.database, &server.config.layout);
            let mut query = portal_query(&options.portals);
            query.insert("_offset".to_string(), Value::from(options.offset));
            query.insert("_limit".to_string(), Value::from(options.limit));
            insert_response_layout(&mut query, options.response_layout.as_deref());
            if !options.sort.is_empty() {
                query.insert(
                    "_sort".to_string(),
                    Value::String(serde_json::to_string(&options.sort)?),
                );
            }
            query.extend(build_script_params(&options.scripts));

            let response =
                server.call_filemaker(ApiCall::new("list_records", Method::Get, path).query(query))?;
            decode_foundset(response, server.config.type_conversion)
        })
    }

    /// Performs a find. Each element of `query` is one find request,
    /// e.g. `{"drink": "Coffee"}`; add `"omit": "true"` to exclude matches.
    pub fn find_records(&mut self, query: &[Value], options: &QueryOptions) -> Result<Foundset> {
        self.with_auto_relogin(|server| {
            let path = api::find_path(&server.config.database, &server.config.layout);
            let mut body = Map::new();
            body.insert("query".to_string(), Value::Array(query.to_vec()));
            if !options.sort.is_empty() {
                body.insert("sort".to_string(), serde_json::to_value(&options.sort)?);
            }
            body.insert("limit".to_string(), Value::String(options.limit.to_string()));
            body.insert("offset".to_string(), Value::String(options.offset.to_string()));
            insert_response_layout(&mut body, options.response_layout.as_deref());
            body.extend(build_script_params(&options.scripts));
            if !options.portals.is_empty() {
                body.extend(build_portal_params(&options.portals, false));
            }
            // The Data API rejects null-valued parameters.
            body.retain(|_, value| !value.is_null());

            let response =
                server.call_filemaker(ApiCall::new("find_records", Method::Post, path).json(body))?;
            decode_foundset(response, server.config.type_conversion)
        })
    }

    /// Runs a script on the current layout and returns its error code and result.
    pub fn run_script(
        &mut self,
        name: &str,
        param: Option<&str>,
    ) -> Result<(Option<i64>, Option<String>)> {
        self.with_auto_relogin(|server| {
            let path = api::script_path(&server.config.database, &server.config.layout, name);
            let mut query = Map::new();
            if let Some(param) = param {
                query.insert("script.param".to_string(), Value::from(param));
            }

            let response =
                server.call_filemaker(ApiCall::new("run_script", Method::Get, path).query(query))?;
            let error = response.get("scriptError").and_then(integer);
            let result = response.get("scriptResult").and_then(script_text);
            Ok((error, result))
        })
    }

    /// Sets global fields for the session. Names must be fully qualified (`Table::field`).
    pub fn set_globals(&mut self, globals: &FieldData) -> Result<bool> {
        self.with_auto_relogin(|server| {
            let path = api::globals_path(&server.config.database);
            let mut body = Map::new();
            body.insert("globalFields".to_string(), serde_json::to_value(globals)?);
            server.call_filemaker(ApiCall::new("set_globals", Method::Patch, path).json(body))?;
            Ok(server.succeeded())
        })
    }

    /// Uploads `file` into a container field of the given record.
    ///
    /// The content is read up front so the request can be replayed after a relogin.
    pub fn upload_container(
        &mut self,
        record_id: i64,
        field_name: &str,
        file_name: &str,
        mut file: impl Read,
    ) -> Result<bool> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        self.with_auto_relogin(|server| {
            let path = api::container_path(
                &server.config.database,
                &server.config.layout,
                record_id,
                field_name,
            );
            let body = RequestBody::Multipart {
                field: UPLOAD_FIELD.to_string(),
                file_name: file_name.to_string(),
                bytes: bytes.clone(),
            };

            // The transport sets the multipart content type, boundary included.
            server.headers.remove(CONTENT_TYPE);
            let outcome =
                server.call_filemaker(ApiCall::new("upload_container", Method::Post, path).body(body));
            server
                .headers
                .insert(CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string());
            outcome?;
            Ok(server.succeeded())
        })
    }

    pub fn upload_container_file(
        &mut self,
        record_id: i64,
        field_name: &str,
        path: impl AsRef<Path>,
    ) -> Result<bool> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UPLOAD_FIELD.to_string());
        let file = File::open(path)?;
        self.upload_container(record_id, field_name, &file_name, file)
    }

    /// Downloads a container file by the URL stored in the record.
    ///
    /// With `stream` the body is left unread so headers can be inspected before
    /// downloading; otherwise it is buffered in memory.
    pub fn fetch_file(&self, url: &str, stream: bool) -> Result<FileDownload> {
        let filename = filename_from_url(url).to_string();
        debug!(filename = %filename, stream, "fetching container file");

        let response = self
            .transport
            .execute(HttpRequest::new(Method::Get, url))
            .map_err(|source| Error::Request {
                method: Method::Get.to_string(),
                url: url.to_string(),
                source,
            })?;
        let content_type = response.content_type().map(str::to_string);
        let content_length = response.content_length();
        let body: Box<dyn Read + Send> = if stream {
            response.into_reader()
        } else {
            let bytes = response.into_bytes().map_err(|source| Error::Request {
                method: Method::Get.to_string(),
                url: url.to_string(),
                source: Box::new(source),
            })?;
            Box::new(Cursor::new(bytes))
        };

        Ok(FileDownload {
            filename,
            content_type,
            content_length,
            body,
        })
    }

    /// Creates a copy of `record`, without its portals and ids.
    pub fn create(&mut self, record: &Record) -> Result<Option<i64>> {
        self.create_record(&record.to_map(true, true), &WriteOptions::default())
    }

    /// Writes the pending modifications of `record`. With `validate_mod_id`
    /// the edit only succeeds if the record was not changed on the server since it was read.
    pub fn edit(&mut self, record: &Record, validate_mod_id: bool) -> Result<bool> {
        let mod_id = if validate_mod_id {
            record.modification_id()?
        } else {
            None
        };
        self.edit_record(
            record.record_id()?,
            record.modifications(),
            mod_id,
            &WriteOptions::default(),
        )
    }

    pub fn delete(&mut self, record: &Record) -> Result<bool> {
        let record_id = record.record_id().map_err(|_| {
            Error::Record("Not a valid record instance. record_id is missing.".to_string())
        })?;
        self.delete_record(record_id, &Scripts::default())
    }

    fn update_token_header(&mut self) {
        let authorization = match (&self.identity_token, &self.token) {
            (Some(identity), _) => Some(format!("FMID {identity}")),
            (None, Some(token)) => Some(format!("Bearer {token}")),
            (None, None) => None,
        };
        match authorization {
            Some(value) => {
                self.headers.insert(AUTHORIZATION.to_string(), value);
            }
            None => {
                self.headers.remove(AUTHORIZATION);
            }
        }
    }

    fn call_filemaker(&mut self, call: ApiCall) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url(), call.path);
        self.update_token_header();

        let mut request = HttpRequest::new(call.method, url.clone());
        request.headers = self.headers.clone();
        request.query = query_pairs(call.query);
        request.body = call.body;
        if call.basic_auth {
            request.basic_auth = Some((self.config.user.clone(), self.config.password.clone()));
        }

        debug!(
            operation = call.operation,
            method = %call.method,
            database = %self.config.database,
            layout = %self.config.layout,
            "calling data api"
        );
        let response = self
            .transport
            .execute(request)
            .map_err(|source| Error::Request {
                method: call.method.to_string(),
                url: url.clone(),
                source,
            })?;

        // A timeout or reset while the body streams in is still a request failure.
        let status = response.status;
        let content_type = response.content_type().map(str::to_string);
        let bytes = response.into_bytes().map_err(|source| Error::Request {
            method: call.method.to_string(),
            url,
            source: Box::new(source),
        })?;
        let payload = parse_json_body(status, content_type, &bytes)?;
        self.process_envelope(payload)
    }

    /// Records script results and the error code, then returns the `response` payload.
    fn process_envelope(&mut self, mut payload: Value) -> Result<Value> {
        let response = match payload.get_mut("response").map(Value::take) {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(response) => response,
        };
        self.last_script_result = script_results(&response);

        let first = payload
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .ok_or_else(|| Error::response("response carries no messages"))?;
        let code = match first.get("code") {
            None => -1,
            Some(code) => integer(code)
                .ok_or_else(|| Error::response(format!("unreadable error code {code}")))?,
        };
        self.last_error = Some(code);

        if code != codes::SUCCESS {
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(Error::remote(code, message));
        }
        Ok(response)
    }
}

impl<T: Transport> Reauthenticate for Server<T> {
    fn reauthenticate(&mut self) -> Result<()> {
        self.token = None;
        self.login().map(|_| ())
    }
}

impl<T> fmt::Display for Server<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Server logged_in={} database={} layout={}>",
            self.token.is_some(),
            self.config.database,
            self.config.layout
        )
    }
}

impl<T> fmt::Debug for Server<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("cloud", &self.cloud)
            .field("logged_in", &self.token.is_some())
            .field("last_error", &self.last_error)
            .field("last_script_result", &self.last_script_result)
            .finish_non_exhaustive()
    }
}

fn insert_portal_data(body: &mut Map<String, Value>, options: &WriteOptions) {
    if let Some(portal_data) = options.portal_data.as_ref().filter(|data| !data.is_empty()) {
        body.insert("portalData".to_string(), Value::Object(portal_data.clone()));
    }
}

fn insert_response_layout(params: &mut Map<String, Value>, layout: Option<&str>) {
    if let Some(layout) = layout {
        params.insert("layout.response".to_string(), Value::from(layout));
    }
}

fn portal_query(portals: &[PortalSpec]) -> Map<String, Value> {
    if portals.is_empty() {
        Map::new()
    } else {
        build_portal_params(portals, true)
    }
}

/// Flattens parameters into query pairs; nulls are dropped, strings are sent unquoted.
fn query_pairs(params: Map<String, Value>) -> Vec<(String, String)> {
    params
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

/// Reads an integer the Data API may send either as a number or as numeric text.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn script_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn script_results(response: &Value) -> BTreeMap<ScriptPhase, ScriptResult> {
    [ScriptPhase::Prerequest, ScriptPhase::Presort, ScriptPhase::After]
        .into_iter()
        .filter_map(|phase| {
            let (error_key, result_key) = phase.response_keys();
            let error = response.get(error_key).and_then(integer)?;
            let result = response.get(result_key).and_then(script_text);
            Some((phase, ScriptResult { error, result }))
        })
        .collect()
}
