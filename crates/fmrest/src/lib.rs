#![doc = r#"
Client for the FileMaker Data API.

Operation mapping:

| Server method | Data API endpoint |
| --- | --- |
| `Server::login` | `POST /fmi/data/v1/databases/:database/sessions` |
| `Server::logout` | `DELETE /fmi/data/v1/databases/:database/sessions/:token` |
| `Server::create_record` | `POST .../layouts/:layout/records` |
| `Server::edit_record` | `PATCH .../layouts/:layout/records/:id` |
| `Server::delete_record` | `DELETE .../layouts/:layout/records/:id` |
| `Server::get_record` | `GET .../layouts/:layout/records/:id` |
| `Server::list_records` | `GET .../layouts/:layout/records` |
| `Server::find_records` | `POST .../layouts/:layout/_find` |
| `Server::run_script` | `GET .../layouts/:layout/script/:name` |
| `Server::set_globals` | `PATCH /fmi/data/v1/databases/:database/globals` |
| `Server::upload_container` | `POST .../records/:id/containers/:field/1` |

Implementation notes:
- Query results come back as a [`Foundset`]: records are decoded the first time they are reached and cached, so a foundset can be iterated repeatedly.
- Portals appear as `portal_<name>` fields holding a nested `Foundset`; they cannot be assigned through [`Record::set`].
- Every data operation fails with [`Error::Remote`] when the server reports a non-zero code. With auto relogin enabled, code 952 (expired token) triggers one fresh login and one retry.
- Only https addresses are accepted.
"#]

pub mod api;
pub mod cloud;
pub mod config;
pub mod convert;
pub mod decoder;
pub mod error;
pub mod foundset;
pub mod options;
pub mod params;
pub mod record;
pub mod relogin;
pub mod server;
pub mod testing;
pub mod transport;
pub mod value;

pub use api::codes;
pub use cloud::{CloudAuth, DEFAULT_CLIENT_ID, DEFAULT_USER_POOL_ID, IdentityProvider};
pub use config::{DataSource, ServerConfig, TlsVerification, default_timeout};
pub use convert::convert_string_type;
pub use error::{BoxError, Error, Result};
pub use foundset::Foundset;
pub use options::{QueryOptions, ReadOptions, WriteOptions};
pub use params::{PortalSpec, ScriptCall, Scripts, SortOrder, SortSpec};
pub use record::Record;
pub use relogin::ReloginPolicy;
pub use server::{FileDownload, ScriptPhase, ScriptResult, Server};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, RequestBody, Transport};
pub use value::{FieldData, FieldValue};
