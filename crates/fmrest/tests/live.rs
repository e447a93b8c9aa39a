use fmrest::{FieldData, FieldValue, QueryOptions, ReadOptions, Server, ServerConfig, TlsVerification};
use serde_json::json;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn live_server() -> Option<Server> {
    if std::env::var("FMREST_INTEGRATION").is_err() {
        eprintln!("FMREST_INTEGRATION not set; skipping live test");
        return None;
    }
    let verify_ssl = if std::env::var("FMREST_INSECURE").is_ok() {
        TlsVerification::Disabled
    } else {
        TlsVerification::Enabled
    };
    let config = ServerConfig::new(
        env_or("FMREST_URL", "https://127.0.0.1"),
        env_or("FMREST_USER", "admin"),
        env_or("FMREST_PASSWORD", "admin"),
        env_or("FMREST_DATABASE", "Contacts"),
        env_or("FMREST_LAYOUT", "Contacts"),
    )
    .with_verify_ssl(verify_ssl)
    .with_auto_relogin(true);
    Some(Server::new(config).expect("server config"))
}

#[test]
fn live_create_find_edit_delete_round_trip() {
    let Some(mut server) = live_server() else {
        return;
    };
    server.login().expect("login failed");

    let name = format!("fmrest-live-{}", std::process::id());
    let fields: FieldData = [("name".to_string(), FieldValue::from(name.as_str()))]
        .into_iter()
        .collect();
    let record_id = server
        .create_record(&fields, &Default::default())
        .expect("create failed")
        .expect("server returned no record id");

    let found = server
        .find_records(&[json!({"name": format!("=={name}")})], &QueryOptions::default())
        .expect("find failed");
    let first = found.first().expect("created record not found");
    assert_eq!(first.record_id().expect("record id"), record_id);

    let mut record = server
        .get_record(record_id, &ReadOptions::default())
        .expect("get failed");
    record
        .set("name", format!("{name}-edited"))
        .expect("name on layout");
    assert!(server.edit(&record, true).expect("edit failed"));

    assert!(server.delete(&record).expect("delete failed"));
    assert!(server.logout().expect("logout failed"));
}
