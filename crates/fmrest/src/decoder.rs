//! Turns Data API record payloads into [`Record`]s and [`Foundset`]s.
//!
//! Records are decoded on demand: the returned foundset owns the raw rows and
//! converts each one the first time it is reached. Portal rows get the same
//! treatment, nested one level down.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::api::{MOD_ID_FIELD, PORTAL_PREFIX, RECORD_ID_FIELD};
use crate::error::{Error, Result};
use crate::foundset::Foundset;
use crate::record::Record;
use crate::value::FieldValue;

/// Decodes the `response` object of a get/list/find call into a foundset.
///
/// `dataInfo`, when present, becomes the foundset's info. A response without
/// a `data` array, or with a row of the wrong shape, is rejected.
pub fn decode_foundset(mut response: Value, type_conversion: bool) -> Result<Foundset> {
    let info = match response.get_mut("dataInfo").map(Value::take) {
        Some(Value::Object(info)) => info,
        _ => Map::new(),
    };
    let rows = match response.get_mut("data").map(Value::take) {
        Some(Value::Array(rows)) => rows,
        _ => return Err(Error::response("response carries no data array")),
    };
    tracing::trace!(rows = rows.len(), "decoding record payload");
    Ok(Foundset::with_info(decode_records(rows, type_conversion)?, info))
}

/// Checks the shape of every row, then lazily maps them to records in server order.
pub fn decode_records(
    rows: Vec<Value>,
    type_conversion: bool,
) -> Result<impl Iterator<Item = Record> + Send + 'static> {
    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| RawRecord::from_row(index, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .map(move |row| row.into_record(type_conversion)))
}

/// A data row whose shape has been checked but whose values are not converted yet.
struct RawRecord {
    field_data: Map<String, Value>,
    record_id: Value,
    mod_id: Value,
    portals: Vec<RawPortal>,
}

struct RawPortal {
    name: String,
    rows: Vec<Map<String, Value>>,
    info: Map<String, Value>,
}

impl RawRecord {
    fn from_row(index: usize, row: Value) -> Result<Self> {
        let Value::Object(mut row) = row else {
            return Err(Error::response(format!("data row {index} is not an object")));
        };
        let field_data = match row.remove("fieldData") {
            Some(Value::Object(fields)) => fields,
            Some(_) => {
                return Err(Error::response(format!(
                    "fieldData of data row {index} is not an object"
                )));
            }
            None => return Err(Error::response(format!("data row {index} has no fieldData"))),
        };

        let portals = match row.remove("portalData") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(portals)) => {
                let mut portal_info = portal_info_by_name(row.get("portalDataInfo"));
                portals
                    .into_iter()
                    .map(|(name, rows)| {
                        let rows = portal_rows(index, &name, rows)?;
                        let info = portal_info.remove(&name).unwrap_or_default();
                        Ok(RawPortal { name, rows, info })
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            Some(_) => {
                return Err(Error::response(format!(
                    "portalData of data row {index} is not an object"
                )));
            }
        };

        Ok(Self {
            field_data,
            record_id: row.remove(RECORD_ID_FIELD).unwrap_or(Value::Null),
            mod_id: row.remove(MOD_ID_FIELD).unwrap_or(Value::Null),
            portals,
        })
    }

    fn into_record(self, type_conversion: bool) -> Record {
        let mut field_data = self.field_data;
        field_data.insert(RECORD_ID_FIELD.to_string(), self.record_id);
        field_data.insert(MOD_ID_FIELD.to_string(), self.mod_id);

        let mut pairs: Vec<(String, FieldValue)> = field_data
            .into_iter()
            .map(|(key, value)| (key, FieldValue::from_json(value)))
            .collect();

        for portal in self.portals {
            let related = Foundset::with_info(
                portal
                    .rows
                    .into_iter()
                    .map(move |portal_row| decode_portal_row(portal_row, type_conversion)),
                portal.info,
            );
            pairs.push((
                format!("{PORTAL_PREFIX}{}", portal.name),
                FieldValue::Related(related),
            ));
        }

        Record::from_pairs(pairs, false, type_conversion)
    }
}

fn portal_rows(index: usize, name: &str, rows: Value) -> Result<Vec<Map<String, Value>>> {
    let Value::Array(rows) = rows else {
        return Err(Error::response(format!(
            "portal {name} of data row {index} is not an array"
        )));
    };
    rows.into_iter()
        .map(|row| match row {
            Value::Object(fields) => Ok(fields),
            _ => Err(Error::response(format!(
                "portal {name} of data row {index} holds a non-object row"
            ))),
        })
        .collect()
}

fn decode_portal_row(fields: Map<String, Value>, type_conversion: bool) -> Record {
    Record::from_pairs(
        fields
            .into_iter()
            .map(|(key, value)| (key, FieldValue::from_json(value))),
        true,
        type_conversion,
    )
}

/// Indexes `portalDataInfo` entries by portal object name, falling back to the table name.
fn portal_info_by_name(info: Option<&Value>) -> HashMap<String, Map<String, Value>> {
    let Some(Value::Array(entries)) = info else {
        return HashMap::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let entry = entry.as_object()?;
            let name = entry
                .get("portalObjectName")
                .or_else(|| entry.get("table"))
                .and_then(Value::as_str)?;
            Some((name.to_string(), entry.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_response() -> Value {
        json!({
            "dataInfo": {
                "database": "Contacts",
                "layout": "Contacts",
                "table": "Contacts",
                "totalRecordCount": 2,
                "foundCount": 2,
                "returnedCount": 2
            },
            "data": [
                {
                    "fieldData": {"name": "David", "drink": "Coffee"},
                    "portalData": {
                        "notes": [
                            {"recordId": "1", "Notes::note": "first note", "modId": "0"},
                            {"recordId": "2", "Notes::note": "second note", "modId": "0"}
                        ]
                    },
                    "portalDataInfo": [
                        {
                            "portalObjectName": "notes",
                            "database": "Contacts",
                            "table": "Notes",
                            "foundCount": 2,
                            "returnedCount": 2
                        }
                    ],
                    "recordId": "1",
                    "modId": "7"
                },
                {
                    "fieldData": {"name": "Caspar", "drink": "Tea"},
                    "portalData": {},
                    "recordId": "2",
                    "modId": "3"
                }
            ]
        })
    }

    #[test]
    fn decode_foundset_expected_fields_ids_and_portals() {
        let foundset = decode_foundset(sample_response(), false).expect("valid payload");
        assert_eq!(foundset.info()["foundCount"], json!(2));

        let david = foundset.get(0).expect("first record");
        assert_eq!(david.keys(), ["name", "drink", "recordId", "modId", "portal_notes"]);
        assert_eq!(david.record_id().expect("record id"), 1);
        assert_eq!(david.modification_id().expect("mod id"), Some(7));

        let notes = david
            .get("portal_notes")
            .expect("portal field")
            .as_related()
            .expect("portal is a foundset")
            .clone();
        assert_eq!(notes.info()["table"], json!("Notes"));
        assert!(!notes.is_complete());

        let rows = notes.to_vec();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_in_portal());
        assert_eq!(rows[0].modification_id().expect("portal rows"), None);
        assert_eq!(
            rows[1].get("Notes::note").expect("note").as_str(),
            Some("second note")
        );
    }

    #[test]
    fn decode_foundset_is_lazy_expected_nothing_decoded_up_front() {
        let foundset = decode_foundset(sample_response(), false).expect("valid payload");
        assert_eq!(foundset.cached_len(), 0);
        let _ = foundset.first();
        assert_eq!(foundset.cached_len(), 1);
        assert!(!foundset.is_complete());
    }

    #[test]
    fn decode_foundset_without_data_expected_response_error() {
        let error = decode_foundset(json!({"dataInfo": {}}), false).expect_err("no data");
        assert!(matches!(error, Error::Response(_)));
    }

    #[test]
    fn decode_foundset_malformed_row_expected_response_error() {
        let payloads = [
            json!({"data": [42]}),
            json!({"data": [{"recordId": "7", "modId": "1"}]}),
            json!({"data": [{"fieldData": "oops", "recordId": "8", "modId": "1"}]}),
            json!({"data": [{"fieldData": {}, "recordId": "9", "portalData": {"p": 5}}]}),
            json!({"data": [{"fieldData": {}, "recordId": "9", "portalData": {"p": [1]}}]}),
        ];
        for payload in payloads {
            let error = decode_foundset(payload.clone(), false).expect_err("malformed row");
            assert!(matches!(error, Error::Response(_)), "{payload}: {error}");
        }
    }

    #[test]
    fn decode_foundset_bad_row_after_good_ones_expected_error_before_any_record() {
        let response = json!({
            "data": [
                {"fieldData": {"name": "David"}, "recordId": "1", "modId": "1"},
                {"fieldData": null, "recordId": "2", "modId": "1"}
            ]
        });
        let error = decode_foundset(response, false).expect_err("second row is malformed");
        assert!(error.to_string().contains("data row 1"));
    }

    #[test]
    fn decode_foundset_without_data_info_expected_empty_info() {
        let foundset = decode_foundset(json!({"data": []}), false).expect("valid payload");
        assert!(foundset.info().is_empty());
        assert!(foundset.to_vec().is_empty());
    }

    #[test]
    fn decode_with_type_conversion_expected_sniffed_values() {
        let response = json!({
            "data": [{
                "fieldData": {"age": "42", "born": "12/24/2016"},
                "portalData": {"visits": [{"recordId": "9", "Visits::length": "01:30:00"}]},
                "recordId": "5",
                "modId": "1"
            }]
        });
        let record = decode_foundset(response, true)
            .expect("valid payload")
            .first()
            .expect("one record");

        assert_eq!(record.get("age").expect("age"), &FieldValue::Int(42));
        assert!(record.get("born").expect("born").as_datetime().is_some());
        assert_eq!(record.get("recordId").expect("id"), &FieldValue::Int(5));

        let visit = record
            .get("portal_visits")
            .expect("portal")
            .as_related()
            .and_then(Foundset::first)
            .expect("one visit");
        assert!(visit.get("Visits::length").expect("length").as_duration().is_some());
    }

    #[test]
    fn portal_info_without_object_name_expected_table_fallback() {
        let info = json!([{"table": "Orders", "foundCount": 3}]);
        let indexed = portal_info_by_name(Some(&info));
        assert_eq!(indexed["Orders"]["foundCount"], json!(3));
    }
}
