use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::api::{MOD_ID_FIELD, PORTAL_PREFIX, RECORD_ID_FIELD};
use crate::convert::convert_string_type;
use crate::error::{Error, Result};
use crate::value::FieldValue;

/// One record as returned by (or to be sent to) the Data API.
///
/// Field names and values are kept in server order. Writes through
/// [`Record::set`] update the live value and are tracked so that only the
/// changed fields are sent back by [`crate::Server::edit`].
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    keys: Vec<String>,
    values: Vec<FieldValue>,
    in_portal: bool,
    modifications: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(keys: Vec<String>, values: Vec<FieldValue>) -> Result<Self> {
        Self::with_options(keys, values, false, false)
    }

    /// `in_portal` marks a related record, which carries no `modId`.
    /// With `type_conversion`, text values are sniffed into their guessed types.
    pub fn with_options(
        keys: Vec<String>,
        values: Vec<FieldValue>,
        in_portal: bool,
        type_conversion: bool,
    ) -> Result<Self> {
        if keys.len() != values.len() {
            return Err(Error::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        let values = if type_conversion {
            values.into_iter().map(sniff).collect()
        } else {
            values
        };
        Ok(Self {
            keys,
            values,
            in_portal,
            modifications: BTreeMap::new(),
        })
    }

    /// Builds a not-yet-persisted record, e.g. for [`crate::Server::create`].
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self::from_pairs(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
            false,
            false,
        )
    }

    pub(crate) fn from_pairs<I>(pairs: I, in_portal: bool, type_conversion: bool) -> Self
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        let (keys, values): (Vec<String>, Vec<FieldValue>) = pairs
            .into_iter()
            .map(|(key, value)| (key, if type_conversion { sniff(value) } else { value }))
            .unzip();
        Self {
            keys,
            values,
            in_portal,
            modifications: BTreeMap::new(),
        }
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.keys.iter().position(|key| key == field)
    }

    pub fn get(&self, field: &str) -> Result<&FieldValue> {
        self.position(field)
            .map(|index| &self.values[index])
            .ok_or_else(|| Error::FieldNotFound(field.to_string()))
    }

    /// Changes a field value. Setting a field to its current value is a no-op.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        let index = self
            .position(field)
            .ok_or_else(|| Error::FieldNotFound(field.to_string()))?;
        if field.starts_with(PORTAL_PREFIX) {
            return Err(Error::ReadOnlyField(field.to_string()));
        }
        let value = value.into();
        if !self.values[index].same_value(&value) {
            self.modifications.insert(field.to_string(), value.clone());
            self.values[index] = value;
        }
        Ok(())
    }

    /// Changed fields as `{field: new value}`, used for partial updates.
    pub fn modifications(&self) -> &BTreeMap<String, FieldValue> {
        &self.modifications
    }

    pub fn is_dirty(&self) -> bool {
        !self.modifications.is_empty()
    }

    pub fn is_in_portal(&self) -> bool {
        self.in_portal
    }

    /// Server record id, from the `recordId` field.
    pub fn record_id(&self) -> Result<i64> {
        self.identity_field(RECORD_ID_FIELD)
    }

    /// Server modification id, from the `modId` field. Related records have none.
    pub fn modification_id(&self) -> Result<Option<i64>> {
        if self.in_portal {
            return Ok(None);
        }
        self.identity_field(MOD_ID_FIELD).map(Some)
    }

    fn identity_field(&self, field: &str) -> Result<i64> {
        let value = self
            .get(field)
            .map_err(|_| Error::Record(format!("{field} is missing")))?;
        value
            .as_i64()
            .ok_or_else(|| Error::Record(format!("{field} is not an integer: {value:?}")))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.position(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Flattens the record into a plain mapping, optionally without portal
    /// fields and/or without `recordId`/`modId`.
    pub fn to_map(
        &self,
        ignore_portals: bool,
        ignore_internal_ids: bool,
    ) -> BTreeMap<String, FieldValue> {
        let mut out: BTreeMap<String, FieldValue> = self
            .iter()
            .filter(|(key, _)| !(ignore_portals && key.starts_with(PORTAL_PREFIX)))
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        if ignore_internal_ids {
            out.remove(RECORD_ID_FIELD);
            out.remove(MOD_ID_FIELD);
        }
        out
    }

    /// Removes a field and returns its value, or `None` if there is no such field.
    pub fn pop(&mut self, field: &str) -> Option<FieldValue> {
        let index = self.position(field)?;
        self.keys.remove(index);
        self.modifications.remove(field);
        Some(self.values.remove(index))
    }

    pub fn pop_or(&mut self, field: &str, default: FieldValue) -> FieldValue {
        self.pop(field).unwrap_or(default)
    }
}

fn sniff(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Text(text) => convert_string_type(&text),
        other => other,
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .record_id()
            .map_or_else(|_| "None".to_string(), |id| id.to_string());
        let modification_id = match self.modification_id() {
            Ok(Some(mod_id)) => mod_id.to_string(),
            _ => "None".to_string(),
        };
        write!(
            f,
            "<Record id={id} modification_id={modification_id} is_dirty={}>",
            self.is_dirty()
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundset::Foundset;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn texts(values: &[&str]) -> Vec<FieldValue> {
        values.iter().map(|value| FieldValue::from(*value)).collect()
    }

    fn david() -> Record {
        Record::new(
            keys(&["name", "drink", "city"]),
            texts(&["David", "Coffee", "Hamburg"]),
        )
        .expect("lengths match")
    }

    #[test]
    fn set_int_on_equal_float_expected_not_dirty() {
        let mut record = Record::from_pairs(
            vec![("price".to_string(), FieldValue::from("1.0"))],
            false,
            true,
        );
        assert_eq!(record.get("price").expect("price"), &FieldValue::Float(1.0));

        record.set("price", 1_i64).expect("field exists");
        assert!(!record.is_dirty());

        record.set("price", 2_i64).expect("field exists");
        assert_eq!(record.modifications()["price"], FieldValue::Int(2));
    }

    #[test]
    fn new_with_length_mismatch_expected_error() {
        let error = Record::new(keys(&["key1", "key2"]), vec![FieldValue::Int(1)])
            .expect_err("two keys, one value");
        assert!(matches!(error, Error::LengthMismatch { keys: 2, values: 1 }));

        assert!(Record::new(keys(&["key1"]), vec![FieldValue::Int(1), FieldValue::Int(2)]).is_err());
    }

    #[test]
    fn get_existing_and_missing_field_expected_value_or_field_not_found() {
        let record = david();

        assert_eq!(record.keys(), keys(&["name", "drink", "city"]).as_slice());
        assert_eq!(record.get("name").expect("name exists").as_str(), Some("David"));
        assert!(matches!(
            record.get("country"),
            Err(Error::FieldNotFound(field)) if field == "country"
        ));
    }

    #[test]
    fn set_same_value_expected_not_dirty() {
        let mut record = david();
        record.set("name", "David").expect("name exists");
        assert!(!record.is_dirty());
        assert!(record.modifications().is_empty());
    }

    #[test]
    fn set_changed_value_expected_dirty_and_live_value_updated() {
        let mut record = david();
        record.set("name", "Caspar").expect("name exists");

        assert!(record.is_dirty());
        assert_eq!(record.get("name").expect("name exists").as_str(), Some("Caspar"));
        assert_eq!(record.values()[0], FieldValue::from("Caspar"));
    }

    #[test]
    fn set_unknown_field_expected_field_not_found() {
        let mut record = Record::from_fields([("name", "David")]);
        assert!(matches!(
            record.set("drink", "Dr. Pepper"),
            Err(Error::FieldNotFound(_))
        ));
        assert!(!record.is_dirty());
    }

    #[test]
    fn set_portal_field_expected_read_only() {
        let mut record = Record::from_fields([
            ("name", FieldValue::from("David")),
            ("portal_notes", FieldValue::Related(Foundset::new(Vec::new()))),
        ]);
        assert!(matches!(
            record.set("portal_notes", 1234_i64),
            Err(Error::ReadOnlyField(field)) if field == "portal_notes"
        ));
    }

    #[test]
    fn modifications_expected_only_changed_fields() {
        let mut record = david();
        record.set("name", "David").expect("name exists");
        record.set("drink", "Dr. Pepper").expect("drink exists");
        record.set("city", "New York").expect("city exists");

        let expected = BTreeMap::from([
            ("city".to_string(), FieldValue::from("New York")),
            ("drink".to_string(), FieldValue::from("Dr. Pepper")),
        ]);
        assert_eq!(record.modifications(), &expected);
    }

    #[test]
    fn to_map_with_filters_expected_portals_and_ids_dropped() {
        let record = Record::new(
            keys(&[
                "name",
                "drink",
                "recordId",
                "modId",
                "portal_notes",
                "portal_addresses",
            ]),
            vec![
                FieldValue::from("David"),
                FieldValue::from("Coffee"),
                FieldValue::Int(1),
                FieldValue::Int(2),
                FieldValue::from("dummy"),
                FieldValue::from("dummy2"),
            ],
        )
        .expect("lengths match");

        let full = record.to_map(false, false);
        assert_eq!(full.len(), 6);
        assert_eq!(full["portal_notes"], FieldValue::from("dummy"));

        let without_portals = record.to_map(true, false);
        assert_eq!(without_portals.len(), 4);
        assert!(!without_portals.contains_key("portal_addresses"));

        let plain = record.to_map(true, true);
        assert_eq!(
            plain,
            BTreeMap::from([
                ("drink".to_string(), FieldValue::from("Coffee")),
                ("name".to_string(), FieldValue::from("David")),
            ])
        );
    }

    #[test]
    fn pop_existing_and_missing_field_expected_value_or_default() {
        let mut record = david();

        assert_eq!(record.pop("drink"), Some(FieldValue::from("Coffee")));
        assert_eq!(record.keys(), keys(&["name", "city"]).as_slice());
        assert_eq!(record.values(), texts(&["David", "Hamburg"]).as_slice());

        assert_eq!(record.pop_or("not existing", FieldValue::Null), FieldValue::Null);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn identity_fields_expected_parsed_ids_and_none_for_portal_rows() {
        let record = Record::from_fields([("recordId", "12"), ("modId", "3")]);
        assert_eq!(record.record_id().expect("record id"), 12);
        assert_eq!(record.modification_id().expect("mod id"), Some(3));

        let related = Record::with_options(
            keys(&["recordId", "Notes::text"]),
            texts(&["5", "hello"]),
            true,
            false,
        )
        .expect("lengths match");
        assert_eq!(related.record_id().expect("record id"), 5);
        assert_eq!(related.modification_id().expect("portal rows have no modId"), None);
    }

    #[test]
    fn record_id_on_unsaved_record_expected_record_error() {
        let record = Record::from_fields([("name", "David")]);
        assert!(matches!(record.record_id(), Err(Error::Record(_))));
    }

    #[test]
    fn type_conversion_expected_values_sniffed_at_construction() {
        let record = Record::with_options(
            keys(&["count", "price", "duration", "name"]),
            texts(&["42", "1.5", "48:61:01", "David"]),
            false,
            true,
        )
        .expect("lengths match");

        assert_eq!(record.get("count").expect("count"), &FieldValue::Int(42));
        assert_eq!(record.get("price").expect("price"), &FieldValue::Float(1.5));
        assert!(record.get("duration").expect("duration").as_duration().is_some());
        assert_eq!(record.get("name").expect("name").as_str(), Some("David"));
    }

    #[test]
    fn display_expected_ids_and_dirty_flag() {
        let mut record = Record::from_fields([("recordId", "1"), ("modId", "2"), ("name", "x")]);
        record.set("name", "y").expect("name exists");
        assert_eq!(
            record.to_string(),
            "<Record id=1 modification_id=2 is_dirty=true>"
        );
    }
}
