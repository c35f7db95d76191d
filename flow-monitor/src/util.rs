/// Rendering of a metric that is undefined for the current counters
pub const NO_DATA: &str = "N/A";

/// (De)serializes an `Option<T>` as either the value itself or the `N/A` sentinel, so "no data"
/// can never be mistaken for zero
pub mod serde_no_data {
    use super::NO_DATA;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(NO_DATA),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ValueOrSentinel<T> {
            Value(T),
            Sentinel(String),
        }

        match ValueOrSentinel::<T>::deserialize(deserializer)? {
            ValueOrSentinel::Value(v) => Ok(Some(v)),
            ValueOrSentinel::Sentinel(s) if s == NO_DATA => Ok(None),
            ValueOrSentinel::Sentinel(s) => Err(D::Error::custom(format!(
                "expected a number or `{NO_DATA}`, found `{s}`"
            ))),
        }
    }
}
