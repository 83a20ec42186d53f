//! Second-resolution UTC timestamps rendered as `YYYY-MM-DD HH:MM:SS`.
//!
//! Every timestamp that leaves the process (run results and artifacts) goes
//! through this module so the textual form is identical on every write.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

pub fn truncate(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(0)
}

pub fn format(value: &DateTime<Utc>) -> String {
    value.format(FORMAT).to_string()
}

pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, FORMAT).map(|naive| naive.and_utc())
}

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(value))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_fixed_layout() {
        let ts = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format(&ts), "2021-03-04 05:06:07");
        assert_eq!(parse("2021-03-04 05:06:07").unwrap(), ts);
    }

    #[test]
    fn now_has_no_subsecond_component() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn rejects_rfc3339_input() {
        assert!(parse("2021-03-04T05:06:07Z").is_err());
    }
}
