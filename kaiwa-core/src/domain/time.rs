// 时间戳序列化辅助
//
// 旧版记录里的消息时间戳既可能是 ISO 8601 字符串（浏览器 Date 序列化），
// 也可能是毫秒数。读取时统一归一化为 DateTime<Utc>，写出时固定为 RFC 3339

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// 消息时间戳：写 RFC 3339，读 RFC 3339 或毫秒数
pub mod flexible_timestamp {
    use super::*;

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Iso(String),
            Millis(i64),
            Float(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Iso(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom),
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
            Raw::Float(ms) => Utc
                .timestamp_millis_opt(ms as i64)
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "flexible_timestamp")]
        ts: DateTime<Utc>,
    }

    #[test]
    fn test_reads_iso_string() {
        let w: Wrapper = serde_json::from_str(r#"{"ts":"2024-05-01T12:30:00Z"}"#).unwrap();
        assert_eq!(w.ts.timestamp(), 1714566600);
    }

    #[test]
    fn test_reads_epoch_millis() {
        let w: Wrapper = serde_json::from_str(r#"{"ts":1714566600000}"#).unwrap();
        assert_eq!(w.ts.timestamp(), 1714566600);
    }

    #[test]
    fn test_writes_rfc3339() {
        let w: Wrapper = serde_json::from_str(r#"{"ts":1714566600000}"#).unwrap();
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("2024-05-01T12:30:00"));
    }

    #[test]
    fn test_rejects_garbage() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"ts":"not-a-date"}"#);
        assert!(result.is_err());
    }
}
