use serde::Deserialize;
use time::UtcOffset;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub access_token: String,
    pub api_base: String,
    pub data_api_base: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub model: ModelConfig,
    pub channel: ChannelConfig,
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    /// Fixed UTC offset anchoring day/week summary windows.
    pub tz_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let model = ModelConfig {
            api_key: std::env::var("GEMINI_API_KEY")?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into()),
            api_base: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
        };
        let channel = ChannelConfig {
            access_token: std::env::var("CHANNEL_ACCESS_TOKEN")?,
            api_base: std::env::var("CHANNEL_API_BASE")
                .unwrap_or_else(|_| "https://api.line.me".into()),
            data_api_base: std::env::var("CHANNEL_DATA_API_BASE")
                .unwrap_or_else(|_| "https://api-data.line.me".into()),
        };
        let tz_offset =
            parse_offset(&std::env::var("TZ_OFFSET").unwrap_or_else(|_| "+00:00".into()))?;
        Ok(Self {
            database_url,
            model,
            channel,
            minio_endpoint: std::env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            minio_bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "mealsnap".into()),
            minio_access_key: std::env::var("MINIO_ACCESS_KEY")?,
            minio_secret_key: std::env::var("MINIO_SECRET_KEY")?,
            tz_offset,
        })
    }
}

/// Parse an offset string like "+07:00", "-05:30" or "+9".
pub fn parse_offset(s: &str) -> anyhow::Result<UtcOffset> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1i8, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut parts = rest.splitn(2, ':');
    let hours: i8 = parts
        .next()
        .unwrap_or("")
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid TZ_OFFSET: {s}"))?;
    let minutes: i8 = match parts.next() {
        Some(m) => m
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid TZ_OFFSET: {s}"))?,
        None => 0,
    };
    UtcOffset::from_hms(sign * hours, sign * minutes, 0)
        .map_err(|e| anyhow::anyhow!("TZ_OFFSET out of range: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_offsets() {
        assert_eq!(
            parse_offset("+07:00").unwrap(),
            UtcOffset::from_hms(7, 0, 0).unwrap()
        );
        assert_eq!(
            parse_offset("-05:30").unwrap(),
            UtcOffset::from_hms(-5, -30, 0).unwrap()
        );
        assert_eq!(parse_offset("+9").unwrap(), UtcOffset::from_hms(9, 0, 0).unwrap());
        assert_eq!(parse_offset("0").unwrap(), UtcOffset::UTC);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_offset("bangkok").is_err());
        assert!(parse_offset("+25:00").is_err());
    }
}
