//! Semantic version discovery. Clusters report their version from the
//! server root; the graph stores `Option<EsVersion>` so "not discovered
//! yet" needs no sentinel value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, EsClient};

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid version {0:?}: must contain 3 numbers joined by . (dot)")]
    Invalid(String),
    #[error("failed to discover the cluster version: {0}")]
    Fetch(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for EsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for EsVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::Invalid(s.to_string());
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let major = parts[0].parse().map_err(|_| invalid())?;
        let minor = parts[1].parse().map_err(|_| invalid())?;
        let patch = parts[2].parse().map_err(|_| invalid())?;
        Ok(EsVersion {
            major,
            minor,
            patch,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RootResponse {
    version: RootVersion,
}

#[derive(Debug, Deserialize)]
struct RootVersion {
    number: String,
}

pub async fn discover(
    client: &EsClient,
    cancel: &CancellationToken,
) -> Result<EsVersion, VersionError> {
    let root: RootResponse = client.fetch_json("", cancel).await?;
    root.version.number.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_version() {
        let version: EsVersion = "7.10.2".parse().unwrap();
        assert_eq!(
            version,
            EsVersion {
                major: 7,
                minor: 10,
                patch: 2
            }
        );
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert!("7.10".parse::<EsVersion>().is_err());
        assert!("7.10.2.1".parse::<EsVersion>().is_err());
        assert!("".parse::<EsVersion>().is_err());
    }

    #[test]
    fn test_parse_rejects_non_numeric_fields() {
        assert!("7.x.2".parse::<EsVersion>().is_err());
        assert!("seven.10.2".parse::<EsVersion>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let version: EsVersion = "8.1.0".parse().unwrap();
        assert_eq!(version.to_string(), "8.1.0");
    }

    #[test]
    fn test_ordering() {
        let older: EsVersion = "6.8.23".parse().unwrap();
        let newer: EsVersion = "7.0.0".parse().unwrap();
        assert!(older < newer);
    }
}
