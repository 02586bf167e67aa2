use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::normalize::{normalize_street, normalize_unit};

/// A known property. Immutable once loaded into the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub street_number: u32,
    /// Normalized street name, the lookup key.
    pub street_name: String,
    /// Normalized unit designator ("3b"), if the record is a single unit.
    pub unit: Option<String>,
    /// Display form read back to callers.
    pub full_address: String,
}

impl PropertyRecord {
    pub fn new(
        street_number: u32,
        street_name: &str,
        unit: Option<&str>,
        full_address: impl Into<String>,
    ) -> Self {
        Self {
            street_number,
            street_name: normalize_street(street_name),
            unit: unit.map(normalize_unit).filter(|u| !u.is_empty()),
            full_address: full_address.into(),
        }
    }

    /// Identity used for uniqueness within one load.
    pub fn key(&self) -> (u32, &str, Option<&str>) {
        (
            self.street_number,
            self.street_name.as_str(),
            self.unit.as_deref(),
        )
    }
}

/// A row as delivered by the registry feed.
///
/// Either the structured fields or a parseable `fullAddress`
/// ("29 Port Richmond Ave") must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProperty {
    #[serde(default, alias = "street_number")]
    pub street_number: Option<u32>,
    #[serde(default, alias = "street_name")]
    pub street_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "full_address")]
    pub full_address: Option<String>,
}

impl RawProperty {
    pub fn into_record(self) -> Result<PropertyRecord, RegistryError> {
        let (number, street) = match (self.street_number, self.street_name.as_deref()) {
            (Some(n), Some(s)) if !s.trim().is_empty() => (n, s.trim().to_string()),
            _ => {
                let full = self.full_address.as_deref().ok_or_else(|| {
                    RegistryError::InvalidRecord(
                        "record has neither street fields nor fullAddress".to_string(),
                    )
                })?;
                split_full_address(full)?
            }
        };

        let full_address = match self.full_address {
            Some(full) if !full.trim().is_empty() => full.trim().to_string(),
            _ => match &self.unit {
                Some(unit) => format!("{} {}, Unit {}", number, street, unit),
                None => format!("{} {}", number, street),
            },
        };

        let record = PropertyRecord::new(number, &street, self.unit.as_deref(), full_address);
        if record.street_name.is_empty() {
            return Err(RegistryError::InvalidRecord(format!(
                "empty street name for {}",
                record.full_address
            )));
        }
        Ok(record)
    }
}

/// Split "29 Port Richmond Ave, Staten Island" into (29, "Port Richmond Ave").
fn split_full_address(full: &str) -> Result<(u32, String), RegistryError> {
    let first_line = full.split(',').next().unwrap_or(full).trim();
    let (number, rest) = first_line
        .split_once(char::is_whitespace)
        .ok_or_else(|| RegistryError::InvalidRecord(format!("unparseable address: {}", full)))?;
    let number: u32 = number
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .map_err(|_| RegistryError::InvalidRecord(format!("no street number in: {}", full)))?;
    Ok((number, rest.trim().to_string()))
}
