//! Advertisement record: one discovered peer and its optional fields.

use serde::{Deserialize, Serialize};

use crate::address::BdAddr;

/// One peer discovered during a scan cycle.
///
/// Field order is the serialization order. Optional fields are present in
/// the encoded form if and only if the scan driver reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementRecord {
    pub address: BdAddr,
    /// Received signal strength in dBm.
    pub signal_strength: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// GAP appearance category code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<u16>,
    /// Raw manufacturer-specific data, encoded as lowercase hex text.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hex_bytes")]
    pub manufacturer_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_power: Option<i32>,
}

impl AdvertisementRecord {
    /// Create a record carrying only the mandatory fields.
    #[must_use]
    pub fn new(address: BdAddr, signal_strength: i32) -> Self {
        Self {
            address,
            signal_strength,
            name: None,
            appearance: None,
            manufacturer_data: None,
            service_identifier: None,
            tx_power: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_appearance(mut self, appearance: u16) -> Self {
        self.appearance = Some(appearance);
        self
    }

    #[must_use]
    pub fn with_manufacturer_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data = Some(data.into());
        self
    }

    #[must_use]
    pub fn with_service_identifier(mut self, service: impl Into<String>) -> Self {
        self.service_identifier = Some(service.into());
        self
    }

    #[must_use]
    pub fn with_tx_power(mut self, tx_power: i32) -> Self {
        self.tx_power = Some(tx_power);
        self
    }

    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    pub fn has_appearance(&self) -> bool {
        self.appearance.is_some()
    }

    pub fn has_manufacturer_data(&self) -> bool {
        self.manufacturer_data.is_some()
    }

    pub fn has_service_identifier(&self) -> bool {
        self.service_identifier.is_some()
    }

    pub fn has_tx_power(&self) -> bool {
        self.tx_power.is_some()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| hex::decode(t).map_err(serde::de::Error::custom))
            .transpose()
    }
}
