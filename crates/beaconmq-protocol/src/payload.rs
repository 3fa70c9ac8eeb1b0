//! Batch payload: a JSON array of advertisement records.
//!
//! Object keys follow the record's field order, integers stay integers,
//! manufacturer data is lowercase hex and absent fields are omitted. A batch
//! that would exceed the transport's message size is rejected, never cut.

use std::io;

use beaconmq_types::AdvertisementRecord;

use crate::error::EncodeError;

/// Encode one scan cycle's records into a single payload of at most
/// `max_bytes` bytes.
///
/// An empty slice encodes to `[]`; a cycle without discoveries is still a
/// valid batch.
pub fn encode(records: &[AdvertisementRecord], max_bytes: usize) -> Result<Vec<u8>, EncodeError> {
    let mut writer = BoundedWriter::new(max_bytes);
    match serde_json::to_writer(&mut writer, records) {
        Ok(()) => Ok(writer.buf),
        Err(_) if writer.overflowed => Err(EncodeError::PayloadTooLarge { limit: max_bytes }),
        Err(e) => Err(EncodeError::Serialization(e.to_string())),
    }
}

/// Decode a payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<Vec<AdvertisementRecord>, EncodeError> {
    serde_json::from_slice(payload).map_err(|e| EncodeError::Serialization(e.to_string()))
}

/// Collects output until the limit, then refuses every further byte.
struct BoundedWriter {
    buf: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(1024)),
            limit,
            overflowed: false,
        }
    }
}

impl io::Write for BoundedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.limit {
            self.overflowed = true;
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "payload size limit reached",
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconmq_types::BdAddr;

    fn record(last: u8, rssi: i32) -> AdvertisementRecord {
        AdvertisementRecord::new(BdAddr::new([0x10, 0x20, 0x30, 0x40, 0x50, last]), rssi)
    }

    #[test]
    fn empty_batch_is_empty_array() {
        let bytes = encode(&[], 4096).unwrap();
        assert_eq!(bytes, b"[]");
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn minimal_record_has_exactly_mandatory_keys() {
        let bytes = encode(&[record(1, -60)], 4096).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let object = value[0].as_object().unwrap();
        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 2);
        assert!(object.contains_key("address"));
        assert!(object.contains_key("signal_strength"));
    }

    #[test]
    fn full_record_encodes_in_field_order() {
        let full = record(2, -48)
            .with_name("Beacon")
            .with_appearance(512)
            .with_manufacturer_data(vec![0x4C, 0x00, 0x02, 0x15])
            .with_service_identifier("180f")
            .with_tx_power(-8);

        let text = String::from_utf8(encode(&[full], 4096).unwrap()).unwrap();
        assert_eq!(
            text,
            concat!(
                r#"[{"address":"10:20:30:40:50:02","signal_strength":-48,"name":"Beacon","#,
                r#""appearance":512,"manufacturer_data":"4c000215","service_identifier":"180f","#,
                r#""tx_power":-8}]"#
            )
        );
    }

    #[test]
    fn two_records_make_two_element_array() {
        let bytes = encode(&[record(1, -60), record(2, -70).with_name("b")], 4096).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].name.as_deref(), Some("b"));
    }

    #[test]
    fn oversized_batch_fails_instead_of_truncating() {
        let records: Vec<_> = (0..50).map(|i| record(i, -80).with_name("x".repeat(20))).collect();
        let err = encode(&records, 256).unwrap_err();
        assert!(matches!(err, EncodeError::PayloadTooLarge { limit: 256 }));
    }

    #[test]
    fn exact_fit_is_accepted() {
        let full = encode(&[record(1, -60)], 4096).unwrap();
        let exact = encode(&[record(1, -60)], full.len()).unwrap();
        assert_eq!(full, exact);
        assert!(encode(&[record(1, -60)], full.len() - 1).is_err());
    }
}
