//! Network-aware shaping of outbound batches.
//!
//! Shaping always works on a copy: queued items are never modified.
//!
//! | Quality          | Keep every k-th record | Coordinate decimals     | Encoding |
//! |------------------|------------------------|-------------------------|----------|
//! | poor             | k = 1 + level          | max(3, 6 − level)       | gzip     |
//! | fair             | k = 1 + level / 2      | max(4, 6 − level / 2)   | gzip     |
//! | good / excellent | every record           | unchanged               | identity |
//!
//! Critical records survive thinning regardless of k.

use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use super::item::{LocationPayload, SyncItem, SyncPriority};
use crate::error::EncodeError;
use crate::geo::truncate_coordinate;
use crate::policy::NetworkQuality;

/// Highest supported compression level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Content encoding of an [`OutboundBatch`] body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BatchEncoding {
    Identity,
    Gzip { level: u32 },
}

/// Shaping parameters for one network quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapingPlan {
    /// Keep every `keep_every`-th record; 1 keeps all.
    pub keep_every: usize,
    /// Decimal places kept on coordinates; `None` leaves them untouched.
    pub coordinate_decimals: Option<u32>,
    pub encoding: BatchEncoding,
}

impl ShapingPlan {
    pub fn for_quality(quality: NetworkQuality, compression_level: u32) -> Self {
        let level = compression_level.min(MAX_COMPRESSION_LEVEL);
        match quality {
            NetworkQuality::Poor => Self {
                keep_every: 1 + level as usize,
                coordinate_decimals: Some(6u32.saturating_sub(level).max(3)),
                encoding: BatchEncoding::Gzip {
                    level: level.max(1),
                },
            },
            NetworkQuality::Fair => Self {
                keep_every: 1 + (level / 2) as usize,
                coordinate_decimals: Some(6u32.saturating_sub(level / 2).max(4)),
                encoding: BatchEncoding::Gzip {
                    level: (level / 2).max(1),
                },
            },
            NetworkQuality::Good | NetworkQuality::Excellent => Self {
                keep_every: 1,
                coordinate_decimals: None,
                encoding: BatchEncoding::Identity,
            },
        }
    }

    /// Thin and round `items` (in delivery order) into wire records.
    pub fn apply(&self, items: &[SyncItem]) -> Vec<LocationPayload> {
        let keep_every = self.keep_every.max(1);
        items
            .iter()
            .enumerate()
            .filter(|(i, item)| i % keep_every == 0 || item.priority == SyncPriority::Critical)
            .map(|(_, item)| {
                let mut record = item.payload;
                if let Some(decimals) = self.coordinate_decimals {
                    record.latitude = truncate_coordinate(record.latitude, decimals);
                    record.longitude = truncate_coordinate(record.longitude, decimals);
                }
                record
            })
            .collect()
    }
}

/// The shaped, encoded copy of a batch handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    pub records: Vec<LocationPayload>,
    pub encoding: BatchEncoding,
    /// JSON array of `records`, encoded per `encoding`.
    pub body: Bytes,
    pub quality: NetworkQuality,
    /// Number of queued items this batch stands for.
    pub source_items: usize,
}

impl OutboundBatch {
    /// Records removed by thinning.
    pub fn thinned(&self) -> usize {
        self.source_items.saturating_sub(self.records.len())
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.encoding, BatchEncoding::Gzip { .. })
    }
}

/// Shape and encode `items` for delivery at `quality`.
pub fn shape(
    items: &[SyncItem],
    quality: NetworkQuality,
    compression_level: u32,
) -> Result<OutboundBatch, EncodeError> {
    let plan = ShapingPlan::for_quality(quality, compression_level);
    let records = plan.apply(items);
    let json = serde_json::to_vec(&records)?;

    let body = match plan.encoding {
        BatchEncoding::Identity => Bytes::from(json),
        BatchEncoding::Gzip { level } => {
            let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::new(level));
            encoder.write_all(&json)?;
            Bytes::from(encoder.finish()?)
        }
    };

    Ok(OutboundBatch {
        records,
        encoding: plan.encoding,
        body,
        quality,
        source_items: items.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn items(count: usize) -> Vec<SyncItem> {
        (0..count)
            .map(|i| {
                SyncItem::new(
                    LocationPayload {
                        latitude: 53.123456789 + i as f64 * 0.001,
                        longitude: 9.987654321,
                        speed: Some(3.0),
                        accuracy: 5.0,
                        timestamp: Utc::now(),
                        motion: None,
                    },
                    SyncPriority::Normal,
                )
            })
            .collect()
    }

    #[test]
    fn test_good_network_is_unshaped() {
        let input = items(5);
        let batch = shape(&input, NetworkQuality::Good, 6).unwrap();
        assert_eq!(batch.records.len(), 5);
        assert_eq!(batch.records[0], input[0].payload);
        assert_eq!(batch.encoding, BatchEncoding::Identity);

        let decoded: Vec<LocationPayload> = serde_json::from_slice(&batch.body).unwrap();
        assert_eq!(decoded.len(), 5);
        assert!((decoded[4].latitude - input[4].payload.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_poor_network_plan() {
        let plan = ShapingPlan::for_quality(NetworkQuality::Poor, 2);
        assert_eq!(plan.keep_every, 3);
        assert_eq!(plan.coordinate_decimals, Some(4));

        // High levels never go below three decimals
        let plan = ShapingPlan::for_quality(NetworkQuality::Poor, 9);
        assert_eq!(plan.keep_every, 10);
        assert_eq!(plan.coordinate_decimals, Some(3));
    }

    #[test]
    fn test_fair_network_plan() {
        let plan = ShapingPlan::for_quality(NetworkQuality::Fair, 4);
        assert_eq!(plan.keep_every, 3);
        assert_eq!(plan.coordinate_decimals, Some(4));

        let plan = ShapingPlan::for_quality(NetworkQuality::Fair, 1);
        assert_eq!(plan.keep_every, 1);
        assert_eq!(plan.coordinate_decimals, Some(6));
    }

    #[test]
    fn test_poor_thins_and_truncates() {
        let input = items(7);
        let batch = shape(&input, NetworkQuality::Poor, 2).unwrap();

        // Indices 0, 3, 6
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.thinned(), 4);
        assert!((batch.records[0].latitude - 53.1234).abs() < 1e-9);
        assert!((batch.records[0].longitude - 9.9876).abs() < 1e-9);
    }

    #[test]
    fn test_critical_records_survive_thinning() {
        let mut input = items(4);
        input[1].priority = SyncPriority::Critical;
        let batch = shape(&input, NetworkQuality::Poor, 9).unwrap();
        assert_eq!(batch.records.len(), 2);
    }

    #[test]
    fn test_shaping_leaves_items_untouched() {
        let input = items(3);
        let before = input.clone();
        shape(&input, NetworkQuality::Poor, 5).unwrap();
        assert_eq!(input, before);
    }

    #[test]
    fn test_poor_body_is_gzip() {
        let input = items(4);
        let batch = shape(&input, NetworkQuality::Poor, 3).unwrap();
        assert!(batch.is_compressed());

        let mut json = String::new();
        GzDecoder::new(&batch.body[..]).read_to_string(&mut json).unwrap();
        let decoded: Vec<LocationPayload> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.len(), batch.records.len());
        assert!((decoded[1].latitude - batch.records[1].latitude).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch_encodes() {
        let batch = shape(&[], NetworkQuality::Excellent, 0).unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(&batch.body[..], b"[]");
    }
}
