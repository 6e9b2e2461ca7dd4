//! Measurement sample assembly
//!
//! Correlated field values trickle in one at a time; telemetry wants whole
//! samples. The accumulator collects values until all four tracked fields
//! are present, then hands the completed sample off and starts over.

use std::collections::BTreeMap;

use spd_protocol::MeasField;
use tracing::trace;

/// A completed sample: every tracked field with its measured value
pub type SampleFields = BTreeMap<MeasField, f64>;

/// Collects correlated fields until a complete sample is assembled
#[derive(Debug, Default)]
pub struct MeasurementAccumulator {
    collected: SampleFields,
}

impl MeasurementAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self {
            collected: SampleFields::new(),
        }
    }

    /// Store one field value; returns the completed sample when all four
    /// tracked fields are present
    ///
    /// Recording a field that is already present overwrites it — that value
    /// belonged to a sample that was abandoned mid-collection. On
    /// completion the in-progress state clears, so no field can be counted
    /// into two samples.
    pub fn record(&mut self, field: MeasField, value: f64) -> Option<SampleFields> {
        self.collected.insert(field, value);
        trace!("Collected {}={} ({}/4)", field, value, self.collected.len());

        if MeasField::ALL
            .iter()
            .all(|f| self.collected.contains_key(f))
        {
            Some(std::mem::take(&mut self.collected))
        } else {
            None
        }
    }

    /// Number of fields collected toward the current sample
    pub fn in_progress(&self) -> usize {
        self.collected.len()
    }

    /// Whether nothing is collected toward the next sample
    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_once_all_four_fields_present() {
        let mut acc = MeasurementAccumulator::new();
        assert!(acc.record(MeasField::Ch1Voltage, 12.0).is_none());
        assert!(acc.record(MeasField::Ch1Current, 0.5).is_none());
        assert!(acc.record(MeasField::Ch2Voltage, 5.0).is_none());

        let sample = acc.record(MeasField::Ch2Current, 0.25).unwrap();
        assert_eq!(sample.len(), 4);
        assert_eq!(sample[&MeasField::Ch1Voltage], 12.0);
        assert_eq!(sample[&MeasField::Ch2Current], 0.25);

        // State is empty immediately after the flush
        assert!(acc.is_empty());
    }

    #[test]
    fn repeated_field_overwrites_stale_value() {
        let mut acc = MeasurementAccumulator::new();
        assert!(acc.record(MeasField::Ch1Voltage, 11.0).is_none());
        // Sample abandoned; a fresh round starts with a new CH1 voltage
        assert!(acc.record(MeasField::Ch1Voltage, 12.0).is_none());
        assert!(acc.record(MeasField::Ch1Current, 0.5).is_none());
        assert!(acc.record(MeasField::Ch2Voltage, 5.0).is_none());

        let sample = acc.record(MeasField::Ch2Current, 0.25).unwrap();
        assert_eq!(sample[&MeasField::Ch1Voltage], 12.0);
    }

    #[test]
    fn consecutive_samples_do_not_share_fields() {
        let mut acc = MeasurementAccumulator::new();
        for (field, value) in [
            (MeasField::Ch1Voltage, 12.0),
            (MeasField::Ch1Current, 0.5),
            (MeasField::Ch2Voltage, 5.0),
        ] {
            assert!(acc.record(field, value).is_none());
        }
        assert!(acc.record(MeasField::Ch2Current, 0.25).is_some());

        // The next partial round must not complete off leftovers
        assert!(acc.record(MeasField::Ch1Voltage, 12.1).is_none());
        assert_eq!(acc.in_progress(), 1);
    }
}
