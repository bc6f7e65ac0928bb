use crate::DeviceMapping;
use crate::EnrichedEvent;
use crate::Reading;

/// Attaches device name and owner to each reading, preserving order.
/// Unmapped devices get the sentinel pair.
pub fn enrich(
    readings: Vec<Reading>,
    mapping: &DeviceMapping,
) -> Vec<EnrichedEvent> {
    readings
        .into_iter()
        .map(|reading| {
            let info = mapping.resolve(&reading.device_id);
            EnrichedEvent::new(reading, info)
        })
        .collect()
}
