//! Fan-out of enriched batches to live subscribers.
//!
//! The pipeline only knows the [`Broadcaster`] trait. [`SubscriberHub`] is the
//! production implementation: the transport registers and deregisters
//! connections, and `publish` writes one frame to every connection registered
//! at that moment.

mod hub;
pub use hub::*;


#[cfg(test)]
use mockall::automock;

use crate::EnrichedEvent;

#[cfg_attr(test, automock)]
pub trait Broadcaster: Send + Sync + 'static {
    /// Fire-and-forget delivery to the current subscriber set. No replay for
    /// later subscribers, no acknowledgements. An empty batch is a no-op.
    ///
    /// Returns the number of subscribers the frame was handed to.
    fn publish(
        &self,
        batch: &[EnrichedEvent],
    ) -> usize;

    fn subscriber_count(&self) -> usize;
}
