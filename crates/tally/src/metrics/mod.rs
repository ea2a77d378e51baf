//! Delivery metrics.
//!
//! Events here implement `tally_common`'s `InternalEvent` trait; storage
//! request metrics come from the shared crate.

pub mod events;

/// Emit a delivery metric event.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        <_ as $crate::metrics::events::InternalEvent>::emit($event)
    };
}
