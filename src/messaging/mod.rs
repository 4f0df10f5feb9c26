//! Agent messaging
//!
//! Point-to-point delivery through the handler for the target's
//! classification, and fan-out broadcast that settles every target
//! independently.

pub mod broadcast;
pub mod router;

pub use broadcast::{BroadcastCoordinator, BroadcastReport, DeliveryOutcome};
pub use router::{Delivery, DeliveryStatus, MessagingRouter};
