//! sea-orm entities for the payment notification queue.

pub mod digest_outbox;
pub mod order_payment_notify_queue;
