//! Domain types shared across the payment-notification workspace.
//!
//! This crate contains only pure types with no framework dependencies.
//! Import in `usecase/` and `domain/` layers; persistence mapping lives in `infra/`.

pub mod channel;
pub mod id;
pub mod state;
