pub mod booking;
pub mod checks;
pub mod codec;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod host;
pub mod query;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod validation;

pub use booking::{BookingConfirmation, BookingDetails, BookingRequest, ConfirmationFields, DocumentStatus};
pub use context::TxContext;
pub use contract::{BookingContract, BookingReceipt, BookingUpdate};
pub use error::BookingError;
