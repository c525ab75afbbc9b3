mod account;
mod catalog;
mod invoice;
mod payment_intent;
mod provider_transaction;
mod subscription;
mod webhook_event;

pub use account::*;
pub use catalog::*;
pub use invoice::*;
pub use payment_intent::*;
pub use provider_transaction::*;
pub use subscription::*;
pub use webhook_event::*;
