pub mod error;
pub mod ingest;
pub mod models;

pub use error::{Result, SyncError};
pub use ingest::{RawDocument, normalize};
pub use models::{ChatRoom, DeliveryStatus, Message, MessageKind};
