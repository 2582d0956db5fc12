pub mod config_service;
pub mod dir_document_store;
pub mod memory_auth_provider;
pub mod memory_document_store;
pub mod notification_center;
pub mod paths;
pub mod telemetry;

pub use crate::config_service::ConfigService;
pub use crate::dir_document_store::DirDocumentStore;
pub use crate::memory_auth_provider::MemoryAuthProvider;
pub use crate::memory_document_store::MemoryDocumentStore;
pub use crate::notification_center::NotificationCenter;
