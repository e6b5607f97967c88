mod auth;
mod history;
mod lock;
pub mod library;
mod store;

pub use auth::TokenManager;
pub use history::HistoryManager;
pub use library::{Direction, LibraryManager, SyncClaim};
pub use lock::FileLock;
pub use store::ConfigStore;
pub use store::StoreError;
pub use store::write_atomic;
