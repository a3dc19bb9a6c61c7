pub mod error;
pub mod types;
pub mod storage;
pub mod clock;
pub mod wallet;
pub mod session;
pub mod chain;
pub mod market_data;
pub mod automation;
pub mod executor;
pub mod strategy;
pub mod profile;

pub use error::{AutomationError, StorageError, WalletError};
pub use types::*;
pub use session::ConnectionSession;
pub use wallet::{WalletCapability, WalletEnvironment, WalletRegistry};
