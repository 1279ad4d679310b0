//! Safe delegate registry synchronization
//!
//! Binds a wallet session to a Safe and its chain's Safe Transaction Service,
//! derives a signer from the wallet, and keeps a local delegate list in sync
//! with the service after every add or remove.
#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod registry;
pub mod selection;
pub mod session;
pub mod signer;
pub mod test_utils;
pub mod utils;

pub use config::DelegatesConfig;
pub use engine::{ConnectionState, DelegateSnapshot, DelegateSyncEngine};
pub use errors::DelegateError;
pub use registry::{
    ChainId, DelegateRecord, RegistryClient, RegistryClientFactory, SafeInfo,
    TransactionServiceFactory,
};
pub use selection::SafeSelection;
pub use session::{ChainDescriptor, Session, WalletHandle};
pub use signer::{DelegateSigner, LocalKeyTransport, WalletTransport, derive_signer};
