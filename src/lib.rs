pub mod capture;
pub mod cli;
pub mod config;
pub mod continuity;
pub mod merge;
pub mod paths;
pub mod session;
pub mod store;
pub mod sync;
pub mod vcs;

pub use config::Config;
pub use session::{Message, MessageKind, Session};
pub use store::SnapshotStore;
pub use sync::CheckoutSynchronizer;
pub use vcs::{Git, VcsBackend, VcsError};
