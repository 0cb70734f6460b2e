//! Bootstrap flows registered with the dispatcher.

pub mod high_end;
pub mod lenode_a;
pub mod lenode_b;

pub use high_end::{AaManager, DerivationReport, DerivationRequest, HighEndFlow, KeyDerivation};
pub use lenode_a::{LowEndAFlow, LowEndBackend, LowEndBootstrap};
pub use lenode_b::LowEndBFlow;
