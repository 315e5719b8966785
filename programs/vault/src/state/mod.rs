pub mod ledger;
pub mod governor;
pub mod withdrawals;
pub mod rebalancer;
pub mod shares;
pub mod locked;

pub use ledger::*;
pub use governor::*;
pub use withdrawals::*;
pub use rebalancer::*;
pub use shares::*;
pub use locked::*;
