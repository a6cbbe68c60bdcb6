mod account;
mod counterparty;
mod ledger;
mod money;
mod sale;
mod transaction;

pub use account::*;
pub use counterparty::*;
pub use ledger::*;
pub use money::*;
pub use sale::*;
pub use transaction::*;
