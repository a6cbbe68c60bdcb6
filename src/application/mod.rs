// Application layer - settlement use cases
// Every write runs as a saga over the storage seams; the CLI and the tests
// only talk to `SettlementService`.

pub mod error;
pub mod requests;
pub mod saga;
pub mod service;
mod settlement;

pub use error::*;
pub use requests::*;
pub use saga::{Compensation, Saga, SagaState};
pub use service::SettlementService;
