//! Cooperative cancellation for pipeline runs and the scheduler loop.

mod token;

pub use token::CancellationToken;
