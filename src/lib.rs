pub mod config;
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod performance;
pub mod phase;
pub mod pipeline;
pub mod reference;
pub mod roofline;
pub mod sim;
pub mod systolic;

pub use error::{Result, SimError};
