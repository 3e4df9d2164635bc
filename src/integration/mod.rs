//! §4.4 Integration Method & Transient Driver.

mod breakpoint;
mod driver;
mod error;
mod history;
mod method;

pub use breakpoint::BreakpointTable;
pub use driver::{run, AcceptedPoint};
pub use error::{IntegrationError, IntegrationResult};
pub use history::StateHandle;
pub use method::{Gear, Integration, IntegrationMethod, Trapezoidal};
