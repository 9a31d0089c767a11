//! Scalar scores derived from a forecast and the entity's scope.

mod pressure;
mod risk;

pub use pressure::{current_wip, flow_pressure, relative_flow_pressure};
pub use risk::{operational_risk, risk_from_odds};
