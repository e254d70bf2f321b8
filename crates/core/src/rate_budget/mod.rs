//! Per-provider rate budgets over fixed windows.

mod budget;
mod manager;

pub use budget::RateBudget;
pub use manager::{Acquire, BudgetReservation, RateBudgetManager};
