pub mod availability;
pub mod dispatch;
