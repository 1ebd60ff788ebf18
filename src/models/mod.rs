pub mod batch;
pub mod call_result;
pub mod health;
pub mod payload;
