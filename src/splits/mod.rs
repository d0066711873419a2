pub mod asplit;
pub mod compatibility;
