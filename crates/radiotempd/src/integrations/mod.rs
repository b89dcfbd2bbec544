pub mod mqtt;
pub mod rtl433;
pub mod weather;
