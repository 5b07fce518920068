pub mod gateway;

pub use gateway::{Gateway, GatewayStatus};
