//! Ports: interfaces to the systems this core drives.

mod clock_port;
mod trading_backend_port;

pub use clock_port::Clock;
#[cfg(test)]
pub use trading_backend_port::MockTradingBackend;
pub use trading_backend_port::{
    BackendError, FailureKind, ModifyOrderRequest, PlaceOrderRequest, TickStream,
    TradingBackend,
};
