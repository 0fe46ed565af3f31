/// Errors that can occur during bus operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The address already has a handler and the bus allows only one.
    #[display("address already has a connected handler")]
    AlreadyConnected,
}

impl core::error::Error for BusError {}
