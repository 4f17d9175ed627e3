use crate::driver::BusError;

/// Socket and chip operation failure
///
/// Every variant except [`Error::Busy`] is final for the attempted operation.
/// `Busy` is returned in non-blocking IO mode only and asks the caller to retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Socket number out of range; indicates a programming error
    #[error("invalid socket number")]
    SocketNumber,
    /// The socket protocol does not support the operation
    #[error("invalid socket mode")]
    SocketMode,
    #[error("socket not initialized")]
    SocketInit,
    #[error("socket closed unexpectedly")]
    SocketClosed,
    #[error("invalid socket flag")]
    SocketFlag,
    #[error("invalid socket status")]
    SocketStatus,
    #[error("invalid socket option")]
    SocketOption,
    #[error("invalid argument")]
    Argument,
    #[error("destination port is zero")]
    PortZero,
    #[error("invalid destination address")]
    IpInvalid,
    #[error("timeout")]
    Timeout,
    #[error("zero-length payload")]
    DataLength,
    #[error("insufficient buffer")]
    BufferLength,
    #[error("operation in progress")]
    Busy,
    /// Received frame length exceeds the Ethernet limit; the socket has been closed
    #[error("invalid packet length")]
    PacketLength,
    #[error("unexpected chip version {0:#04x}")]
    Version(u8),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] BusError),
}

impl Error {
    /// The operation may succeed if repeated later.
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::Busy)
    }
}

/// Buffer partition rejected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("TX buffer sizes exceed the controller memory")]
    TxMemory,
    #[error("RX buffer sizes exceed the controller memory")]
    RxMemory,
    #[error("host RX pool is smaller than the RX partition")]
    RxPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    #[error("all sockets are in use")]
    NoFreeSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchError {
    #[error("dispatch queue is full")]
    Full,
}

/// Failure to queue a socket request
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The socket was opened without a binding
    #[error("socket is not bound")]
    Unbound,
}
