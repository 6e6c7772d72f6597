use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("peripheral address {0:#04x} does not fit in 7 bits")]
    AddressOutOfRange(u8),
    #[error("peripheral address {0:#04x} is reserved")]
    ReservedAddress(u8),
    #[error("SPI clock divisor must be at least 1")]
    ZeroDivisor,
    #[error("I2C half period of {half_period} ticks is below the {min} ticks the synchronizer can follow")]
    HalfPeriodTooShort { half_period: u32, min: u32 },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("bridge worker is not running")]
    Disconnected,
    #[error("failed to start bridge worker: {0}")]
    Spawn(#[from] std::io::Error),
}
