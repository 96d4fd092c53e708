#![forbid(unsafe_code)]

pub mod matcher;
pub mod network;

pub use matcher::{DemandMatcher, Reservations, TransportTask};
pub use network::{
    ConsumerInfo, ConsumerKind, LogisticsNetwork, LogisticsRegistry, LogisticsRole, ProviderInfo,
    ProviderKind, ProviderStatus,
};
