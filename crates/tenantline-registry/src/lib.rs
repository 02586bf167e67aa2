//! Tenantline registry crate - property index, spoken-address parsing and resolution.
//!
//! Holds the set of known properties behind an atomically swapped snapshot,
//! turns noisy transcribed speech into a candidate address, and classifies the
//! candidate as exact, ambiguous, or unverified.

pub mod error;
pub mod feed;
pub mod index;
pub mod normalize;
pub mod numbers;
pub mod property;
pub mod resolver;

pub use error::RegistryError;
pub use feed::{spawn_refresh, JsonFileFeed, RegistryFeed, StaticFeed};
pub use index::{NearestMatch, PropertyIndex, RegistrySnapshot};
pub use normalize::Normalizer;
pub use property::{PropertyRecord, RawProperty};
pub use resolver::{
    AddressResolution, AddressResolver, CandidateAddress, ResolvedAddress, SuggestedAddress,
};
