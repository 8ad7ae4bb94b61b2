//! Template fragment caching.
//!
//! A fragment is a block of rendered output identified by a name and an
//! ordered list of vary-on values. [`FragmentCacheController`] derives a
//! store key from that identity, serves the stored value on a hit and runs
//! the caller's compute callback on a miss. [`SingleFlightFragmentCacheController`]
//! additionally makes concurrent misses on one key share a single computation.
//!
//! ```ignore
//! use fragment::{FragmentCacheController, FragmentCacheOperations, FragmentRequest};
//!
//! let cache = FragmentCacheController::new(store);
//! let request = FragmentRequest::new(60, "sidebar").vary_on(["en", "home"]);
//! let html = cache
//!     .get_or_compute(&request, || async { render_sidebar().await })
//!     .await?;
//! ```

pub mod domain;
pub mod events;
pub mod key;
pub mod planes;
pub mod ports;
pub mod stats;
pub mod value;

#[cfg(test)]
mod testing;

pub use domain::{CacheStatus, FragmentRequest, ResolvedFragment};
pub use events::FragmentEvent;
pub use key::{make_template_fragment_key, CacheKey, FragmentKey, KEY_PREFIX};
pub use planes::control::StoreRegistry;
pub use planes::data::{
    FragmentCacheController, FragmentCacheOperations, SingleFlightFragmentCacheController,
};
pub use ports::FragmentStore;
pub use stats::StatsSnapshot;
pub use value::TemplateValue;
