pub mod controller;
pub mod operation;
pub mod single_flight;

pub use controller::FragmentCacheController;
pub use operation::FragmentCacheOperations;
pub use single_flight::SingleFlightFragmentCacheController;
