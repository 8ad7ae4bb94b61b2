pub mod registry;

pub use registry::{StoreRegistry, DEFAULT_ALIAS, TEMPLATE_FRAGMENTS_ALIAS};
