pub mod search;

pub use search::{
    build_providers, ExternalOutcome, ExternalResults, Hit, Provider, SearchProvider,
};
