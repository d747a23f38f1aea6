pub mod resolver;

pub use resolver::{ResolveOutcome, ResolverMetrics};
