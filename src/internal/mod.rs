//! Internal implementation details.

pub(crate) mod chain;
