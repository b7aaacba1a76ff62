//! Cross-crate scenarios for loopme

#[cfg(test)]
mod reconcile_integration;
