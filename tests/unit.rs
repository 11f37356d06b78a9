//! Entry point wiring up the `tests/unit/` directory as one test binary.

#[path = "unit/mod.rs"]
mod unit;
