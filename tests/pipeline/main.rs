//! End-to-end tests of the scrub pipeline.
//!
//! These tests run the stages and the scrub job against a local backend
//! holding real TLogs and SCO data, and check what a volume would see
//! after adopting the result: every address still maps to its latest
//! data, superseded SCOs can go, and dense SCOs stay in place.

#[path = "../common/mod.rs"]
mod common;

mod apply;
mod scenarios;
mod scrubber_job;
