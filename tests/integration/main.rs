//! Integration tests for the Zariz session core.

mod helpers;
mod realtime_test;
