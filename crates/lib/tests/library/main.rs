mod common;

mod build_tests;
mod cache_tests;
mod failure_tests;
mod staging_tests;
