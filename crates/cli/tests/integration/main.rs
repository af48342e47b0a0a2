//! CLI integration tests, run against the `flake` binary in an isolated
//! environment.

mod common;

mod archive_tests;
mod check_tests;
mod init_tests;
mod inputs_tests;
mod registry_tests;
mod show_tests;
