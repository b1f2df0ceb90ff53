/*! Integration tests for normref.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - records: Tests for RecordField/RecordSet merge, iteration and construction
 * - navigation: Tests for child/parent/root navigation of normalized references
 * - writes: Tests for splitting logical writes into per-location writes
 * - events: Tests for merged subscriptions and the synchronizer lifecycle
 * - delegation: Tests for whole-store operations and unsupported operations
 * - config: Tests for collection builders and JSON configuration
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("normref=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod config;
mod helpers;
mod navigation;
mod records;
mod writes;
