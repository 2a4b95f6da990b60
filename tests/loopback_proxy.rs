//! Proxy variables are process-wide, so this lives in its own test binary.

mod common;

use common::{Fixture, RecordingApplier};
use update_demo::{UpdateDecision, UpdateOrchestrator};

#[tokio::test]
async fn local_update_check_ignores_http_proxy() {
    // Nothing listens on port 1, so any proxied request fails.
    std::env::remove_var("NO_PROXY");
    std::env::remove_var("no_proxy");
    std::env::set_var("HTTP_PROXY", "http://127.0.0.1:1");
    std::env::set_var("http_proxy", "http://127.0.0.1:1");

    let fixture = Fixture::publish(b"archive", b"archive");
    let mut orchestrator =
        UpdateOrchestrator::with_applier(fixture.config(), RecordingApplier::default());

    assert_eq!(
        orchestrator.run().await,
        UpdateDecision::UpdateAvailableNotApplied
    );
    orchestrator.close().await;
}
