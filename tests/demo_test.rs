//! Runs the scripted demo end to end.

use tictactoe_sync::{ClientConfig, Winner, run_demo};

#[tokio::test]
async fn test_scripted_demo_plays_through() {
    let config = ClientConfig::default().with_namespace("demo-test");
    let report = run_demo(&config).await.expect("Demo failed");

    assert_eq!(*report.first_match(), Winner::X);
    assert_eq!(*report.second_match(), Winner::Draw);
    assert!(*report.out_of_turn_blocked());
    assert!(*report.deletion_observed());
}
