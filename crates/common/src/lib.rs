pub mod domain;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEventHubClient;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEventHubConnector;
