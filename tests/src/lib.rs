use logcheck::testing::FakeEnvironment;
use logcheck::{EnvironmentExpectation, Harness};
use std::sync::Once;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT_TRACING: Once = Once::new();

/// Deployment targets with an expectation preset.
pub const TARGETS: [(&str, &str); 4] = [
    ("functions", "nodejs"),
    ("kubernetes", "nodejs"),
    ("kubernetes", "python"),
    ("cloudrun", "python"),
];

/// Test output goes through the libtest capture; `RUST_LOG` picks the level.
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
            .with(EnvFilter::from_default_env())
            .try_init();
    });
}

pub type FakeHarness = Harness<FakeEnvironment, FakeEnvironment>;

/// A harness wired to one in-process fake, playing both the backend and
/// `envctl`. Entries become visible on the `latency + 1`-th listing.
pub fn fake_harness(environment: &str, language: &str, latency: u32) -> (FakeEnvironment, FakeHarness) {
    init_test_tracing();
    let expectation = match EnvironmentExpectation::for_target(environment, language) {
        Ok(expectation) => expectation,
        Err(err) => panic!("no preset for {environment}/{language}: {err}"),
    };
    let fake = FakeEnvironment::new(expectation.clone()).with_latency(latency);
    let harness = Harness::new(fake.clone(), fake.clone(), expectation);
    (fake, harness)
}
