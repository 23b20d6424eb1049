use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";
const DEBUG_FILTER: &str = "fsm_framework_core=debug,fsm_framework_workloads=debug,info";

/// Filter directive in effect: `FSM_LOG_FILTER`, then `RUST_LOG`, then
/// `FSM_TESTS_TRACING=true` for framework debug output, else `info`.
#[must_use]
pub fn filter_directive() -> String {
    fsm_framework_env::fsm_log_filter()
        .or_else(fsm_framework_env::rust_log)
        .unwrap_or_else(|| {
            if fsm_framework_env::debug_tracing() {
                DEBUG_FILTER.to_owned()
            } else {
                DEFAULT_FILTER.to_owned()
            }
        })
}

/// Installs the global fmt subscriber. Safe to call from every test; only the
/// first call wins.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_new(filter_directive()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}
