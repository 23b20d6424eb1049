use std::{env, path::PathBuf};

#[must_use]
pub fn debug_tracing() -> bool {
    env::var("FSM_TESTS_TRACING").is_ok_and(|val| val.eq_ignore_ascii_case("true"))
}

/// Raw base seed for agent RNG streams; parsed by the run options loader.
#[must_use]
pub fn fsm_seed() -> Option<String> {
    env::var("FSM_SEED").ok()
}

#[must_use]
pub fn fsm_assert_level() -> Option<String> {
    env::var("FSM_ASSERT_LEVEL").ok()
}

#[must_use]
pub fn fsm_run_config() -> Option<PathBuf> {
    env::var("FSM_RUN_CONFIG").ok().map(PathBuf::from)
}

#[must_use]
pub fn fsm_log_filter() -> Option<String> {
    env::var("FSM_LOG_FILTER").ok()
}

#[must_use]
pub fn rust_log() -> Option<String> {
    env::var("RUST_LOG").ok()
}
