use std::{cell::RefCell, ffi::OsStr};

/// Step budget for `run` when neither `--steps` nor `HC08SIM_STEPS` is given.
pub const DEFAULT_STEP_LIMIT: u64 = 10_000;

#[derive(Clone, Copy)]
struct Env {
    trace_enabled: bool,
    step_limit: Option<u64>,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        trace_enabled: var_is("HC08SIM_TRACE", "1"),
        step_limit: var_parse("HC08SIM_STEPS"),
    };
    set_env(value);
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace_enabled)
}

pub fn step_limit() -> u64 {
    with_env(|env| env.step_limit).unwrap_or(DEFAULT_STEP_LIMIT)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}

fn var_parse(name: impl AsRef<OsStr>) -> Option<u64> {
    std::env::var(name.as_ref())
        .ok()
        .and_then(|v| v.trim().parse().ok())
}
