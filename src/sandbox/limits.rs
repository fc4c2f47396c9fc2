//! Resource limiting for script execution.
//!
//! The interpreter calls [`Budget::tick`] once per statement, loop iteration
//! and function call. Every tick consumes one unit of fuel; every
//! `deadline_check_interval` ticks the wall-clock deadline and the
//! cancellation flag are consulted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RuntimeError;
use crate::sandbox::config::SandboxConfig;

/// Limits applied to a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_steps: Option<u64>,
    pub deadline_check_interval: u64,
    pub max_collection_len: usize,
    pub max_string_len: usize,
    pub max_call_depth: usize,
}

impl From<&SandboxConfig> for ExecutionLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_steps: config.max_steps,
            deadline_check_interval: config.deadline_check_interval.max(1),
            max_collection_len: config.max_collection_len,
            max_string_len: config.max_string_len,
            max_call_depth: config.max_call_depth,
        }
    }
}

/// Flag raised from outside the interpreter to stop a running script.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Per-invocation accounting of fuel, time and sizes.
#[derive(Debug)]
pub struct Budget {
    limits: ExecutionLimits,
    started: Instant,
    deadline: Instant,
    steps: u64,
    cancel: CancelToken,
}

impl Budget {
    pub fn new(limits: ExecutionLimits, cancel: CancelToken) -> Self {
        let started = Instant::now();
        Self {
            limits,
            started,
            deadline: started + limits.timeout,
            steps: 0,
            cancel,
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if let Some(max) = self.limits.max_steps {
            if self.steps > max {
                return Err(RuntimeError::OutOfFuel { consumed: max });
            }
        }
        if self.steps % self.limits.deadline_check_interval == 0 {
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Check the deadline and cancellation flag immediately.
    pub fn check_deadline(&self) -> Result<(), RuntimeError> {
        if self.cancel.is_cancelled() || Instant::now() >= self.deadline {
            return Err(RuntimeError::Timeout(self.limits.timeout));
        }
        Ok(())
    }

    /// Reject a collection about to grow to `len` elements.
    pub fn check_len(&self, len: usize) -> Result<(), RuntimeError> {
        if len > self.limits.max_collection_len {
            return Err(RuntimeError::LimitExceeded(format!(
                "collection of {len} elements exceeds the limit of {}",
                self.limits.max_collection_len
            )));
        }
        Ok(())
    }

    /// Reject a string about to grow to `len` bytes.
    pub fn check_str_len(&self, len: usize) -> Result<(), RuntimeError> {
        if len > self.limits.max_string_len {
            return Err(RuntimeError::LimitExceeded(format!(
                "string of {len} bytes exceeds the limit of {}",
                self.limits.max_string_len
            )));
        }
        Ok(())
    }

    pub fn check_depth(&self, depth: usize) -> Result<(), RuntimeError> {
        if depth > self.limits.max_call_depth {
            return Err(RuntimeError::raise(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ExecutionLimits {
        ExecutionLimits::from(&SandboxConfig::default())
    }

    #[test]
    fn test_fuel_runs_out() {
        let mut budget = Budget::new(
            ExecutionLimits {
                max_steps: Some(3),
                ..limits()
            },
            CancelToken::new(),
        );
        for _ in 0..3 {
            budget.tick().unwrap();
        }
        assert_eq!(
            budget.tick().unwrap_err(),
            RuntimeError::OutOfFuel { consumed: 3 }
        );
    }

    #[test]
    fn test_cancel_reports_timeout() {
        let cancel = CancelToken::new();
        let mut budget = Budget::new(
            ExecutionLimits {
                deadline_check_interval: 1,
                ..limits()
            },
            cancel.clone(),
        );
        budget.tick().unwrap();
        cancel.cancel();
        assert!(matches!(budget.tick(), Err(RuntimeError::Timeout(_))));
    }

    #[test]
    fn test_expired_deadline() {
        let budget = Budget::new(
            ExecutionLimits {
                timeout: Duration::ZERO,
                ..limits()
            },
            CancelToken::new(),
        );
        assert!(budget.check_deadline().is_err());
    }

    #[test]
    fn test_size_limits() {
        let budget = Budget::new(
            ExecutionLimits {
                max_collection_len: 10,
                max_string_len: 4,
                ..limits()
            },
            CancelToken::new(),
        );
        assert!(budget.check_len(10).is_ok());
        assert!(budget.check_len(11).is_err());
        assert!(budget.check_str_len(5).is_err());
        assert!(budget.check_depth(1).is_ok());
    }
}
