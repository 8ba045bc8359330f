//! Progress reporting for long-running algorithms.
//!
//! The contraction driver reports once per iteration through a [`Progress`]
//! callback; the command-line tool renders it as a status line.
//!
//! # Example
//!
//! ```no_run
//! use mcfskel::algo::progress::Progress;
//! use mcfskel::algo::skeleton::MeanCurvatureSkeleton;
//! use mcfskel::prelude::*;
//!
//! let mesh: HalfEdgeMesh = mcfskel::io::load("model.obj").unwrap();
//! let mut skeleton = MeanCurvatureSkeleton::new(mesh).unwrap();
//!
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! });
//! skeleton.contract_with_progress(&progress).unwrap();
//! ```

/// Callback invoked with `(current, total, message)`.
///
/// For the contraction driver `current` is the number of finished
/// iterations and `total` the iteration cap, so a run that converges early
/// never reaches `total`.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Forward one update to the callback.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// A reporter that discards every update.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_callback_receives_updates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let progress = Progress::new(move |current, total, _| {
            assert!(current <= total);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        progress.report(1, 3, "one");
        progress.report(3, 3, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_none_is_silent() {
        Progress::default().report(0, 0, "ignored");
    }
}
