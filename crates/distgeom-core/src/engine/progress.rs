use crate::engine::error::DgError;

/// Which entry point is driving the attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// One attempt per requested conformer; failures keep their slot.
    Batch,
    /// Failed attempts are retried until enough conformers succeed.
    Ensemble,
}

/// Events emitted while conformers are generated.
///
/// Every attempt ends in exactly one `AttemptSucceeded` or `AttemptFailed`.
/// Attempt numbers count from zero across the whole run, retries included.
/// Events from parallel attempts arrive in completion order.
#[derive(Debug, Clone)]
pub enum Progress {
    GenerationStart {
        mode: GenerationMode,
        requested: usize,
        /// Whether each attempt builds its own spatial model because the
        /// molecule has unassigned stereocenters.
        per_attempt_models: bool,
    },
    AttemptSucceeded {
        attempt: usize,
    },
    AttemptFailed {
        attempt: usize,
        error: DgError,
    },
    GenerationFinish {
        generated: usize,
        failed: usize,
    },
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards progress events to an optional callback. Shared across worker
/// threads, so the callback must be thread-safe.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Reports the outcome of one attempt.
    pub fn report_attempt<T>(&self, attempt: usize, result: &Result<T, DgError>) {
        let event = match result {
            Ok(_) => Progress::AttemptSucceeded { attempt },
            Err(error) => Progress::AttemptFailed {
                attempt,
                error: error.clone(),
            },
        };
        self.report(event);
    }
}
