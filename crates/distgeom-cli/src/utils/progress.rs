use distgeom::engine::progress::{GenerationMode, Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const TICK_INTERVAL: Duration = Duration::from_millis(80);

/// Renders conformer generation progress on stderr.
///
/// The bar counts successful attempts against the requested number of
/// conformers. Failed attempts are tallied and appended to the bar.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: Arc<Mutex<ProgressBar>>,
    failed: Arc<AtomicUsize>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(attempt_style());
        bar.finish_and_clear();
        Self {
            bar: Arc::new(Mutex::new(bar)),
            failed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `AttemptFailed` events seen so far.
    pub fn failures(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let handler = self.clone();
        Box::new(move |event| handler.handle(event))
    }

    fn handle(&self, event: Progress) {
        let Ok(bar) = self.bar.lock() else {
            warn!("Progress bar lock is poisoned; dropping progress event.");
            return;
        };

        match event {
            Progress::GenerationStart {
                mode,
                requested,
                per_attempt_models,
            } => {
                bar.reset();
                bar.set_length(requested as u64);
                bar.set_prefix(match mode {
                    GenerationMode::Batch => "Conformers",
                    GenerationMode::Ensemble => "Ensemble",
                });
                bar.set_message(if per_attempt_models { "(stereo sampled)" } else { "" });
                bar.enable_steady_tick(TICK_INTERVAL);
            }
            Progress::AttemptSucceeded { .. } => bar.inc(1),
            Progress::AttemptFailed { attempt, error } => {
                debug!(attempt, %error, "Attempt failed");
                let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
                bar.set_message(format!("{failed} failed"));
            }
            Progress::GenerationFinish { generated, failed } => {
                bar.disable_steady_tick();
                bar.finish_with_message(format!("✓ {generated} generated, {failed} failed"));
            }
        }
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn attempt_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:<12} [{bar:40.cyan/blue}] {pos}/{len} ({seconds_left}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("seconds_left", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use distgeom::engine::error::DgError;
    use std::thread;

    fn bar(handler: &CliProgressHandler) -> ProgressBar {
        handler.bar.lock().unwrap().clone()
    }

    #[test]
    fn new_handler_is_idle() {
        let handler = CliProgressHandler::new();
        let bar = bar(&handler);
        assert_eq!(bar.length(), Some(0));
        assert!(bar.is_finished());
        assert_eq!(handler.failures(), 0);
    }

    #[test]
    fn a_generation_run_drives_the_bar() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();

        callback(Progress::GenerationStart {
            mode: GenerationMode::Ensemble,
            requested: 4,
            per_attempt_models: false,
        });
        assert_eq!(bar(&handler).prefix(), "Ensemble");
        assert_eq!(bar(&handler).length(), Some(4));
        assert!(!bar(&handler).is_finished());

        callback(Progress::AttemptSucceeded { attempt: 0 });
        callback(Progress::AttemptFailed {
            attempt: 1,
            error: DgError::RefinementMaxIterationsReached,
        });
        callback(Progress::AttemptSucceeded { attempt: 2 });
        assert_eq!(bar(&handler).position(), 2);

        callback(Progress::GenerationFinish {
            generated: 2,
            failed: 1,
        });
        assert!(bar(&handler).is_finished());
        assert_eq!(bar(&handler).message(), "✓ 2 generated, 1 failed");
    }

    #[test]
    fn failed_attempts_are_tallied() {
        let handler = CliProgressHandler::new();
        let callback = handler.get_callback();
        callback(Progress::GenerationStart {
            mode: GenerationMode::Batch,
            requested: 3,
            per_attempt_models: true,
        });
        assert_eq!(bar(&handler).message(), "(stereo sampled)");
        for attempt in 0..2 {
            callback(Progress::AttemptFailed {
                attempt,
                error: DgError::RefinedChiralsWrong,
            });
        }
        assert_eq!(handler.failures(), 2);
        assert_eq!(bar(&handler).message(), "2 failed");
        assert_eq!(bar(&handler).position(), 0);
    }

    #[test]
    fn events_from_worker_threads_are_accepted() {
        let handler = CliProgressHandler::new();
        let workers: Vec<_> = (0..4)
            .map(|attempt| {
                let callback = handler.get_callback();
                thread::spawn(move || {
                    callback(Progress::AttemptFailed {
                        attempt,
                        error: DgError::Unknown("attempt panicked".to_string()),
                    })
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(handler.failures(), 4);
    }
}
