use gangway_core::prelude::DelegatedShutdownListener;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use std::cmp::min;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Displays a progress bar while the test is running to show the user how long is left and how
/// many virtual users are active.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    active_vus: Arc<AtomicUsize>,
    shutdown_listener: DelegatedShutdownListener,
) {
    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(progress_style(planned_runtime));

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let new = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
                pb.set_position(new);
                pb.set_message(format!("{} VUs", active_vus.load(Ordering::Relaxed)));
                std::thread::sleep(Duration::from_millis(500));
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread, continuing without a progress bar: {e:?}");
    }
}

fn progress_style(planned_runtime: Duration) -> ProgressStyle {
    let hours = planned_runtime.as_secs() / 3600;
    let minutes = (planned_runtime.as_secs() % 3600) / 60;
    let seconds = planned_runtime.as_secs() % 60;

    match ProgressStyle::with_template(
        "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}",
    ) {
        Ok(style) => style
            .with_key(
                "planned_runtime",
                move |_state: &ProgressState, w: &mut dyn Write| {
                    let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
                },
            )
            .progress_chars("#>-"),
        Err(e) => {
            log::debug!("Falling back to the default progress style: {e:?}");
            ProgressStyle::default_bar()
        }
    }
}
