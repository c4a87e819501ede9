use genie_core::models::{RunSnapshot, RunState};
use genie_core::orchestration::{ErrorReporter, ProgressPresenter, RunView};

/// Renders run progress on stderr and cancels the run on Ctrl-C.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPresenter;

impl ProgressPresenter for TerminalPresenter {
    fn open(&self, title: &str, view: RunView) {
        let Some(mut receiver) = view.subscribe() else {
            return;
        };
        eprintln!("{title} (run {})", view.run_id());

        tokio::spawn(async move {
            let mut last_line = String::new();
            loop {
                let snapshot = receiver.borrow_and_update().clone();
                if snapshot.run_id != Some(view.run_id()) {
                    return;
                }

                let line = status_line(&snapshot);
                if line != last_line {
                    eprintln!("  {line}");
                    last_line = line;
                }
                if snapshot.state.is_terminal() {
                    return;
                }

                tokio::select! {
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    interrupted = tokio::signal::ctrl_c() => {
                        if let Err(error) = interrupted {
                            tracing::warn!(error = %error, "unable to listen for interrupts");
                            if receiver.changed().await.is_err() {
                                return;
                            }
                            continue;
                        }
                        eprintln!("  interrupt received, cancelling...");
                        if let Err(error) = view.cancel().await {
                            tracing::error!(
                                run_id = view.run_id().0,
                                message = %error.message,
                                "failed to cancel run"
                            );
                        }
                    }
                }
            }
        });
    }
}

fn status_line(snapshot: &RunSnapshot) -> String {
    let mut line = format!("[{}]", snapshot.state);
    if !snapshot.update.message.is_empty() {
        line.push(' ');
        line.push_str(&snapshot.update.message);
    }
    if let Some(progress) = snapshot.update.progress {
        line.push_str(&format!(" ({progress:.0}%)"));
    }
    if snapshot.job_ids.len() > 1 && snapshot.state == RunState::Running {
        line.push_str(&format!(
            " [job {}/{}]",
            (snapshot.completed_jobs + 1).min(snapshot.job_ids.len()),
            snapshot.job_ids.len()
        ));
    }
    line
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StderrReporter;

impl ErrorReporter for StderrReporter {
    fn report(&self, message: &str) {
        eprintln!("error: {message}");
    }
}
