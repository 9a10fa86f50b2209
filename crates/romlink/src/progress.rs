use std::{sync::Mutex, time::Duration};

use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use romlink_catalog::mp;
use romlink_install::{ProgressEvent, ProgressSink, Stage};

/// Shows pipeline progress as a single bar on the shared [`indicatif::MultiProgress`].
pub struct BarSink {
    bar: ProgressBar,
    stage: Mutex<Option<Stage>>,
}

impl BarSink {
    #[allow(clippy::missing_panics_doc)]
    #[must_use]
    pub fn new(name: &str) -> Self {
        let bar = ProgressBar::new(100)
            .with_prefix(name.to_owned())
            .with_finish(ProgressFinish::AndLeave)
            .with_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] {prefix} [{wide_bar:.cyan/blue}] {percent:>3}% {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
            );

        let bar = mp().add(bar);
        bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            bar,
            stage: Mutex::new(None),
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_owned());
    }
}

impl ProgressSink for BarSink {
    fn report(&self, event: ProgressEvent) {
        let mut stage = self.stage.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *stage != Some(event.stage) {
            *stage = Some(event.stage);
            self.bar.set_position(0);
        }

        if let Some(percent) = event.percent {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let position = percent.round() as u64;
            self.bar.set_position(position);
        }

        self.bar.set_message(format!("{}: {}", event.stage, event.message));
    }
}
