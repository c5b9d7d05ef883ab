//! Progress messages of long running joins.

use log::info;

/// Receives human readable progress messages. Only called when the join is verbose.
pub trait ProgressReporter {
    /// Deliver one message.
    fn report(&self, message: &str);
}

/// Forwards messages to the `log` facade at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, message: &str) {
        info!("{message}");
    }
}

/// Message announcing gene set `index` (1-based) out of `total`.
pub fn gene_set_message(index: usize, total: usize, gene_set: &str, method: &str) -> String {
    let mut message = format!(
        "Calculating expression score for gene set ({index}/{total}) '{gene_set}' \
         according to method: '{method}'."
    );
    if method != "mean" {
        message.push_str(" This might take a few moments.");
    }
    message
}

/// Message announcing that `variable` is being smoothed.
pub fn smoothing_message(variable: &str) -> String {
    format!("Smoothing variable '{variable}'.")
}
