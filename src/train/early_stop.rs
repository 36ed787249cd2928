/// Decides from the training-loss history whether to stop.
///
/// Fires on a regression, not a plateau: once the history is longer than
/// `window`, the run stops when the latest loss is higher than every one of
/// the `window` losses immediately before it. Histories of length
/// `<= window` never stop. A NaN anywhere in the comparison keeps the run
/// going: NaN is neither above nor below any loss.
pub fn should_stop(history: &[f64], window: usize) -> bool {
    if window == 0 || history.len() <= window {
        return false;
    }
    let (current, earlier) = match history.split_last() {
        Some(split) => split,
        None => return false,
    };
    let trailing = &earlier[earlier.len() - window..];
    trailing.iter().all(|&previous| previous < *current)
}

/// `should_stop` bound to a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStopping {
    pub window: usize,
}

impl EarlyStopping {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn should_stop(&self, history: &[f64]) -> bool {
        should_stop(history, self.window)
    }
}
