/// Configuration for the dataflow solver.
#[derive(Debug, Default, Clone)]
pub struct DataflowConfig {
    /// Upper bound on solver rounds, overriding the computed default.
    max_rounds: Option<usize>,
}

impl DataflowConfig {
    /// Get a new, default configuration
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of rounds the solver may run before giving up.
    ///
    /// Monotone transfer functions converge without a bound; the cap exists
    /// so that a non-monotone client bug terminates with an error in the log
    /// instead of spinning.
    pub fn set_max_rounds(&mut self, rounds: usize) -> &mut Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// The effective round bound for a problem of `domain_size` atoms over
    /// `num_blocks` blocks.
    pub fn max_rounds(&self, domain_size: usize, num_blocks: usize) -> usize {
        self.max_rounds
            .unwrap_or_else(|| (domain_size + 1) * num_blocks + 1)
    }
}
