use parking_lot::Mutex;

/// Sources allowed to vote on the vehicle's heading and depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorSource {
    #[default]
    Path,
    FirstTarget,
    SecondTarget,
    Localization,
}

impl SensorSource {
    pub const COUNT: usize = 4;
    pub const ALL: [SensorSource; Self::COUNT] = [
        SensorSource::Path,
        SensorSource::FirstTarget,
        SensorSource::SecondTarget,
        SensorSource::Localization,
    ];

    pub fn index(self) -> usize {
        match self {
            SensorSource::Path => 0,
            SensorSource::FirstTarget => 1,
            SensorSource::SecondTarget => 2,
            SensorSource::Localization => 3,
        }
    }
}

/// One axis (heading or depth) of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoteAxis {
    pub value: f32,
    /// Kept within [0, 1] by `set_weight`.
    pub weight: f32,
    /// Fraction of the weight lost per decay tick; 0 never decays.
    pub decay_rate: f32,
}

impl VoteAxis {
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
    }

    /// Apply one decay tick. A rate outside [0, 1] leaves the weight alone.
    pub fn decay(&mut self) {
        if self.weight > 0.0 && (0.0..=1.0).contains(&self.decay_rate) {
            self.weight *= 1.0 - self.decay_rate;
        }
    }

    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorVote {
    pub source: SensorSource,
    pub heading: VoteAxis,
    pub depth: VoteAxis,
    pub initialized: bool,
}

impl SensorVote {
    pub fn new(source: SensorSource) -> Self {
        Self { source, ..Default::default() }
    }
}

/// Composite setpoint of one cycle. `None` on an axis means no source
/// carried weight, so nothing is commanded on it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Composite {
    pub heading: Option<f32>,
    pub depth: Option<f32>,
}

/// Weighted mean over entries with positive weight; `None` when the weights
/// sum to zero.
pub fn weighted_mean<I>(axes: I) -> Option<f32>
where
    I: IntoIterator<Item = VoteAxis>,
{
    let (sum, total) = axes
        .into_iter()
        .filter(|axis| axis.is_active())
        .fold((0.0f32, 0.0f32), |(sum, total), axis| {
            (sum + axis.value * axis.weight, total + axis.weight)
        });

    if total == 0.0 {
        None
    } else {
        Some(sum / total)
    }
}

/// Fixed set of votes, one per source, each behind its own lock.
pub struct VoteRegistry {
    entries: [Mutex<SensorVote>; SensorSource::COUNT],
}

impl VoteRegistry {
    pub fn new() -> Self {
        Self {
            entries: SensorSource::ALL.map(|source| Mutex::new(SensorVote::new(source))),
        }
    }

    /// Mutate one entry under its lock.
    pub fn update<R>(&self, source: SensorSource, f: impl FnOnce(&mut SensorVote) -> R) -> R {
        let mut vote = self.entries[source.index()].lock();
        f(&mut vote)
    }

    pub fn get(&self, source: SensorSource) -> SensorVote {
        *self.entries[source.index()].lock()
    }

    pub fn snapshot(&self) -> [SensorVote; SensorSource::COUNT] {
        SensorSource::ALL.map(|source| self.get(source))
    }

    pub fn reset_values(&self) {
        for entry in &self.entries {
            let mut vote = entry.lock();
            vote.heading.value = 0.0;
            vote.depth.value = 0.0;
        }
    }

    pub fn reset_weights(&self) {
        for entry in &self.entries {
            let mut vote = entry.lock();
            vote.heading.weight = 0.0;
            vote.depth.weight = 0.0;
        }
    }

    pub fn decay(&self) {
        for entry in &self.entries {
            let mut vote = entry.lock();
            vote.heading.decay();
            vote.depth.decay();
        }
    }

    pub fn composite(&self) -> Composite {
        let votes = self.snapshot();
        Composite {
            heading: weighted_mean(votes.iter().map(|v| v.heading)),
            depth: weighted_mean(votes.iter().map(|v| v.depth)),
        }
    }
}

impl Default for VoteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axis(value: f32, weight: f32) -> VoteAxis {
        VoteAxis { value, weight, decay_rate: 0.0 }
    }

    #[test]
    fn composite_is_weighted_average() {
        let mean = weighted_mean([axis(10.0, 1.0), axis(30.0, 3.0)]).unwrap();
        assert_relative_eq!(mean, 25.0);
    }

    #[test]
    fn zero_weights_produce_no_composite() {
        assert_eq!(weighted_mean([axis(10.0, 0.0), axis(30.0, 0.0)]), None);
        assert_eq!(weighted_mean(std::iter::empty::<VoteAxis>()), None);
    }

    #[test]
    fn inactive_entries_do_not_pull_the_mean() {
        let mean = weighted_mean([axis(50.0, 0.5), axis(-100.0, 0.0)]).unwrap();
        assert_relative_eq!(mean, 50.0);
    }

    #[test]
    fn decay_is_multiplicative() {
        let mut a = VoteAxis { value: 0.0, weight: 1.0, decay_rate: 0.1 };
        a.decay();
        assert_relative_eq!(a.weight, 0.9, epsilon = 1e-6);
        for _ in 0..4 {
            a.decay();
        }
        assert_relative_eq!(a.weight, 0.9f32.powi(5), epsilon = 1e-6);
    }

    #[test]
    fn malformed_decay_rate_is_ignored() {
        let mut high = VoteAxis { value: 0.0, weight: 0.8, decay_rate: 1.5 };
        let mut negative = VoteAxis { value: 0.0, weight: 0.8, decay_rate: -0.5 };
        high.decay();
        negative.decay();
        assert_relative_eq!(high.weight, 0.8);
        assert_relative_eq!(negative.weight, 0.8);
    }

    #[test]
    fn zero_decay_never_decays() {
        let mut a = VoteAxis { value: 0.0, weight: 0.7, decay_rate: 0.0 };
        for _ in 0..100 {
            a.decay();
        }
        assert_relative_eq!(a.weight, 0.7);
    }

    #[test]
    fn set_weight_clamps() {
        let mut a = VoteAxis::default();
        a.set_weight(3.0);
        assert_eq!(a.weight, 1.0);
        a.set_weight(-1.0);
        assert_eq!(a.weight, 0.0);
        a.set_weight(f32::NAN);
        assert_eq!(a.weight, 0.0);
    }

    #[test]
    fn reset_values_keeps_weights() {
        let votes = VoteRegistry::new();
        votes.update(SensorSource::Path, |v| {
            v.heading = axis(10.0, 1.0);
            v.depth = axis(20.0, 0.5);
        });

        votes.reset_values();

        let path = votes.get(SensorSource::Path);
        assert_eq!(path.heading.value, 0.0);
        assert_eq!(path.depth.value, 0.0);
        assert_eq!(path.heading.weight, 1.0);
        assert_eq!(path.depth.weight, 0.5);
    }

    #[test]
    fn registry_composite_spans_sources() {
        let votes = VoteRegistry::new();
        votes.update(SensorSource::Path, |v| v.heading = axis(10.0, 1.0));
        votes.update(SensorSource::FirstTarget, |v| v.heading = axis(30.0, 3.0));

        let composite = votes.composite();
        assert_relative_eq!(composite.heading.unwrap(), 25.0);
        assert_eq!(composite.depth, None);
    }

    #[test]
    fn sources_map_to_distinct_entries() {
        let votes = VoteRegistry::new();
        for source in SensorSource::ALL {
            assert_eq!(votes.get(source).source, source);
        }
    }
}
