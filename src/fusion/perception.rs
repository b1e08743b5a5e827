use super::vote::SensorSource;

/// Latest measured pose. Heading in degrees, depth in the controller's units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseEstimate {
    pub heading: f32,
    pub depth: f32,
}

/// A target sighting published by perception.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetReport {
    pub source: SensorSource,
    /// Absolute heading towards the target.
    pub bearing: f32,
    /// Depth the target sits at, if perception could tell.
    pub depth: Option<f32>,
    /// Fraction of the image the target covers.
    pub apparent_size: f32,
}

/// Decides when a target counts as hit. Supplied by perception; the mission
/// only consumes the verdict.
pub trait TargetPolicy: Send + Sync {
    fn target_hit(&self, report: &TargetReport) -> bool;
}

/// Hit once the target fills at least `min_size` of the frame.
#[derive(Debug, Clone, Copy)]
pub struct AreaThresholdPolicy {
    pub min_size: f32,
}

impl TargetPolicy for AreaThresholdPolicy {
    fn target_hit(&self, report: &TargetReport) -> bool {
        report.apparent_size >= self.min_size
    }
}

/// What perception delivered during one control cycle.
#[derive(Debug, Clone, Default)]
pub struct PerceptionSnapshot {
    latest: [Option<TargetReport>; SensorSource::COUNT],
    hit: [bool; SensorSource::COUNT],
}

impl PerceptionSnapshot {
    pub fn record(&mut self, report: TargetReport, hit: bool) {
        let i = report.source.index();
        self.latest[i] = Some(report);
        self.hit[i] |= hit;
    }

    pub fn latest(&self, source: SensorSource) -> Option<&TargetReport> {
        self.latest[source.index()].as_ref()
    }

    pub fn target_hit(&self, source: SensorSource) -> bool {
        self.hit[source.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_policy_uses_threshold() {
        let policy = AreaThresholdPolicy { min_size: 0.25 };
        let mut report = TargetReport { apparent_size: 0.1, ..Default::default() };
        assert!(!policy.target_hit(&report));
        report.apparent_size = 0.25;
        assert!(policy.target_hit(&report));
    }

    #[test]
    fn snapshot_keeps_latest_and_sticky_hit() {
        let mut snap = PerceptionSnapshot::default();
        let first = TargetReport { source: SensorSource::FirstTarget, bearing: 10.0, ..Default::default() };
        let second = TargetReport { bearing: 12.0, ..first };

        snap.record(first, true);
        snap.record(second, false);

        assert_eq!(snap.latest(SensorSource::FirstTarget).unwrap().bearing, 12.0);
        assert!(snap.target_hit(SensorSource::FirstTarget));
        assert!(snap.latest(SensorSource::SecondTarget).is_none());
        assert!(!snap.target_hit(SensorSource::SecondTarget));
    }
}
