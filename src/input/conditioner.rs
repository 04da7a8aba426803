// Input conditioning: deadzone filter followed by a moving-average smoother

use std::collections::VecDeque;

/// Axis magnitude below which the stick counts as centered
pub const DEFAULT_DEADZONE: f32 = 0.1;

/// Number of samples averaged per axis
pub const DEFAULT_FILTER_DEPTH: usize = 3;

/// Zero out values whose magnitude is below the deadzone
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone { 0.0 } else { value }
}

/// Fixed-size ring buffer of the most recent samples for one axis.
///
/// Starts filled with zeros, so the average is defined from the first push.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f32>,
}

impl MovingAverage {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            window: std::iter::repeat_n(0.0, depth).collect(),
        }
    }

    /// Push a sample, evicting the oldest, and return the new mean
    pub fn push(&mut self, value: f32) -> f32 {
        self.window.pop_front();
        self.window.push_back(value);
        self.mean()
    }

    pub fn mean(&self) -> f32 {
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }

    pub fn depth(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Deadzone + smoothing for the forward and steer axes
#[derive(Debug, Clone)]
pub struct InputConditioner {
    deadzone: f32,
    forward: MovingAverage,
    steer: MovingAverage,
}

impl InputConditioner {
    pub fn new(deadzone: f32, depth: usize) -> Self {
        Self {
            deadzone,
            forward: MovingAverage::new(depth),
            steer: MovingAverage::new(depth),
        }
    }

    /// Condition one raw sample, returning the smoothed (forward, steer)
    pub fn condition(&mut self, raw_forward: f32, raw_steer: f32) -> (f32, f32) {
        let forward = apply_deadzone(raw_forward, self.deadzone);
        let steer = apply_deadzone(raw_steer, self.deadzone);
        (self.forward.push(forward), self.steer.push(steer))
    }

    /// Forget history, as if freshly constructed
    pub fn reset(&mut self) {
        self.forward.reset();
        self.steer.reset();
    }

    pub fn deadzone(&self) -> f32 {
        self.deadzone
    }

    pub fn depth(&self) -> usize {
        self.forward.depth()
    }
}

impl Default for InputConditioner {
    fn default() -> Self {
        Self::new(DEFAULT_DEADZONE, DEFAULT_FILTER_DEPTH)
    }
}
