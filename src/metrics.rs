// =============================================================================
// Rolling statistics — shared by the dispatcher and the egress publisher
// =============================================================================
//
// Both L5 and L7 need "rolling average and max over the last 1000 samples";
// this is the one implementation, not a copy per component.
// =============================================================================

use std::collections::VecDeque;

use parking_lot::Mutex;

pub struct RollingWindow {
    samples: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, sample: f64) {
        let mut samples = self.samples.lock();
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    pub fn average(&self) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        }
    }

    pub fn max(&self) -> f64 {
        self.samples.lock().iter().cloned().fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
