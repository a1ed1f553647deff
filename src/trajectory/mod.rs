//! Sampled simulation output and the analysis a plotting collaborator
//! typically needs from it.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Serialize;
use crate::membrane::MembraneState;


/// Ordered `(time, state)` samples of a simulation, times strictly increasing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    /// Variable labels in state order, `V` first
    labels: Vec<String>,
    /// Sample times (ms)
    times: Array1<f64>,
    /// One row per sample, one column per state variable
    states: Array2<f64>,
}

impl Trajectory {
    /// Builds a trajectory from sample times and row-major states of width `dimension`
    pub fn from_samples(dimension: usize, times: Vec<f64>, flat_states: Vec<f64>) -> Self {
        let rows = times.len().min(flat_states.len() / dimension.max(1));
        let states = Array2::from_shape_fn((rows, dimension), |(i, j)| flat_states[i * dimension + j]);
        let mut times = times;
        times.truncate(rows);

        Trajectory {
            labels: (0..dimension).map(|i| format!("y{}", i)).collect(),
            times: Array1::from_vec(times),
            states,
        }
    }

    /// Replaces the variable labels, ignored if the count does not match the state width
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        if labels.len() == self.dimension() {
            self.labels = labels;
        }

        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    pub fn states(&self) -> &Array2<f64> {
        &self.states
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Width of a state row
    pub fn dimension(&self) -> usize {
        self.states.ncols()
    }

    /// Column of a labelled variable
    pub fn variable(&self, label: &str) -> Option<ArrayView1<f64>> {
        self.labels.iter()
            .position(|i| i == label)
            .map(|index| self.states.column(index))
    }

    /// Membrane potential over time (mV), empty for a zero width trajectory
    pub fn voltages(&self) -> ArrayView1<f64> {
        if self.dimension() == 0 {
            return ArrayView1::from(&[] as &[f64]);
        }

        self.states.column(0)
    }

    /// Sample `index` as a time and a state
    pub fn sample(&self, index: usize) -> Option<(f64, MembraneState)> {
        if index >= self.len() {
            return None;
        }

        let row = self.states.index_axis(Axis(0), index);

        Some((self.times[index], MembraneState::from(row.to_vec())))
    }

    /// Last sampled state
    pub fn final_state(&self) -> Option<MembraneState> {
        self.len().checked_sub(1)
            .and_then(|last| self.sample(last))
            .map(|(_, state)| state)
    }

    /// Time and value of the highest membrane potential
    pub fn peak_voltage(&self) -> Option<(f64, f64)> {
        self.voltages().iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (n, v)| match best {
                Some((_, best_v)) if best_v >= *v => best,
                _ => Some((n, *v)),
            })
            .map(|(n, v)| (self.times[n], v))
    }

    /// Times at which the membrane potential crosses `threshold` upwards,
    /// linearly interpolated between samples
    pub fn spike_times(&self, threshold: f64) -> Vec<f64> {
        let voltages = self.voltages();

        (1..self.len())
            .filter(|&i| voltages[i - 1] < threshold && voltages[i] >= threshold)
            .map(|i| {
                let (t0, t1) = (self.times[i - 1], self.times[i]);
                let (v0, v1) = (voltages[i - 1], voltages[i]);

                t0 + (threshold - v0) / (v1 - v0) * (t1 - t0)
            })
            .collect()
    }

    /// Returns indices of where voltages have peaked, consecutive samples whose
    /// voltage differs by at most `tolerance` are treated as one flat top
    /// represented by its middle sample
    pub fn find_peaks(&self, tolerance: f64) -> Vec<usize> {
        let voltages = self.voltages();

        let slopes: Vec<i8> = (1..self.len())
            .map(|i| {
                let change = voltages[i] - voltages[i - 1];
                if change.abs() <= tolerance {
                    0
                } else if change > 0. {
                    1
                } else {
                    -1
                }
            })
            .collect();

        let mut peaks = Vec::new();
        // index of the last rising difference, reset by a falling one
        let mut last_rise: Option<usize> = None;

        for (n, slope) in slopes.iter().enumerate() {
            match slope {
                1 => last_rise = Some(n),
                -1 => {
                    if let Some(rise) = last_rise {
                        peaks.push((rise + 1 + n) / 2);
                    }
                    last_rise = None;
                },
                _ => {},
            }
        }

        peaks
    }

    /// Whether every gating value (every column after the voltage) lies in [0, 1]
    pub fn gating_within_bounds(&self) -> bool {
        self.states.columns()
            .into_iter()
            .skip(1)
            .all(|column| column.iter().all(|g| (0. ..=1.).contains(g)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voltage_trace(voltages: &[f64]) -> Trajectory {
        let times = (0..voltages.len()).map(|i| i as f64).collect();
        let flat = voltages.iter().flat_map(|v| [*v, 0.5]).collect();

        Trajectory::from_samples(2, times, flat).with_labels(vec!["V".into(), "m".into()])
    }

    #[test]
    fn test_layout_and_labels() {
        let trajectory = voltage_trace(&[-65., -60., -50.]);

        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.dimension(), 2);
        assert_eq!(trajectory.labels(), &["V".to_string(), "m".to_string()]);
        assert_eq!(trajectory.variable("m").unwrap().to_vec(), vec![0.5; 3]);
        assert!(trajectory.variable("h").is_none());

        let (t, state) = trajectory.sample(1).unwrap();
        assert_eq!(t, 1.);
        assert_eq!(state.voltage(), -60.);
        assert_eq!(trajectory.final_state().unwrap().voltage(), -50.);
        assert!(trajectory.sample(3).is_none());
    }

    #[test]
    fn test_mismatched_labels_are_ignored() {
        let trajectory = voltage_trace(&[-65.]).with_labels(vec!["V".into()]);

        assert_eq!(trajectory.labels(), &["V".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_spike_times_interpolate_crossing() {
        let trajectory = voltage_trace(&[-65., -20., 20., -40., -10., 30.]);

        let spikes = trajectory.spike_times(0.);
        assert_eq!(spikes.len(), 2);
        assert!((spikes[0] - 1.5).abs() < 1e-12);
        assert!((spikes[1] - 4.25).abs() < 1e-12);
    }

    #[test]
    fn test_peak_voltage() {
        let trajectory = voltage_trace(&[-65., 35., 20., 35., -70.]);

        assert_eq!(trajectory.peak_voltage(), Some((1., 35.)));
        assert_eq!(voltage_trace(&[]).peak_voltage(), None);
    }

    #[test]
    fn test_find_peaks_with_flat_tops() {
        let trajectory = voltage_trace(&[0., 1., 2., 2., 2., 1., 0., 3., 0., 0.5]);

        assert_eq!(trajectory.find_peaks(0.01), vec![3, 7]);
        assert!(voltage_trace(&[]).find_peaks(0.01).is_empty());
        assert!(voltage_trace(&[1., 2., 3.]).find_peaks(0.01).is_empty());
    }

    #[test]
    fn test_gating_bounds_check() {
        assert!(voltage_trace(&[-65., 10.]).gating_within_bounds());

        let out_of_bounds = Trajectory::from_samples(2, vec![0., 1.], vec![-65., 0.5, -60., 1.2]);
        assert!(!out_of_bounds.gating_within_bounds());
    }

    #[test]
    fn test_zero_width_trajectory_has_no_voltages() {
        let trajectory = Trajectory::from_samples(0, vec![0., 1., 2.], vec![]);

        assert!(trajectory.voltages().is_empty());
        assert_eq!(trajectory.peak_voltage(), None);
        assert!(trajectory.spike_times(0.).is_empty());
        assert!(trajectory.find_peaks(0.01).is_empty());
        assert!(trajectory.gating_within_bounds());
    }
}
