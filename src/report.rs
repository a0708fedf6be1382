//! Progress and result reporting.
//!
//! The optimizer and the final run emit records through a [`ProgressSink`];
//! what happens to them (log lines, CSV files, in-memory history) is up to
//! the sink.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::network::RateVector;
use crate::simulation::TimeCourse;

/// One fitness evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleRecord {
    pub iteration: usize,
    pub particle: usize,
    pub parameters: RateVector,
    /// `+inf` for a degenerate evaluation.
    pub residual: f64,
}

/// Swarm state after one evaluate/sync round. Iteration 0 is the initial swarm.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Inertia used for the update that led here; `None` for the initial swarm.
    pub inertia: Option<f64>,
    pub global_best_residual: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CurvePoint {
    pub titrated_concentration: f64,
    pub simulated_normalized: f64,
    pub experimental_normalized: f64,
}

/// Final-run dose-response curve for one assay.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedCurve {
    pub assay: String,
    pub titrated_species: String,
    pub points: Vec<CurvePoint>,
    pub residual: f64,
}

/// Receiver for progress and result records. Every method defaults to a no-op.
pub trait ProgressSink {
    fn on_particle(&mut self, _record: &ParticleRecord) {}

    fn on_iteration(&mut self, _record: &IterationRecord) {}

    fn on_calibrated_curve(&mut self, _curve: &CalibratedCurve) {}

    fn on_time_course(&mut self, _state_labels: &[String], _course: &TimeCourse) {}

    fn finish(&mut self) {}
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {}

/// Renders records as log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_particle(&mut self, record: &ParticleRecord) {
        log::debug!(
            "iteration {} particle {}: {} residual = {}",
            record.iteration,
            record.particle,
            format_rates(&record.parameters),
            record.residual
        );
    }

    fn on_iteration(&mut self, record: &IterationRecord) {
        log::info!(
            "iteration {}: global best residual = {}",
            record.iteration,
            record.global_best_residual
        );
    }

    fn on_calibrated_curve(&mut self, curve: &CalibratedCurve) {
        log::info!(
            "calibrated {} curve over {} ({} points): residual = {}",
            curve.assay,
            curve.titrated_species,
            curve.points.len(),
            curve.residual
        );
    }

    fn on_time_course(&mut self, state_labels: &[String], course: &TimeCourse) {
        let steady: Vec<String> = state_labels
            .iter()
            .zip(&course.steady_state)
            .map(|(label, f)| format!("{}={:.4}", label, f))
            .collect();
        log::info!("steady state: {}", steady.join(" "));
    }
}

fn format_rates(rates: &RateVector) -> String {
    rates
        .iter()
        .map(|(k, v)| format!("{}={:e}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Keeps every record in memory.
#[derive(Clone, Debug, Default)]
pub struct HistorySink {
    pub particles: Vec<ParticleRecord>,
    pub iterations: Vec<IterationRecord>,
    pub curves: Vec<CalibratedCurve>,
    pub time_courses: usize,
}

impl ProgressSink for HistorySink {
    fn on_particle(&mut self, record: &ParticleRecord) {
        self.particles.push(record.clone());
    }

    fn on_iteration(&mut self, record: &IterationRecord) {
        self.iterations.push(record.clone());
    }

    fn on_calibrated_curve(&mut self, curve: &CalibratedCurve) {
        self.curves.push(curve.clone());
    }

    fn on_time_course(&mut self, _state_labels: &[String], _course: &TimeCourse) {
        self.time_courses += 1;
    }
}

/// Forwards every record to each inner sink in turn.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ProgressSink for FanoutSink {
    fn on_particle(&mut self, record: &ParticleRecord) {
        self.sinks.iter_mut().for_each(|s| s.on_particle(record));
    }

    fn on_iteration(&mut self, record: &IterationRecord) {
        self.sinks.iter_mut().for_each(|s| s.on_iteration(record));
    }

    fn on_calibrated_curve(&mut self, curve: &CalibratedCurve) {
        self.sinks.iter_mut().for_each(|s| s.on_calibrated_curve(curve));
    }

    fn on_time_course(&mut self, state_labels: &[String], course: &TimeCourse) {
        self.sinks
            .iter_mut()
            .for_each(|s| s.on_time_course(state_labels, course));
    }

    fn finish(&mut self) {
        self.sinks.iter_mut().for_each(|s| s.finish());
    }
}

/// Writes CSV files into one output directory:
/// - `particles.csv`: every evaluation
/// - `convergence.csv`: global best per iteration
/// - `calibrated_<assay>.csv`: final-run curves
/// - `time_course.csv`, `steady_state.csv`: final-run occupancy
///
/// Write failures are logged and do not interrupt the run.
pub struct CsvSink {
    dir: PathBuf,
    particles: csv::Writer<File>,
    convergence: csv::Writer<File>,
    particle_header_written: bool,
}

impl CsvSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let particles = csv::Writer::from_path(dir.join("particles.csv"))?;
        let convergence = csv::Writer::from_path(dir.join("convergence.csv"))?;
        log::info!("CSV output directory: {}", dir.display());

        Ok(Self {
            dir,
            particles,
            convergence,
            particle_header_written: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_particle(&mut self, record: &ParticleRecord) -> Result<()> {
        if !self.particle_header_written {
            let mut header = vec!["iteration".to_string(), "particle".to_string()];
            header.extend(record.parameters.keys().cloned());
            header.push("residual".to_string());
            self.particles.write_record(&header)?;
            self.particle_header_written = true;
        }
        let mut row = vec![record.iteration.to_string(), record.particle.to_string()];
        row.extend(record.parameters.values().map(|v| v.to_string()));
        row.push(record.residual.to_string());
        self.particles.write_record(&row)?;
        Ok(())
    }

    fn write_iteration(&mut self, record: &IterationRecord) -> Result<()> {
        self.convergence.serialize(record)?;
        self.convergence.flush()?;
        self.particles.flush()?;
        Ok(())
    }

    fn write_curve(&self, curve: &CalibratedCurve) -> Result<PathBuf> {
        let path = self.dir.join(format!("calibrated_{}.csv", curve.assay));
        let mut writer = csv::Writer::from_path(&path)?;
        for point in &curve.points {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn write_time_course(&self, state_labels: &[String], course: &TimeCourse) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.dir.join("time_course.csv"))?;
        let mut header = vec!["time".to_string()];
        header.extend(state_labels.iter().cloned());
        writer.write_record(&header)?;
        for (t, row) in course.times.iter().zip(course.fractions.rows()) {
            let mut fields = vec![t.to_string()];
            fields.extend(row.iter().map(|f| f.to_string()));
            writer.write_record(&fields)?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_path(self.dir.join("steady_state.csv"))?;
        writer.write_record(["state", "fraction"])?;
        for (label, f) in state_labels.iter().zip(&course.steady_state) {
            writer.write_record([label.clone(), f.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ProgressSink for CsvSink {
    fn on_particle(&mut self, record: &ParticleRecord) {
        if let Err(e) = self.write_particle(record) {
            log::warn!("failed to write particle record: {:#}", e);
        }
    }

    fn on_iteration(&mut self, record: &IterationRecord) {
        if let Err(e) = self.write_iteration(record) {
            log::warn!("failed to write convergence record: {:#}", e);
        }
    }

    fn on_calibrated_curve(&mut self, curve: &CalibratedCurve) {
        match self.write_curve(curve) {
            Ok(path) => log::info!("calibrated curve written to {}", path.display()),
            Err(e) => log::warn!("failed to write calibrated curve {}: {:#}", curve.assay, e),
        }
    }

    fn on_time_course(&mut self, state_labels: &[String], course: &TimeCourse) {
        if let Err(e) = self.write_time_course(state_labels, course) {
            log::warn!("failed to write time course: {:#}", e);
        }
    }

    fn finish(&mut self) {
        if let Err(e) = self.particles.flush().and(self.convergence.flush()) {
            log::warn!("failed to flush CSV output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn particle(iteration: usize, residual: f64) -> ParticleRecord {
        let mut parameters = RateVector::new();
        parameters.insert("k_b".to_string(), 2.0);
        parameters.insert("k_a".to_string(), 1.0);
        ParticleRecord {
            iteration,
            particle: 0,
            parameters,
            residual,
        }
    }

    #[test]
    fn test_history_and_fanout() {
        let mut history = HistorySink::default();
        history.on_particle(&particle(0, 0.5));
        history.on_iteration(&IterationRecord {
            iteration: 0,
            inertia: None,
            global_best_residual: 0.5,
        });
        assert_eq!(history.particles.len(), 1);
        assert_eq!(history.iterations[0].global_best_residual, 0.5);

        let mut fanout = FanoutSink::new().with(LogSink).with(NullSink);
        fanout.on_particle(&particle(1, 0.1));
        fanout.finish();
    }

    #[test]
    fn test_csv_sink_writes_files() {
        let dir = std::env::temp_dir().join(format!("serca_fit_csv_{}", std::process::id()));
        let mut sink = CsvSink::new(&dir).unwrap();
        sink.on_particle(&particle(0, 0.5));
        sink.on_particle(&particle(1, 0.25));
        sink.on_iteration(&IterationRecord {
            iteration: 1,
            inertia: Some(0.65),
            global_best_residual: 0.25,
        });
        sink.on_calibrated_curve(&CalibratedCurve {
            assay: "calcium".to_string(),
            titrated_species: "Ca_cyt".to_string(),
            points: vec![CurvePoint {
                titrated_concentration: 1e-7,
                simulated_normalized: 0.1,
                experimental_normalized: 0.06,
            }],
            residual: 0.04,
        });
        let course = TimeCourse {
            times: vec![0.1, 0.2],
            fractions: array![[1.0, 0.0], [0.5, 0.5]],
            steady_state: vec![0.5, 0.5],
        };
        sink.on_time_course(&["S0".to_string(), "S1".to_string()], &course);
        sink.finish();

        let particles = std::fs::read_to_string(dir.join("particles.csv")).unwrap();
        let mut lines = particles.lines();
        assert_eq!(lines.next(), Some("iteration,particle,k_a,k_b,residual"));
        assert_eq!(lines.next(), Some("0,0,1,2,0.5"));

        let convergence = std::fs::read_to_string(dir.join("convergence.csv")).unwrap();
        assert!(convergence.starts_with("iteration,inertia,global_best_residual"));

        let curve = std::fs::read_to_string(dir.join("calibrated_calcium.csv")).unwrap();
        assert_eq!(curve.lines().count(), 2);

        let time_course = std::fs::read_to_string(dir.join("time_course.csv")).unwrap();
        assert_eq!(time_course.lines().next(), Some("time,S0,S1"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
