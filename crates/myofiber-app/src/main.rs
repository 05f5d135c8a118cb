//! Simulation shell: runs one seeded muscle-fiber model and streams its
//! aggregate history to a CSV file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use myofiber_core::{AggregateRecord, MuscleConfig, MuscleModel, RecordSink};
use tracing::{info, warn};

fn main() -> Result<()> {
    init_tracing();

    let days = env_u64("MYOFIBER_DAYS", 365);
    let seed = std::env::var("MYOFIBER_SEED")
        .ok()
        .and_then(|s| s.parse::<u64>().ok());
    let output: PathBuf = std::env::var("MYOFIBER_OUT")
        .unwrap_or_else(|_| "model_data.csv".to_string())
        .into();

    let config = MuscleConfig {
        rng_seed: seed,
        ..MuscleConfig::default()
    };
    info!(
        width = config.width,
        height = config.height,
        days,
        seed = ?config.rng_seed,
        output = %output.display(),
        "Starting muscle-fiber simulation shell"
    );

    let writer = Arc::new(Mutex::new(
        CsvWriter::create(&output)
            .with_context(|| format!("failed to create {}", output.display()))?,
    ));
    let sink = SharedCsvSink::new(Arc::clone(&writer));
    let mut model = MuscleModel::with_sink(config, Box::new(sink))?;

    model.run(days);

    writer
        .lock()
        .map_err(|_| anyhow!("csv writer lock poisoned"))?
        .finish()
        .with_context(|| format!("failed to flush {}", output.display()))?;

    if let Some(summary) = model.history().last() {
        info!(
            time = summary.time,
            muscle_mass = summary.muscle_mass,
            anabolic_mean = summary.anabolic_mean,
            catabolic_mean = summary.catabolic_mean,
            "Simulation complete"
        );
    } else {
        warn!("Simulation finished without producing any records");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Buffered CSV writer holding the first write failure until `finish`.
struct CsvWriter {
    out: BufWriter<File>,
    failure: Option<io::Error>,
}

impl CsvWriter {
    fn create(path: &Path) -> io::Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "time,muscle_mass,anabolic_mean,catabolic_mean")?;
        Ok(Self { out, failure: None })
    }

    fn append(&mut self, record: &AggregateRecord) {
        if self.failure.is_some() {
            return;
        }
        let row = writeln!(
            self.out,
            "{},{},{},{}",
            record.time, record.muscle_mass, record.anabolic_mean, record.catabolic_mean
        );
        if let Err(error) = row {
            warn!(%error, time = record.time, "failed to append record row");
            self.failure = Some(error);
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.failure.take() {
            Some(error) => Err(error),
            None => self.out.flush(),
        }
    }
}

/// Record sink sharing one CSV writer with the shell.
struct SharedCsvSink(Arc<Mutex<CsvWriter>>);

impl SharedCsvSink {
    fn new(writer: Arc<Mutex<CsvWriter>>) -> Self {
        Self(writer)
    }
}

impl RecordSink for SharedCsvSink {
    fn on_record(&mut self, record: &AggregateRecord) {
        if let Ok(mut writer) = self.0.lock() {
            writer.append(record);
        }
    }
}
