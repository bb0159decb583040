//! Telemetry collection for protocol instances.
//!
//! Counters live on the instance record itself and are monotonically
//! non-decreasing for the instance's lifetime. The collector is a pure read
//! accessor: it snapshots instances after rounds, prints a summary table,
//! and exports CSV/JSON. It holds no storage of its own beyond the session
//! header.

use std::fs::File;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::instance::Instance;

/// Per-instance transfer and hash counters.
///
/// Monotonically non-decreasing: fields are only ever added to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryCounters {
    /// Bytes the prover has sent (commitments and answers)
    pub prover_bytes_sent: u64,
    /// Bytes the verifier has sent (challenge selectors)
    pub verifier_bytes_sent: u64,
    /// Keyed-hash invocations attributed to the prover
    pub prover_hash_invocations: u64,
    /// Keyed-hash invocations attributed to the verifier
    pub verifier_hash_invocations: u64,
}

impl TelemetryCounters {
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn add_prover_bytes(&mut self, n: u64) {
        self.prover_bytes_sent += n;
    }

    pub fn add_verifier_bytes(&mut self, n: u64) {
        self.verifier_bytes_sent += n;
    }

    /// Replaces the hash counters with fresh readings from the host binding.
    /// Callers must only pass readings from the same binding, which only
    /// grows, preserving monotonicity.
    pub fn set_hash_invocations(&mut self, prover: u64, verifier: u64) {
        debug_assert!(prover >= self.prover_hash_invocations);
        debug_assert!(verifier >= self.verifier_hash_invocations);
        self.prover_hash_invocations = prover;
        self.verifier_hash_invocations = verifier;
    }
}

/// Point-in-time view of one instance, refreshed after each round.
#[derive(Clone, Debug, Serialize)]
pub struct TelemetrySnapshot {
    pub set_id: String,
    pub display_name: String,
    pub security_exponent: f64,
    pub rounds: u64,
    pub impersonation_probability: f64,
    /// log2 of the probability, the form the operator surface displays
    pub probability_log2: f64,
    pub memory_bytes: usize,
    #[serde(flatten)]
    pub counters: TelemetryCounters,
    pub converged: bool,
    pub failed: bool,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySnapshot {
    pub fn csv_header() -> &'static [&'static str] {
        &[
            "set_id",
            "display_name",
            "security_exponent",
            "rounds",
            "impersonation_probability",
            "probability_log2",
            "memory_bytes",
            "prover_bytes_sent",
            "verifier_bytes_sent",
            "prover_hash_invocations",
            "verifier_hash_invocations",
            "converged",
            "failed",
            "timestamp",
        ]
    }

    pub fn to_csv_record(&self) -> Vec<String> {
        vec![
            self.set_id.clone(),
            self.display_name.clone(),
            format!("{:.1}", self.security_exponent),
            self.rounds.to_string(),
            format!("{:e}", self.impersonation_probability),
            format!("{:.2}", self.probability_log2),
            self.memory_bytes.to_string(),
            self.counters.prover_bytes_sent.to_string(),
            self.counters.verifier_bytes_sent.to_string(),
            self.counters.prover_hash_invocations.to_string(),
            self.counters.verifier_hash_invocations.to_string(),
            self.converged.to_string(),
            self.failed.to_string(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]
    }
}

/// Read-only aggregation over instances for one session.
pub struct TelemetryCollector {
    pub session_name: String,
    pub start_time: DateTime<Utc>,
}

impl TelemetryCollector {
    pub fn new(session_name: &str) -> Self {
        Self { session_name: session_name.to_string(), start_time: Utc::now() }
    }

    /// Snapshots every instance's current counters and protocol state.
    pub fn collect(&self, instances: &[Instance]) -> Vec<TelemetrySnapshot> {
        let now = Utc::now();
        instances
            .iter()
            .map(|instance| {
                let descriptor = instance.descriptor();
                let probability = instance.impersonation_probability();
                TelemetrySnapshot {
                    set_id: descriptor.id.clone(),
                    display_name: descriptor.display_name.clone(),
                    security_exponent: descriptor.security_exponent(),
                    rounds: instance.round_count(),
                    impersonation_probability: probability,
                    probability_log2: probability.log2(),
                    memory_bytes: instance.memory_footprint(),
                    counters: *instance.telemetry(),
                    converged: instance.converged(),
                    failed: instance.failed(),
                    timestamp: now,
                }
            })
            .collect()
    }

    /// Prints the per-instance summary table.
    pub fn print_summary(&self, snapshots: &[TelemetrySnapshot]) {
        println!("\n=== Telemetry Summary: {} ===", self.session_name);
        println!(
            "Duration: {:.1} seconds",
            Utc::now().signed_duration_since(self.start_time).num_milliseconds() as f64 / 1000.0
        );

        println!(
            "| {:10} | {:8} | {:6} | {:>10} | {:>9} | {:>11} | {:>11} | {:>8} | {:>8} | {:9} |",
            "Set", "Security", "Rounds", "Prob(log2)", "Mem (KiB)", "Prover KiB",
            "Verif KiB", "P-hash", "V-hash", "State"
        );
        for snap in snapshots {
            let state = if snap.failed {
                "FAILED"
            } else if snap.converged {
                "converged"
            } else {
                "running"
            };
            println!(
                "| {:10} | 2^{:5.1} | {:6} | {:>10.2} | {:>9.1} | {:>11.1} | {:>11.3} | {:>8} | {:>8} | {:9} |",
                snap.display_name,
                snap.security_exponent,
                snap.rounds,
                snap.probability_log2,
                snap.memory_bytes as f64 / 1024.0,
                snap.counters.prover_bytes_sent as f64 / 1024.0,
                snap.counters.verifier_bytes_sent as f64 / 1024.0,
                snap.counters.prover_hash_invocations,
                snap.counters.verifier_hash_invocations,
                state
            );
        }
    }

    /// Exports snapshots to a CSV file.
    pub fn export_to_csv(
        &self,
        filename: &str,
        snapshots: &[TelemetrySnapshot],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(filename)?;
        writer.write_record(TelemetrySnapshot::csv_header())?;
        for snap in snapshots {
            writer.write_record(snap.to_csv_record())?;
        }
        writer.flush()?;
        println!("Exported {} snapshots to {}", snapshots.len(), filename);
        Ok(())
    }

    /// Exports snapshots as a pretty-printed JSON document.
    pub fn export_to_json(
        &self,
        filename: &str,
        snapshots: &[TelemetrySnapshot],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = File::create(filename)?;
        let body = serde_json::to_string_pretty(snapshots)?;
        file.write_all(body.as_bytes())?;
        println!("Exported {} snapshots to {}", snapshots.len(), filename);
        Ok(())
    }

    /// Renders snapshots as a JSON string (for stdout-oriented modes).
    pub fn to_json_string(
        &self,
        snapshots: &[TelemetrySnapshot],
    ) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_zeroed() {
        let counters = TelemetryCounters::zeroed();
        assert_eq!(counters.prover_bytes_sent, 0);
        assert_eq!(counters.verifier_bytes_sent, 0);
        assert_eq!(counters.prover_hash_invocations, 0);
        assert_eq!(counters.verifier_hash_invocations, 0);
    }

    #[test]
    fn counters_accumulate() {
        let mut counters = TelemetryCounters::zeroed();
        counters.add_prover_bytes(448);
        counters.add_prover_bytes(260);
        counters.add_verifier_bytes(1);
        counters.set_hash_invocations(14, 2);

        assert_eq!(counters.prover_bytes_sent, 708);
        assert_eq!(counters.verifier_bytes_sent, 1);
        assert_eq!(counters.prover_hash_invocations, 14);
        assert_eq!(counters.verifier_hash_invocations, 2);
    }

    #[test]
    fn csv_record_matches_the_header_width() {
        let snap = TelemetrySnapshot {
            set_id: "s41".to_string(),
            display_name: "S41".to_string(),
            security_exponent: 80.0,
            rounds: 218,
            impersonation_probability: 2f64.powi(-30),
            probability_log2: -30.0,
            memory_bytes: 1_500_000,
            counters: TelemetryCounters::zeroed(),
            converged: true,
            failed: false,
            timestamp: Utc::now(),
        };
        assert_eq!(snap.to_csv_record().len(), TelemetrySnapshot::csv_header().len());
    }

    #[test]
    fn snapshots_serialize_to_json() {
        let collector = TelemetryCollector::new("unit");
        let snap = TelemetrySnapshot {
            set_id: "3x3x3".to_string(),
            display_name: "3x3x3".to_string(),
            security_exponent: 32.0,
            rounds: 0,
            impersonation_probability: 1.0,
            probability_log2: 0.0,
            memory_bytes: 0,
            counters: TelemetryCounters::zeroed(),
            converged: false,
            failed: false,
            timestamp: Utc::now(),
        };
        let json = collector.to_json_string(&[snap]).unwrap();
        assert!(json.contains("\"set_id\": \"3x3x3\""));
        assert!(json.contains("prover_hash_invocations"));
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");
        let collector = TelemetryCollector::new("unit");
        let snap = TelemetrySnapshot {
            set_id: "s41".to_string(),
            display_name: "S41".to_string(),
            security_exponent: 80.0,
            rounds: 1,
            impersonation_probability: 12.0 / 13.0,
            probability_log2: (12.0f64 / 13.0).log2(),
            memory_bytes: 64,
            counters: TelemetryCounters::zeroed(),
            converged: false,
            failed: false,
            timestamp: Utc::now(),
        };
        collector.export_to_csv(path.to_str().unwrap(), &[snap]).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert!(lines.next().unwrap().starts_with("set_id,display_name"));
        assert!(lines.next().unwrap().starts_with("s41,S41"));
    }
}
