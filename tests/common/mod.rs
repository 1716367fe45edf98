//! Shared synthetic data for integration tests
//!
//! A miniature generator with the failure modes the engine exists to catch:
//! a well-behaved proxy that tracks the outcome, a "gamed" proxy that lifts
//! regardless of long-term harm, and a Mobile/IN cohort where early
//! engagement rises while the long-horizon outcome falls.

use proxima::{ExperimentRow, ExperimentTable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const GOOD_PROXY: &str = "early_engagement";
pub const GAMED_PROXY: &str = "early_clicks";
pub const OUTCOME: &str = "long_score";

const REGIONS: [&str; 3] = ["NA", "EU", "IN"];
const DEVICES: [&str; 2] = ["TV", "Mobile"];

/// Deterministic synthetic table: `n_experiments` experiments with
/// `rows_per_experiment` user rows each (arms alternate, so both are always
/// populated).
#[allow(dead_code)]
pub fn synthetic_table(n_experiments: usize, rows_per_experiment: usize, seed: u64) -> ExperimentTable {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Heterogeneous per-experiment long-term lift
    let taus: Vec<f64> = (0..n_experiments)
        .map(|_| rng.gen_range(-0.15..0.15))
        .collect();

    let mut rows = Vec::with_capacity(n_experiments * rows_per_experiment);
    for (e, &tau) in taus.iter().enumerate() {
        for i in 0..rows_per_experiment {
            let treated = i % 2 == 0;
            let t = f64::from(u8::from(treated));
            let region = REGIONS[rng.gen_range(0..REGIONS.len())];
            let device = DEVICES[rng.gen_range(0..DEVICES.len())];
            let failure_cohort = device == "Mobile" && region == "IN";

            let noise = rng.gen_range(-0.2..0.2);
            // Treated Mobile/IN users look engaged early but churn long-term
            let outcome_tau = if failure_cohort { -(0.3 + tau.abs()) } else { tau };
            let long_score = 0.5 + t * outcome_tau + noise;

            let engagement_tau = if failure_cohort {
                0.9 * tau.abs() + 0.1
            } else {
                0.9 * tau
            };
            let early_engagement = 1.0 + t * engagement_tau + rng.gen_range(-0.1..0.1);

            // Gamed: a flat positive lift regardless of the outcome
            let early_clicks = 0.3 + t * 0.08 + rng.gen_range(-0.05..0.05);

            rows.push(
                ExperimentRow::builder(format!("exp-{e:03}"), treated)
                    .segment("region", region)
                    .segment("device", device)
                    .metric(GOOD_PROXY, early_engagement)
                    .metric(GAMED_PROXY, early_clicks)
                    .metric(OUTCOME, long_score)
                    .build(),
            );
        }
    }

    ExperimentTable::from_rows(rows).expect("synthetic rows are schema-valid")
}

/// Rebuild a table with the named metric columns negated row-wise; all other
/// columns are carried over unchanged.
#[allow(dead_code)]
pub fn negate_metrics(table: &ExperimentTable, metrics: &[&str]) -> ExperimentTable {
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut builder = ExperimentRow::builder(row.experiment_id(), row.treatment());
            for (name, value) in row.segments() {
                builder = builder.segment(name, value);
            }
            for (name, value) in row.metrics() {
                let value = if metrics.contains(&name.as_str()) {
                    -value
                } else {
                    *value
                };
                builder = builder.metric(name, value);
            }
            builder.build()
        })
        .collect();
    ExperimentTable::from_rows(rows).expect("negation preserves schema validity")
}

/// Fixed three-experiment fixture with exact effects:
/// proxy [+0.10, +0.05, -0.02], outcome [+0.08, +0.04, +0.01].
#[allow(dead_code)]
pub fn three_experiment_fixture() -> ExperimentTable {
    // (treat rows, per-row (proxy, outcome))
    let treat: [[(f64, f64); 2]; 3] = [
        [(0.10, 0.08), (0.12, 0.10)],
        [(0.05, 0.04), (0.07, 0.06)],
        [(-0.02, 0.01), (0.00, 0.03)],
    ];
    let control: [(f64, f64); 2] = [(0.00, 0.00), (0.02, 0.02)];

    let mut rows = Vec::new();
    for (e, arm) in treat.iter().enumerate() {
        let exp = format!("exp-{}", e + 1);
        for &(p, o) in arm {
            rows.push(
                ExperimentRow::builder(&exp, true)
                    .segment("cohort", "all")
                    .metric("proxy", p)
                    .metric("outcome", o)
                    .build(),
            );
        }
        for &(p, o) in &control {
            rows.push(
                ExperimentRow::builder(&exp, false)
                    .segment("cohort", "all")
                    .metric("proxy", p)
                    .metric("outcome", o)
                    .build(),
            );
        }
    }
    ExperimentTable::from_rows(rows).expect("fixture rows are schema-valid")
}
