//! Batch simulation - drives synthetic visitors through the decision engine
//!
//! One run validates the experiment, generates visitors, buckets and resolves
//! each of them in generation order, and folds the decisions into an
//! `AggregateReport`. Decisions are offered to the audit sink on the way.

use crate::domain::report::{AggregateReport, Experience};
use crate::domain::types::{Decision, ExperimentConfig, VisitorId};
use crate::error::{Result, SorterError};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::audit_channel::{new_run_id, AuditRecord, AuditSender};
use crate::services::allocator::Allocator;
use crate::services::visitors::{VisitorGenerator, MAX_VISITORS};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Simulation {
    /// Variation variable holding the text shown to enabled visitors
    variable: String,
    /// Text shown when the feature is off for a visitor
    off_text: String,
    seed: u64,
    metrics: Arc<Metrics>,
    audit: Option<AuditSender>,
}

impl Simulation {
    pub fn new(config: &Config, metrics: Arc<Metrics>, audit: Option<AuditSender>) -> Self {
        Self {
            variable: config.experiment_variable().to_string(),
            off_text: config.off_text().to_string(),
            seed: config.seed(),
            metrics,
            audit,
        }
    }

    /// Run one batch of `n` generated visitors against `experiment`
    pub fn run(&self, n: usize, experiment: &ExperimentConfig) -> Result<AggregateReport> {
        let allocator = Allocator::new(experiment)?;

        if n > MAX_VISITORS {
            return Err(SorterError::InvalidInput {
                salt: experiment.key.clone(),
                reason: format!("visitor count {} exceeds {}", n, MAX_VISITORS),
            });
        }

        let visitors = VisitorGenerator::new(self.seed).generate(n);
        self.evaluate(&allocator, &visitors)
    }

    /// Run a batch over caller-supplied visitors
    pub fn run_with_visitors(
        &self,
        visitors: &[VisitorId],
        experiment: &ExperimentConfig,
    ) -> Result<AggregateReport> {
        let allocator = Allocator::new(experiment)?;
        self.evaluate(&allocator, visitors)
    }

    fn evaluate(&self, allocator: &Allocator, visitors: &[VisitorId]) -> Result<AggregateReport> {
        let start = Instant::now();
        let run_id = new_run_id();
        let mut experiences = Vec::with_capacity(visitors.len());

        for (index, visitor_id) in visitors.iter().enumerate() {
            let decision = allocator.decide(visitor_id)?;
            let text = self.display_text(&decision, allocator.flag_key());

            if let Some(ref audit) = self.audit {
                let record = AuditRecord::new(&run_id, allocator, index, visitor_id, &decision, &text);
                if !audit.send_decision(record) {
                    self.metrics.record_audit_dropped();
                }
            }

            experiences.push(Experience { visitor_id: visitor_id.clone(), decision, text });
        }

        let report = AggregateReport::from_experiences(experiences);
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.metrics.record_run(
            report.total() as u64,
            report.enrolled_count() as u64,
            report.enabled_count() as u64,
            elapsed_us,
        );

        info!(
            run_id = %run_id,
            flag = %allocator.flag_key(),
            revision = %allocator.revision(),
            visitors = %report.total(),
            enrolled = %report.enrolled_count(),
            enabled = %report.enabled_count(),
            elapsed_us = %elapsed_us,
            "simulation_completed"
        );

        Ok(report)
    }

    fn display_text(&self, decision: &Decision, flag_key: &str) -> String {
        if !decision.enabled {
            return self.off_text.clone();
        }

        match decision.variable(&self.variable) {
            Some(value) => value.to_string(),
            None => {
                let variation = decision.variation_name.clone().unwrap_or_default();
                warn!(
                    flag = %flag_key,
                    variation = %variation,
                    variable = %self.variable,
                    "variation_variable_missing"
                );
                variation
            }
        }
    }
}
