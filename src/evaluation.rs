// Profile evaluation engine
//
// Applies a profile table to one device. The first failing rule decides the
// verdict; a clean pass is downgraded to WARN when the device's health data
// was only partially retrieved.

use crate::device::{ControllerMetric, Device, Profile, TestResult};
use crate::profiles::{
    AttributeKey, PolicySet, ProfileTable, Rule, Source, Threshold, POWER_ON_HOURS,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("controller metric {0} missing from device health data")]
    MissingMetric(ControllerMetric),

    #[error("rule '{rule}' cannot be compared against observed value {observed}")]
    TypeMismatch { rule: Rule, observed: String },

    #[error("profile {profile} expects {expected} health data")]
    WrongHealthSource {
        profile: Profile,
        expected: &'static str,
    },
}

/// Verdict plus what produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: Option<TestResult>,
    /// Table actually applied, after the SATA cutover
    pub table: Option<Profile>,
    pub failed_rule: Option<Rule>,
}

impl Evaluation {
    fn verdict(result: Option<TestResult>) -> Self {
        Self {
            result,
            table: None,
            failed_rule: None,
        }
    }
}

pub struct Evaluator {
    policies: PolicySet,
}

impl Evaluator {
    pub fn new(policies: PolicySet) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Table a device is graded against. SATA picks plain or enterprise by
    /// power-on hours; RAID and unclassified devices have none.
    pub fn table_for(&self, device: &Device) -> Option<&ProfileTable> {
        match device.profile {
            Profile::SATA => {
                let hours = device
                    .smart_table()
                    .and_then(|table| table.get(&POWER_ON_HOURS))
                    .map(|attr| attr.raw);
                Some(self.policies.sata_table_for(hours))
            }
            profile => self.policies.table(profile),
        }
    }

    pub fn evaluate(&self, device: &Device) -> Result<Evaluation, EvaluationError> {
        match device.profile {
            Profile::RAID => return Ok(Evaluation::verdict(Some(TestResult::NotApplicable))),
            Profile::Unclassified => return Ok(Evaluation::verdict(None)),
            _ => {}
        }

        let Some(table) = self.table_for(device) else {
            return Ok(Evaluation::verdict(None));
        };

        let failed_rule = match device.profile {
            Profile::SAS => self.first_failing_metric_rule(device, table)?,
            _ => self.first_failing_smart_rule(device, table)?,
        };

        let result = if failed_rule.is_some() {
            TestResult::Fail
        } else if device.warning {
            TestResult::Warn
        } else {
            TestResult::Pass
        };

        Ok(Evaluation {
            result: Some(result),
            table: Some(table.profile),
            failed_rule,
        })
    }

    /// Evaluate and store the verdict on the device. An evaluation error
    /// grades the device FAIL.
    pub fn annotate(&self, device: &mut Device) {
        device.result = match self.evaluate(device) {
            Ok(evaluation) => {
                if let Some(rule) = evaluation.failed_rule {
                    tracing::info!(
                        device = %device.location,
                        serial = %device.serial,
                        rule = %rule,
                        "Drive failed health check"
                    );
                }
                evaluation.result
            }
            Err(e) => {
                tracing::warn!(
                    device = %device.location,
                    serial = %device.serial,
                    error = %e,
                    "Could not evaluate drive; marking it failed"
                );
                Some(TestResult::Fail)
            }
        };
    }

    fn first_failing_metric_rule(
        &self,
        device: &Device,
        table: &ProfileTable,
    ) -> Result<Option<Rule>, EvaluationError> {
        let metrics = device
            .controller_metrics()
            .ok_or(EvaluationError::WrongHealthSource {
                profile: device.profile,
                expected: "controller metric",
            })?;

        for rule in &table.rules {
            let AttributeKey::Metric(metric) = rule.key else {
                return Err(EvaluationError::TypeMismatch {
                    rule: *rule,
                    observed: "SMART attribute".to_string(),
                });
            };

            let observed = *metrics
                .get(&metric)
                .ok_or(EvaluationError::MissingMetric(metric))?;

            let passed = rule
                .check_metric(observed)
                .ok_or_else(|| EvaluationError::TypeMismatch {
                    rule: *rule,
                    observed: observed.to_string(),
                })?;

            if !passed {
                return Ok(Some(*rule));
            }
        }

        Ok(None)
    }

    fn first_failing_smart_rule(
        &self,
        device: &Device,
        table: &ProfileTable,
    ) -> Result<Option<Rule>, EvaluationError> {
        if device.controller_metrics().is_some() {
            return Err(EvaluationError::WrongHealthSource {
                profile: device.profile,
                expected: "SMART",
            });
        }

        // Unreadable SMART data skips every rule; the warning flag carries the doubt.
        let Some(smart) = device.smart_table() else {
            return Ok(None);
        };

        for rule in &table.rules {
            let AttributeKey::Smart(id) = rule.key else {
                return Err(EvaluationError::TypeMismatch {
                    rule: *rule,
                    observed: "controller metric".to_string(),
                });
            };

            let Some(attr) = smart.get(&id) else {
                continue;
            };

            let observed = match rule.source {
                Source::Value => attr.value,
                Source::Raw => attr.raw,
                Source::Metric => {
                    return Err(EvaluationError::TypeMismatch {
                        rule: *rule,
                        observed: attr.raw_string.clone(),
                    })
                }
            };

            let passed = match rule.threshold {
                Threshold::Int(limit) => rule.comparison.holds(observed, limit),
                Threshold::Flag(expected) => {
                    rule.comparison.holds(observed != 0, expected)
                }
            };

            if !passed {
                return Ok(Some(*rule));
            }
        }

        Ok(None)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(PolicySet::default())
    }
}
