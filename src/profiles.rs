// Pass/fail criteria per drive profile
//
// A profile table is an ordered list of rules. Order matters: evaluation
// stops at the first failing rule.

use crate::device::{ControllerMetric, MetricValue, Profile};
use serde::Serialize;
use std::fmt;

/// SMART attribute 9
pub const POWER_ON_HOURS: u8 = 9;

/// SATA drives with at least this many power-on hours are graded against
/// the enterprise table.
pub const SATA_ENTERPRISE_CUTOVER_HOURS: i64 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeKey {
    Smart(u8),
    Metric(ControllerMetric),
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKey::Smart(id) => write!(f, "{}", id),
            AttributeKey::Metric(metric) => f.write_str(metric.as_str()),
        }
    }
}

/// Which reading of the attribute a rule compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    /// Normalized SMART value
    Value,
    /// SMART raw counter
    Raw,
    /// Controller metric as reported
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Comparison {
    pub fn holds<T: PartialOrd>(&self, observed: T, threshold: T) -> bool {
        match self {
            Comparison::Lt => observed < threshold,
            Comparison::Le => observed <= threshold,
            Comparison::Eq => observed == threshold,
            Comparison::Ne => observed != threshold,
            Comparison::Ge => observed >= threshold,
            Comparison::Gt => observed > threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Threshold {
    Int(i64),
    Flag(bool),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Int(n) => write!(f, "{}", n),
            Threshold::Flag(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub key: AttributeKey,
    pub source: Source,
    pub comparison: Comparison,
    pub threshold: Threshold,
}

impl Rule {
    pub const fn smart(id: u8, source: Source, comparison: Comparison, threshold: i64) -> Self {
        Self {
            key: AttributeKey::Smart(id),
            source,
            comparison,
            threshold: Threshold::Int(threshold),
        }
    }

    pub const fn metric(metric: ControllerMetric, comparison: Comparison, threshold: Threshold) -> Self {
        Self {
            key: AttributeKey::Metric(metric),
            source: Source::Metric,
            comparison,
            threshold,
        }
    }

    /// Compare an observed metric. Integer thresholds compare the observed
    /// value as an integer (a flag counts as 0 or 1); flag thresholds only
    /// accept flags. `None` means the types cannot be compared.
    pub fn check_metric(&self, observed: MetricValue) -> Option<bool> {
        match (self.threshold, observed) {
            (Threshold::Int(limit), MetricValue::Count(n)) => Some(self.comparison.holds(n, limit)),
            (Threshold::Int(limit), MetricValue::Flag(b)) => {
                Some(self.comparison.holds(i64::from(b), limit))
            }
            (Threshold::Flag(expected), MetricValue::Flag(b)) => {
                Some(self.comparison.holds(b, expected))
            }
            (Threshold::Flag(_), MetricValue::Count(_)) => None,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Value => " value",
            Source::Raw => " raw",
            Source::Metric => "",
        };
        write!(
            f,
            "{}{} {} {}",
            self.key,
            source,
            self.comparison.symbol(),
            self.threshold
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileTable {
    pub profile: Profile,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySet {
    pub ssd: ProfileTable,
    pub sata: ProfileTable,
    pub sata_enterprise: ProfileTable,
    pub sas: ProfileTable,
    pub sata_cutover_hours: i64,
}

fn sata_rules(max_power_on_hours: i64) -> Vec<Rule> {
    use Comparison::*;
    use Source::*;
    vec![
        Rule::smart(1, Raw, Lt, 1),
        Rule::smart(POWER_ON_HOURS, Raw, Le, max_power_on_hours),
        Rule::smart(187, Raw, Lt, 1),
        Rule::smart(198, Raw, Lt, 1),
        Rule::smart(199, Raw, Lt, 1),
        Rule::smart(200, Raw, Lt, 1),
    ]
}

impl Default for PolicySet {
    fn default() -> Self {
        use Comparison::*;
        use ControllerMetric::*;

        Self {
            ssd: ProfileTable {
                profile: Profile::SSD,
                rules: vec![
                    Rule::smart(177, Source::Value, Ge, 19),
                    Rule::smart(199, Source::Raw, Lt, 1),
                ],
            },
            sata: ProfileTable {
                profile: Profile::SATA,
                rules: sata_rules(20_000),
            },
            sata_enterprise: ProfileTable {
                profile: Profile::SATAEnterprise,
                rules: sata_rules(30_000),
            },
            sas: ProfileTable {
                profile: Profile::SAS,
                rules: vec![
                    Rule::metric(MediaErrorCount, Lt, Threshold::Int(1)),
                    Rule::metric(PredictiveFailureCount, Lt, Threshold::Int(1)),
                    Rule::metric(SmartAlertFlagged, Eq, Threshold::Flag(false)),
                    Rule::metric(UncorrectableReadErrors, Lt, Threshold::Int(1)),
                    Rule::metric(UncorrectableWriteErrors, Lt, Threshold::Int(1)),
                    Rule::metric(UncorrectableVerifyErrors, Lt, Threshold::Int(1)),
                ],
            },
            sata_cutover_hours: SATA_ENTERPRISE_CUTOVER_HOURS,
        }
    }
}

impl PolicySet {
    /// Table for a profile, or `None` for profiles that are never graded.
    pub fn table(&self, profile: Profile) -> Option<&ProfileTable> {
        match profile {
            Profile::SSD => Some(&self.ssd),
            Profile::SATA => Some(&self.sata),
            Profile::SATAEnterprise => Some(&self.sata_enterprise),
            Profile::SAS => Some(&self.sas),
            Profile::RAID | Profile::Unclassified => None,
        }
    }

    /// Younger SATA drives get the plain table; drives at or past the cutover,
    /// or with no power-on hours reported, get the enterprise one.
    pub fn sata_table_for(&self, power_on_hours: Option<i64>) -> &ProfileTable {
        match power_on_hours {
            Some(hours) if hours < self.sata_cutover_hours => &self.sata,
            Some(_) => &self.sata_enterprise,
            None => &self.sata,
        }
    }
}
