use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::errors::{Error, Result};
use crate::store::{IsolationLevel, MenuId};
use crate::trial::{Scenario, TrialReport};

/// Which row each trial pair targets.
///
/// `Shared` sends every pair to one row, maximizing contention; `PerPair`
/// gives each pair its own row so trials only interfere with themselves.
#[derive(Debug, Clone)]
pub enum RowTargeting {
    Shared(MenuId),
    PerPair(Vec<MenuId>),
}

/// A batch request: which scenarios to drive, at what isolation, against
/// which rows, and how many concurrent pairs per scenario.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub scenarios: Vec<Scenario>,
    pub isolation: IsolationLevel,
    pub targeting: RowTargeting,
    pub pairs: usize,
}

impl BatchOptions {
    pub fn new(isolation: IsolationLevel, targeting: RowTargeting) -> Self {
        Self {
            scenarios: Scenario::ALL.to_vec(),
            isolation,
            targeting,
            pairs: 1,
        }
    }

    pub fn scenarios(mut self, scenarios: &[Scenario]) -> Self {
        self.scenarios = scenarios.to_vec();
        self
    }

    pub fn pairs(mut self, pairs: usize) -> Self {
        self.pairs = pairs;
        self
    }
}

/// What one trial response amounted to once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Finding {
    None,
    DirtyRead,
    NonRepeatableRead,
    LostUpdate,
    LockTimeout,
    OtherFailure,
}

/// One trial response, classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub success: bool,
    pub message: String,
    pub finding: Finding,
}

/// The two trials launched together as one pair; `group` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairOutcome {
    pub group: usize,
    pub t1: TrialRecord,
    pub t2: TrialRecord,
}

/// Counters folded over every trial in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatistics {
    pub total: u64,
    pub api_success: u64,
    pub api_failure: u64,
    pub dirty_reads: u64,
    pub non_repeatable_reads: u64,
    pub lost_updates: u64,
    pub lock_timeouts: u64,
}

impl BatchStatistics {
    fn record(&mut self, record: &TrialRecord) {
        self.total += 1;
        if record.success {
            self.api_success += 1;
        } else {
            self.api_failure += 1;
        }
        match record.finding {
            Finding::DirtyRead => self.dirty_reads += 1,
            Finding::NonRepeatableRead => self.non_repeatable_reads += 1,
            Finding::LostUpdate => self.lost_updates += 1,
            Finding::LockTimeout => self.lock_timeouts += 1,
            Finding::None | Finding::OtherFailure => {}
        }
    }
}

/// Everything one scenario's batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub scenario: Scenario,
    pub isolation: IsolationLevel,
    pub stats: BatchStatistics,
    pub pairs: Vec<PairOutcome>,
}

/// Drives batches of concurrent trial requests against a running server
/// and aggregates what came back.
pub struct Orchestrator {
    client: reqwest::Client,
    base_url: String,
}

impl Orchestrator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run every scenario in the options, one batch each, in order.
    pub async fn run(&self, options: &BatchOptions) -> Result<Vec<BatchReport>> {
        validate(options)?;
        let mut reports = Vec::with_capacity(options.scenarios.len());
        for &scenario in &options.scenarios {
            reports.push(self.run_scenario(scenario, options).await);
        }
        Ok(reports)
    }

    /// Launch `pairs * 2` requests at once and classify every response.
    ///
    /// A request that cannot even be sent still produces a failure record,
    /// so `stats.total` always equals the number launched.
    async fn run_scenario(&self, scenario: Scenario, options: &BatchOptions) -> BatchReport {
        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            %scenario,
            isolation = %options.isolation,
            pairs = options.pairs,
            "starting batch"
        );

        let mut handles = Vec::with_capacity(options.pairs * 2);
        for pair in 0..options.pairs {
            let menu_id = match &options.targeting {
                RowTargeting::Shared(id) => *id,
                RowTargeting::PerPair(ids) => ids[pair],
            };
            for _ in 0..2 {
                let url = format!(
                    "{}/api/test/concurrency/{}",
                    self.base_url,
                    scenario.path()
                );
                let request = self.client.get(&url).query(&[
                    ("menuId", menu_id.to_string()),
                    ("isolationLevel", options.isolation.to_string()),
                ]);
                handles.push(tokio::spawn(fetch_trial(request)));
            }
        }

        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(%batch_id, error = %err, "trial request task failed");
                    records.push(TrialRecord {
                        success: false,
                        message: "trial request task failed".to_string(),
                        finding: Finding::OtherFailure,
                    });
                }
            }
        }

        let mut stats = BatchStatistics::default();
        for record in &records {
            stats.record(record);
        }

        let mut pairs = Vec::with_capacity(options.pairs);
        let mut iter = records.into_iter();
        let mut group = 0;
        while let (Some(t1), Some(t2)) = (iter.next(), iter.next()) {
            group += 1;
            pairs.push(PairOutcome { group, t1, t2 });
        }

        info!(
            %batch_id,
            total = stats.total,
            failures = stats.api_failure,
            "batch finished"
        );
        BatchReport {
            batch_id,
            scenario,
            isolation: options.isolation,
            stats,
            pairs,
        }
    }
}

fn validate(options: &BatchOptions) -> Result<()> {
    if options.scenarios.is_empty() {
        return Err(Error::InvalidBatchOptions(
            "at least one scenario is required".to_string(),
        ));
    }
    if options.pairs == 0 {
        return Err(Error::InvalidBatchOptions(
            "at least one pair is required".to_string(),
        ));
    }
    if let RowTargeting::PerPair(ids) = &options.targeting {
        if ids.len() != options.pairs {
            return Err(Error::InvalidBatchOptions(format!(
                "per-pair targeting needs {} menu ids, got {}",
                options.pairs,
                ids.len()
            )));
        }
    }
    Ok(())
}

/// Send one trial request and turn whatever comes back into a record.
async fn fetch_trial(request: reqwest::RequestBuilder) -> TrialRecord {
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            let message = err.to_string();
            let finding = classify_error_text(&message);
            return TrialRecord {
                success: false,
                message,
                finding,
            };
        }
    };
    let body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(err) => {
            return TrialRecord {
                success: false,
                message: err.to_string(),
                finding: Finding::OtherFailure,
            }
        }
    };
    match serde_json::from_value::<TrialReport>(body.clone()) {
        Ok(report) => classify_report(&report),
        Err(_) => {
            let text = body
                .get("error")
                .and_then(|value| value.as_str())
                .unwrap_or("unrecognized response");
            TrialRecord {
                success: false,
                message: text.to_string(),
                finding: classify_error_text(text),
            }
        }
    }
}

fn classify_report(report: &TrialReport) -> TrialRecord {
    let finding = if report.success {
        match &report.results {
            Some(outcome) if outcome.anomaly_occurred() => match outcome.scenario() {
                Scenario::DirtyRead => Finding::DirtyRead,
                Scenario::NonRepeatableRead => Finding::NonRepeatableRead,
                Scenario::LostUpdate => Finding::LostUpdate,
            },
            _ => Finding::None,
        }
    } else {
        report
            .error
            .as_deref()
            .map(classify_error_text)
            .unwrap_or(Finding::OtherFailure)
    };
    TrialRecord {
        success: report.success,
        message: report.message.clone(),
        finding,
    }
}

/// Concurrency-control failures are counted apart from everything else;
/// both lock waits and serializable write conflicts land in that bucket.
fn classify_error_text(text: &str) -> Finding {
    let lower = text.to_lowercase();
    if lower.contains("lock wait timeout") || lower.contains("serialization failure") {
        Finding::LockTimeout
    } else {
        Finding::OtherFailure
    }
}
