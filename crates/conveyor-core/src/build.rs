//! Build and job scheduling types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::{Params, Source, Version};

/// Status of a build. Transitions are monotonic: a build starts `Pending`,
/// may move to `Started`, and ends in one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Started,
    Aborted,
    Succeeded,
    Failed,
    Errored,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Aborted
                | BuildStatus::Succeeded
                | BuildStatus::Failed
                | BuildStatus::Errored
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Started => "started",
            BuildStatus::Aborted => "aborted",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Errored => "errored",
        }
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BuildStatus::Pending),
            "started" => Ok(BuildStatus::Started),
            "aborted" => Ok(BuildStatus::Aborted),
            "succeeded" => Ok(BuildStatus::Succeeded),
            "failed" => Ok(BuildStatus::Failed),
            "errored" => Ok(BuildStatus::Errored),
            other => Err(format!("unknown build status {other:?}")),
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build of a job.
///
/// Ids come from a database sequence, so ordering by id is FIFO admission
/// order within a serial group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    /// Per-job build number, rendered to operators.
    pub name: String,
    pub job_name: String,
    pub status: BuildStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A resource the job fetches before it runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    pub name: String,
    pub resource_type: String,
    pub source: Source,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-job scheduling configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub team_id: i64,
    /// Shorthand for a max-in-flight of one.
    #[serde(default)]
    pub serial: bool,
    /// Named buckets this job shares a parallelism budget with.
    #[serde(default)]
    pub serial_groups: Vec<String>,
    /// Explicit parallelism cap; zero means unconstrained unless `serial`
    /// or `serial_groups` say otherwise.
    #[serde(default)]
    pub max_in_flight: usize,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

impl JobConfig {
    /// Effective parallelism cap. Zero means unlimited.
    pub fn effective_max_in_flight(&self) -> usize {
        if self.max_in_flight > 0 {
            self.max_in_flight
        } else if self.serial || !self.serial_groups.is_empty() {
            1
        } else {
            0
        }
    }

    /// Serial groups this job belongs to. A job with no explicit groups
    /// forms a group of its own.
    pub fn effective_serial_groups(&self) -> Vec<String> {
        if self.serial_groups.is_empty() {
            vec![self.name.clone()]
        } else {
            self.serial_groups.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_job_has_no_cap() {
        let job = JobConfig {
            name: "unit".to_string(),
            ..JobConfig::default()
        };
        assert_eq!(job.effective_max_in_flight(), 0);
        assert_eq!(job.effective_serial_groups(), vec!["unit".to_string()]);
    }

    #[test]
    fn serial_implies_cap_of_one() {
        let job = JobConfig {
            name: "unit".to_string(),
            serial: true,
            ..JobConfig::default()
        };
        assert_eq!(job.effective_max_in_flight(), 1);
    }

    #[test]
    fn serial_groups_imply_cap_of_one() {
        let job = JobConfig {
            name: "unit".to_string(),
            serial_groups: vec!["deploys".to_string()],
            ..JobConfig::default()
        };
        assert_eq!(job.effective_max_in_flight(), 1);
        assert_eq!(job.effective_serial_groups(), vec!["deploys".to_string()]);
    }

    #[test]
    fn explicit_cap_wins() {
        let job = JobConfig {
            name: "unit".to_string(),
            serial: true,
            max_in_flight: 3,
            ..JobConfig::default()
        };
        assert_eq!(job.effective_max_in_flight(), 3);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            BuildStatus::Pending,
            BuildStatus::Started,
            BuildStatus::Aborted,
            BuildStatus::Succeeded,
            BuildStatus::Failed,
            BuildStatus::Errored,
        ] {
            assert_eq!(status.as_str().parse::<BuildStatus>(), Ok(status));
        }
        assert!("bogus".parse::<BuildStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!BuildStatus::Pending.is_terminal());
        assert!(!BuildStatus::Started.is_terminal());
        assert!(BuildStatus::Aborted.is_terminal());
        assert!(BuildStatus::Succeeded.is_terminal());
        assert!(BuildStatus::Failed.is_terminal());
        assert!(BuildStatus::Errored.is_terminal());
    }
}
