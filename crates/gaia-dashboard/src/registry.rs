use std::collections::BTreeMap;

use crate::log_sanitize::clean_log_line;
use crate::ring::LogRing;

pub const DEFAULT_LOG_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Building,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Building)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    key: String,
    label: String,
    status: JobStatus,
    pushing: bool,
    recent: LogRing,
}

impl Job {
    fn new(key: &str, label: &str, log_lines: usize) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            status: JobStatus::Building,
            pushing: false,
            recent: LogRing::new(log_lines),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn pushing(&self) -> bool {
        self.pushing
    }

    pub fn recent(&self) -> &LogRing {
        &self.recent
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            key: self.key.clone(),
            label: self.label.clone(),
            status: self.status,
            pushing: self.pushing,
            lines: self.recent.peek(self.recent.len()),
        }
    }
}

/// Outcome of feeding one line into a job's ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Stored,
    /// Nothing left after cleaning and trimming.
    Blank,
    UnknownJob,
}

/// Outcome of a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The job already finished; its status was left as it was.
    Rejected(JobStatus),
    UnknownJob,
}

/// Copy of a job taken under the dashboard lock, safe to lay out after release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub key: String,
    pub label: String,
    pub status: JobStatus,
    pub pushing: bool,
    pub lines: Vec<String>,
}

impl JobSnapshot {
    /// Up to `k` of the newest lines, oldest first.
    pub fn tail(&self, k: usize) -> &[String] {
        let skip = self.lines.len().saturating_sub(k);
        &self.lines[skip..]
    }
}

/// Jobs split into render buckets, each sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub failed: Vec<JobSnapshot>,
    pub active: Vec<JobSnapshot>,
    pub succeeded: Vec<JobSnapshot>,
}

impl Classified {
    pub fn total(&self) -> usize {
        self.failed.len() + self.active.len() + self.succeeded.len()
    }

    /// Jobs that get rows on screen.
    pub fn visible(&self) -> usize {
        self.failed.len() + self.active.len()
    }
}

#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Job>,
    log_lines: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LINES)
    }
}

impl JobRegistry {
    pub fn new(log_lines: usize) -> Self {
        Self {
            jobs: BTreeMap::new(),
            log_lines,
        }
    }

    /// Registers `key`, replacing any previous job under the same key.
    pub fn start(&mut self, key: &str, label: &str) -> bool {
        self.jobs
            .insert(key.to_string(), Job::new(key, label, self.log_lines))
            .is_some()
    }

    pub fn append_log(&mut self, key: &str, line: &str) -> Ingest {
        let Some(job) = self.jobs.get_mut(key) else {
            return Ingest::UnknownJob;
        };
        let line = clean_log_line(line);
        if line.is_empty() {
            return Ingest::Blank;
        }
        job.recent.push(line);
        Ingest::Stored
    }

    pub fn mark_pushing(&mut self, key: &str) -> bool {
        match self.jobs.get_mut(key) {
            Some(job) => {
                job.pushing = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_succeeded(&mut self, key: &str) -> Transition {
        self.finish(key, JobStatus::Succeeded, None)
    }

    /// Records `"Error! <message>"` in the job's log, then marks it failed.
    pub fn mark_failed(&mut self, key: &str, message: &str) -> Transition {
        self.finish(key, JobStatus::Failed, Some(message))
    }

    fn finish(&mut self, key: &str, status: JobStatus, message: Option<&str>) -> Transition {
        let Some(job) = self.jobs.get(key) else {
            return Transition::UnknownJob;
        };
        if job.status.is_terminal() {
            return Transition::Rejected(job.status);
        }
        if let Some(message) = message {
            self.append_log(key, &format!("Error! {message}"));
        }
        if let Some(job) = self.jobs.get_mut(key) {
            job.status = status;
        }
        Transition::Applied
    }

    pub fn get(&self, key: &str) -> Option<&Job> {
        self.jobs.get(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn classify(&self) -> Classified {
        let mut out = Classified::default();
        for job in self.jobs.values() {
            let bucket = match job.status {
                JobStatus::Failed => &mut out.failed,
                JobStatus::Building => &mut out.active,
                JobStatus::Succeeded => &mut out.succeeded,
            };
            bucket.push(job.snapshot());
        }
        // The map already iterates by key; sorting keeps the contract independent of it.
        for bucket in [&mut out.failed, &mut out.active, &mut out.succeeded] {
            bucket.sort_by(|a, b| a.key.cmp(&b.key));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(jobs: &[(&str, JobStatus)]) -> JobRegistry {
        let mut reg = JobRegistry::default();
        for (key, status) in jobs {
            reg.start(key, &format!("img/{key}"));
            match status {
                JobStatus::Building => {}
                JobStatus::Succeeded => {
                    reg.mark_succeeded(key);
                }
                JobStatus::Failed => {
                    reg.mark_failed(key, "boom");
                }
            }
        }
        reg
    }

    #[test]
    fn start_creates_building_job_with_empty_ring() {
        let mut reg = JobRegistry::default();
        assert!(!reg.start("api", "registry/api:1"));
        let job = reg.get("api").unwrap();
        assert_eq!(job.status(), JobStatus::Building);
        assert!(!job.pushing());
        assert!(job.recent().is_empty());
        assert_eq!(job.label(), "registry/api:1");
    }

    #[test]
    fn restart_replaces_existing_job() {
        let mut reg = JobRegistry::default();
        reg.start("api", "old");
        reg.append_log("api", "line");
        reg.mark_failed("api", "boom");
        assert!(reg.start("api", "new"));
        let job = reg.get("api").unwrap();
        assert_eq!(job.label(), "new");
        assert_eq!(job.status(), JobStatus::Building);
        assert!(job.recent().is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn append_log_trims_and_skips_blank_lines() {
        let mut reg = JobRegistry::default();
        reg.start("api", "api");
        assert_eq!(reg.append_log("api", "  step 1  \n"), Ingest::Stored);
        assert_eq!(reg.append_log("api", "   "), Ingest::Blank);
        assert_eq!(reg.append_log("nope", "x"), Ingest::UnknownJob);
        assert_eq!(reg.get("api").unwrap().recent().peek(5), vec!["step 1"]);
    }

    #[test]
    fn ring_capacity_follows_registry_setting() {
        let mut reg = JobRegistry::new(3);
        reg.start("api", "api");
        for i in 0..10 {
            reg.append_log("api", &format!("l{i}"));
        }
        assert_eq!(reg.get("api").unwrap().recent().peek(10), vec!["l7", "l8", "l9"]);
    }

    #[test]
    fn mark_failed_records_error_line() {
        let mut reg = JobRegistry::default();
        reg.start("api", "api");
        reg.append_log("api", "compiling");
        assert_eq!(reg.mark_failed("api", "exit status 2"), Transition::Applied);
        let job = reg.get("api").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.recent().peek(2), vec!["compiling", "Error! exit status 2"]);
    }

    #[test]
    fn unknown_keys_are_ignored_by_status_calls() {
        let mut reg = JobRegistry::default();
        assert!(!reg.mark_pushing("ghost"));
        assert_eq!(reg.mark_succeeded("ghost"), Transition::UnknownJob);
        assert_eq!(reg.mark_failed("ghost", "x"), Transition::UnknownJob);
        assert!(reg.is_empty());
    }

    #[test]
    fn second_terminal_transition_is_rejected() {
        let mut reg = registry(&[("api", JobStatus::Failed), ("web", JobStatus::Succeeded)]);
        assert_eq!(
            reg.mark_succeeded("api"),
            Transition::Rejected(JobStatus::Failed)
        );
        assert_eq!(
            reg.mark_failed("web", "late"),
            Transition::Rejected(JobStatus::Succeeded)
        );
        assert_eq!(reg.get("api").unwrap().status(), JobStatus::Failed);
        let web = reg.get("web").unwrap();
        assert_eq!(web.status(), JobStatus::Succeeded);
        assert!(web.recent().is_empty());
    }

    #[test]
    fn pushing_is_sticky() {
        let mut reg = JobRegistry::default();
        reg.start("api", "api");
        assert!(reg.mark_pushing("api"));
        reg.mark_pushing("api");
        assert!(reg.get("api").unwrap().pushing());
    }

    #[test]
    fn classify_partitions_and_sorts_by_key() {
        let reg = registry(&[
            ("zeta", JobStatus::Building),
            ("beta", JobStatus::Failed),
            ("alpha", JobStatus::Building),
            ("omega", JobStatus::Succeeded),
            ("delta", JobStatus::Failed),
        ]);
        let c = reg.classify();
        assert_eq!(c.total(), reg.len());
        assert_eq!(c.visible(), 4);
        let keys = |v: &[JobSnapshot]| v.iter().map(|j| j.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&c.failed), vec!["beta", "delta"]);
        assert_eq!(keys(&c.active), vec!["alpha", "zeta"]);
        assert_eq!(keys(&c.succeeded), vec!["omega"]);
    }

    #[test]
    fn snapshot_tail_returns_newest_lines() {
        let mut reg = JobRegistry::default();
        reg.start("api", "api");
        for i in 1..=4 {
            reg.append_log("api", &format!("L{i}"));
        }
        let c = reg.classify();
        assert_eq!(c.active[0].tail(2), ["L3", "L4"]);
        assert_eq!(c.active[0].tail(9).len(), 4);
    }
}
