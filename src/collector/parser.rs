//! Parser for `squeue` job listings.
//!
//! These are pure functions that turn the raw output of
//! `squeue -h -o "%A|%u|%T|%C|%b|%D"` into per-user job counters. Malformed
//! input never fails: bad numbers read as zero and unknown states are ignored.

use std::collections::HashMap;

/// Field separator used in the `squeue` output format.
pub const FIELD_DELIMITER: char = '|';

/// Separator between segments of a gres specification (`gpu:tesla:2`).
const GRES_DELIMITER: char = ':';

/// Index of the per-node GPU count within a gres specification.
const GRES_GPU_INDEX: usize = 2;

/// State class of a job, as far as the exporter is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Suspended,
}

/// Lower-case state prefixes, checked in order.
const STATE_PREFIXES: [(&str, JobState); 3] = [
    ("pending", JobState::Pending),
    ("running", JobState::Running),
    ("suspended", JobState::Suspended),
];

impl JobState {
    /// Classifies a raw scheduler state by case-insensitive prefix.
    ///
    /// Returns `None` for states the exporter does not count
    /// (`COMPLETED`, `CANCELLED`, `FAILED`, ...).
    pub fn classify(raw: &str) -> Option<Self> {
        let state = raw.to_lowercase();
        STATE_PREFIXES
            .iter()
            .find(|(prefix, _)| state.starts_with(*prefix))
            .map(|&(_, class)| class)
    }
}

/// One line of `squeue` output.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord<'a> {
    pub user: &'a str,
    pub state: &'a str,
    pub cpus: f64,
    pub gres: &'a str,
    pub nodes: f64,
}

impl<'a> JobRecord<'a> {
    /// Parses a single `jobid|user|state|cpus|gres|nodes` line.
    ///
    /// Returns `None` if the line carries no field delimiter at all.
    /// Missing trailing fields read as empty.
    pub fn parse(line: &'a str) -> Option<Self> {
        if !line.contains(FIELD_DELIMITER) {
            return None;
        }

        let mut fields = line.split(FIELD_DELIMITER).skip(1);
        let mut next = || fields.next().unwrap_or("");

        let user = next();
        let state = next();
        let cpus = parse_or_zero(next());
        let gres = next();
        let nodes = parse_or_zero(next());

        Some(Self {
            user,
            state,
            cpus,
            gres,
            nodes,
        })
    }

    /// GPUs held by this job across all of its nodes.
    pub fn gpus(&self) -> f64 {
        gpus_per_node(self.gres) * self.nodes
    }
}

/// Per-user job counters for a single snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserJobMetrics {
    pub pending: f64,
    pub running: f64,
    pub running_cpus: f64,
    pub suspended: f64,
    pub running_gpus: f64,
}

impl UserJobMetrics {
    /// Adds one job to the bucket matching its state.
    pub fn record(&mut self, job: &JobRecord<'_>) {
        match JobState::classify(job.state) {
            Some(JobState::Pending) => self.pending += 1.0,
            Some(JobState::Running) => {
                self.running += 1.0;
                self.running_cpus += job.cpus;
                self.running_gpus += job.gpus();
            }
            Some(JobState::Suspended) => self.suspended += 1.0,
            None => {}
        }
    }
}

/// Parses a numeric field, falling back to zero.
///
/// Empty, unparseable, negative and non-finite values all read as `0.0` so
/// that every counter stays non-negative. Padded values (`" 4 "`) are
/// unparseable.
pub fn parse_or_zero(s: &str) -> f64 {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

/// Extracts the per-node GPU count from a gres specification.
///
/// A single-segment spec (`N/A`, `(null)`) means no GPUs. Otherwise the third
/// colon-separated segment is the count, so `gpu:tesla:2` yields 2.
pub fn gpus_per_node(gres: &str) -> f64 {
    let segments: Vec<&str> = gres.split(GRES_DELIMITER).collect();
    if segments.len() < 2 {
        return 0.0;
    }
    segments
        .get(GRES_GPU_INDEX)
        .map(|count| parse_or_zero(count))
        .unwrap_or(0.0)
}

/// Aggregates a raw `squeue` snapshot into per-user counters.
///
/// Every user that appears on a delimited line gets an entry, even when none
/// of their jobs is in a counted state.
pub fn parse_snapshot(raw: &[u8]) -> HashMap<String, UserJobMetrics> {
    let text = String::from_utf8_lossy(raw);
    let mut users: HashMap<String, UserJobMetrics> = HashMap::new();

    for job in text.lines().filter_map(JobRecord::parse) {
        users.entry(job.user.to_string()).or_default().record(&job);
    }

    users
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefix_and_case() {
        assert_eq!(JobState::classify("PENDING"), Some(JobState::Pending));
        assert_eq!(JobState::classify("pending_other"), Some(JobState::Pending));
        assert_eq!(JobState::classify("Running"), Some(JobState::Running));
        assert_eq!(JobState::classify("SUSPENDED"), Some(JobState::Suspended));
        assert_eq!(JobState::classify("COMPLETED"), None);
        assert_eq!(JobState::classify("CANCELLED"), None);
        assert_eq!(JobState::classify(""), None);
        // prefix match only, not substring
        assert_eq!(JobState::classify("not_running"), None);
    }

    #[test]
    fn test_parse_or_zero() {
        assert_eq!(parse_or_zero("8"), 8.0);
        assert_eq!(parse_or_zero("2.5"), 2.5);
        assert_eq!(parse_or_zero(" 4 "), 0.0);
        assert_eq!(parse_or_zero("4\r"), 0.0);
        assert_eq!(parse_or_zero(""), 0.0);
        assert_eq!(parse_or_zero("N/A"), 0.0);
        assert_eq!(parse_or_zero("-3"), 0.0);
        assert_eq!(parse_or_zero("NaN"), 0.0);
        assert_eq!(parse_or_zero("inf"), 0.0);
    }

    #[test]
    fn test_gpus_per_node() {
        assert_eq!(gpus_per_node("gpu:tesla:2"), 2.0);
        assert_eq!(gpus_per_node("gres/gpu:a100:4"), 4.0);
        assert_eq!(gpus_per_node("N/A"), 0.0);
        assert_eq!(gpus_per_node(""), 0.0);
        // no third segment
        assert_eq!(gpus_per_node("gpu:2"), 0.0);
        assert_eq!(gpus_per_node("gpu:tesla:2(IDX:0-1)"), 0.0);
        assert_eq!(gpus_per_node("gpu:tesla:x"), 0.0);
    }

    #[test]
    fn test_job_record_parse() {
        let job = JobRecord::parse("123|alice|RUNNING|8|gpu:v100:1|2").unwrap();
        assert_eq!(job.user, "alice");
        assert_eq!(job.state, "RUNNING");
        assert_eq!(job.cpus, 8.0);
        assert_eq!(job.gres, "gpu:v100:1");
        assert_eq!(job.nodes, 2.0);
        assert_eq!(job.gpus(), 2.0);

        assert!(JobRecord::parse("").is_none());
        assert!(JobRecord::parse("no delimiter here").is_none());
    }

    #[test]
    fn test_job_record_short_line() {
        let job = JobRecord::parse("42|bob").unwrap();
        assert_eq!(job.user, "bob");
        assert_eq!(job.state, "");
        assert_eq!(job.cpus, 0.0);
        assert_eq!(job.nodes, 0.0);
    }

    #[test]
    fn test_end_to_end_example() {
        let users = parse_snapshot(b"123|alice|RUNNING|8|gpu:v100:1|2\n");
        assert_eq!(users.len(), 1);
        assert_eq!(
            users["alice"],
            UserJobMetrics {
                running: 1.0,
                running_cpus: 8.0,
                running_gpus: 2.0,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_pending_only_touches_pending() {
        let users = parse_snapshot(b"1|carol|PeNdInG|16|gpu:k80:4|4\n");
        assert_eq!(
            users["carol"],
            UserJobMetrics {
                pending: 1.0,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_running_gpus_multiplied_by_nodes() {
        let users = parse_snapshot(b"7|dave|running|4|gpu:tesla:2|3\n");
        let m = users["dave"];
        assert_eq!(m.running, 1.0);
        assert_eq!(m.running_cpus, 4.0);
        assert_eq!(m.running_gpus, 6.0);
    }

    #[test]
    fn test_empty_cpus_is_zero() {
        let users = parse_snapshot(b"8|erin|RUNNING||N/A|1\n");
        let m = users["erin"];
        assert_eq!(m.running, 1.0);
        assert_eq!(m.running_cpus, 0.0);
        assert_eq!(m.running_gpus, 0.0);
    }

    #[test]
    fn test_completed_user_has_zero_entry() {
        let users = parse_snapshot(b"9|frank|COMPLETED|4|N/A|1\n");
        assert_eq!(users["frank"], UserJobMetrics::default());
    }

    #[test]
    fn test_mixed_states_are_additive() {
        let raw = "\
10|gina|PENDING|2|N/A|1
11|gina|RUNNING|4|gpu:a100:1|1
12|gina|RUNNING|2|N/A|1
13|gina|SUSPENDED|1|N/A|1
14|hank|PENDING|1|N/A|1
15|gina|FAILED|64|gpu:a100:8|8
";
        let users = parse_snapshot(raw.as_bytes());
        assert_eq!(users.len(), 2);
        assert_eq!(
            users["gina"],
            UserJobMetrics {
                pending: 1.0,
                running: 2.0,
                running_cpus: 6.0,
                suspended: 1.0,
                running_gpus: 1.0,
            }
        );
        assert_eq!(users["hank"].pending, 1.0);
    }

    #[test]
    fn test_blank_and_garbage_lines_skipped() {
        let raw = b"\n\n1|ivan|RUNNING|1|N/A|1\r\nsqueue: warning\n\n";
        let users = parse_snapshot(raw);
        assert_eq!(users.len(), 1);
        assert_eq!(users["ivan"].running, 1.0);
        assert_eq!(users["ivan"].running_cpus, 1.0);
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(parse_snapshot(b"").is_empty());
    }

    #[test]
    fn test_counters_never_negative() {
        let raw = "\
1|judy|RUNNING|-8|gpu:x:-2|3
2|judy|RUNNING|4|gpu:x:2|-1
3|judy|RUNNING|nan|gpu:x:inf|1
";
        let m = parse_snapshot(raw.as_bytes())["judy"];
        assert_eq!(m.running, 3.0);
        assert_eq!(m.running_cpus, 4.0);
        assert_eq!(m.running_gpus, 0.0);
    }
}
