use crate::registry::{Classified, JobSnapshot};

/// Fewest rows a job is given: its header and one log line.
pub const MIN_LINES_PER_JOB: usize = 2;

/// How a row is painted; the render engine maps these to colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    FailedHeader,
    ActiveHeader,
    Log,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub y: usize,
    pub text: String,
    pub tone: Tone,
}

/// Where one job landed in the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub key: String,
    pub header_row: usize,
    /// Log rows the job was allotted, including any remainder row.
    pub budget: usize,
    /// Log rows actually filled; fewer than `budget` when the job has little output.
    pub shown: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: usize,
    pub height: usize,
    pub lines_per_job: usize,
    pub remainder: usize,
    pub placements: Vec<Placement>,
    /// Job rows top to bottom. Rows past the screen are kept; the renderer clips them.
    pub rows: Vec<Row>,
    pub summary: Row,
}

/// `"F/T failed, S/T completed, A/T building"` for the current buckets.
pub fn summary_line(jobs: &Classified) -> String {
    let total = jobs.total();
    format!(
        "{}/{total} failed, {}/{total} completed, {}/{total} building",
        jobs.failed.len(),
        jobs.succeeded.len(),
        jobs.active.len(),
    )
}

pub fn header_line(job: &JobSnapshot, failed: bool) -> String {
    let status = if failed {
        "[failed]"
    } else if job.pushing {
        "[building/pushing]"
    } else {
        "[building]"
    };
    format!("{status} {}", job.label)
}

/// Splits a `width` x `height` screen between failed and building jobs.
///
/// Returns `None` when no job is failed or building; succeeded jobs only show up
/// in the summary and an all-succeeded registry draws nothing at all.
pub fn compute(width: usize, height: usize, jobs: &Classified) -> Option<FrameLayout> {
    let shown_jobs = jobs.visible();
    if shown_jobs == 0 {
        return None;
    }

    let available = height.saturating_sub(1);
    let lines_per_job = (available / shown_jobs).max(MIN_LINES_PER_JOB);
    let remainder = available.saturating_sub(lines_per_job * shown_jobs);

    let mut layout = FrameLayout {
        width,
        height,
        lines_per_job,
        remainder,
        placements: Vec::new(),
        rows: Vec::new(),
        summary: Row {
            y: available,
            text: summary_line(jobs),
            tone: Tone::Summary,
        },
    };

    let ordered = jobs
        .failed
        .iter()
        .map(|j| (j, true))
        .chain(jobs.active.iter().map(|j| (j, false)));

    let mut row = 0usize;
    let mut spare = remainder;
    for (job, failed) in ordered {
        if row + 1 >= height.saturating_sub(2) {
            break;
        }
        let header_row = row;
        layout.rows.push(Row {
            y: row,
            text: header_line(job, failed),
            tone: if failed {
                Tone::FailedHeader
            } else {
                Tone::ActiveHeader
            },
        });
        row += 1;

        let mut budget = lines_per_job - 1;
        if spare > 0 {
            budget += 1;
            spare -= 1;
        }
        let tail = job.tail(budget);
        for line in tail {
            layout.rows.push(Row {
                y: row,
                text: line.clone(),
                tone: Tone::Log,
            });
            row += 1;
        }
        layout.placements.push(Placement {
            key: job.key.clone(),
            header_row,
            budget,
            shown: tail.len(),
        });
    }

    Some(layout)
}
