//! 指标名称。通过 `metrics` 门面上报，未安装导出器时为空操作。

pub const JOBS_DISPATCHED: &str = "jobrelay_jobs_dispatched_total";
pub const JOBS_RESOLVED: &str = "jobrelay_jobs_resolved_total";
pub const JOBS_REJECTED: &str = "jobrelay_jobs_rejected_total";
pub const LATE_RESPONSES: &str = "jobrelay_late_responses_total";
pub const JOBS_IN_FLIGHT: &str = "jobrelay_jobs_in_flight";
