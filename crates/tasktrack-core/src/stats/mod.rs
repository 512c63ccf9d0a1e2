//! Statistics module for tasktrack
//!
//! Derived, read-only figures: project analytics (progress, efficiency,
//! timeline, health score) and per-task/per-project time statistics.

mod analytics;
mod time_stats;

pub use analytics::{
    completion_percentage, health_score, project_analytics, time_efficiency, timeline_status,
    HealthInputs, PriorityDistribution, ProjectAnalytics, TaskCounts, TimeSummary, Timeline,
    TimelineStatus,
};

pub use time_stats::{ProjectTimeStatistics, TaskTimeStatistics};

/// `90` → `1h 30m`, `45` → `45m`.
pub fn format_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}
