//! Built-in project templates.

use serde::Serialize;

use crate::task::{NewTask, TaskPriority};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TemplateTask {
    pub title: &'static str,
    /// Minutes.
    pub estimated_duration: i64,
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProjectTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub tasks: &'static [TemplateTask],
}

const fn t(title: &'static str, estimated_duration: i64, priority: TaskPriority) -> TemplateTask {
    TemplateTask {
        title,
        estimated_duration,
        priority,
    }
}

use crate::task::TaskPriority::{High, Low, Medium, Urgent};

pub const TEMPLATES: &[ProjectTemplate] = &[
    ProjectTemplate {
        key: "software_development",
        name: "Software Development Project",
        tasks: &[
            t("Requirements Analysis", 480, High),
            t("System Design", 720, High),
            t("Database Design", 360, Medium),
            t("Frontend Development", 1440, High),
            t("Backend Development", 1440, High),
            t("API Integration", 480, Medium),
            t("Testing", 720, High),
            t("Deployment", 240, Medium),
            t("Documentation", 360, Low),
        ],
    },
    ProjectTemplate {
        key: "marketing_campaign",
        name: "Marketing Campaign",
        tasks: &[
            t("Market Research", 480, High),
            t("Target Audience Analysis", 240, High),
            t("Content Strategy", 360, High),
            t("Creative Development", 720, Medium),
            t("Campaign Setup", 240, Medium),
            t("Launch Campaign", 120, High),
            t("Monitor Performance", 480, Medium),
            t("Optimize Campaign", 360, Medium),
            t("Final Report", 240, Low),
        ],
    },
    ProjectTemplate {
        key: "product_launch",
        name: "Product Launch",
        tasks: &[
            t("Product Planning", 720, Urgent),
            t("Competitive Analysis", 360, High),
            t("Feature Development", 1440, Urgent),
            t("Quality Assurance", 480, High),
            t("Marketing Materials", 480, Medium),
            t("Pre-launch Testing", 240, High),
            t("Launch Preparation", 360, High),
            t("Product Launch", 120, Urgent),
            t("Post-launch Review", 240, Medium),
        ],
    },
];

pub fn find(key: &str) -> Option<&'static ProjectTemplate> {
    TEMPLATES.iter().find(|tpl| tpl.key == key)
}

impl ProjectTemplate {
    /// Task inputs for a project created from this template.
    pub fn new_tasks(&self, project_id: &str) -> Vec<NewTask> {
        self.tasks
            .iter()
            .map(|task| NewTask {
                project_id: Some(project_id.to_string()),
                estimated_duration: Some(task.estimated_duration),
                priority: task.priority,
                ..NewTask::titled(task.title)
            })
            .collect()
    }
}
