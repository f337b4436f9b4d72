//! Task status report for a job.

use convoy_core::{ScheduledTask, TaskQuery};

use crate::api::SchedulerApi;
use crate::error::ClientResult;
use crate::validate::checked;

pub struct TaskStatusReporter<'a> {
    client: &'a dyn SchedulerApi,
}

impl<'a> TaskStatusReporter<'a> {
    pub fn new(client: &'a dyn SchedulerApi) -> Self {
        Self { client }
    }

    /// Query the tasks of `role/job` and render them, active tasks first.
    pub fn report(&self, role: &str, job_name: &str) -> ClientResult<String> {
        let resp = checked(self.client.get_tasks_status(&TaskQuery::job(role, job_name))?)?;
        Ok(render(&resp.tasks))
    }
}

/// Render `tasks` as an "Active Tasks" block then an "Inactive Tasks"
/// block, each in the order the scheduler returned them. Both headers
/// are printed, even when one block is empty.
pub fn render(tasks: &[ScheduledTask]) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }

    let (active, inactive): (Vec<&ScheduledTask>, Vec<&ScheduledTask>) =
        tasks.iter().partition(|t| t.status.is_active());

    let mut out = String::new();
    render_block(&mut out, "Active Tasks", &active);
    render_block(&mut out, "Inactive Tasks", &inactive);
    out
}

fn render_block(out: &mut String, title: &str, tasks: &[&ScheduledTask]) {
    out.push_str(&format!("{title} ({})\n", tasks.len()));
    for task in tasks {
        render_task(out, task);
    }
}

fn render_task(out: &mut String, task: &ScheduledTask) {
    let config = &task.task;
    out.push_str(&format!(
        "  shard: {}, status: {} on {}\n",
        task.shard_id,
        task.status.name(),
        task.host.as_deref().unwrap_or("(unassigned)")
    ));
    out.push_str(&format!(
        "    artifact: {}\n",
        config.artifact_path.as_deref().unwrap_or("(none)")
    ));
    out.push_str(&format!(
        "    cpus: {}, ram: {} MB, disk: {} MB\n",
        config.num_cpus, config.ram_mb, config.disk_mb
    ));
    if !task.assigned_ports.is_empty() {
        let ports: Vec<String> = task
            .assigned_ports
            .iter()
            .map(|(name, port)| format!("{name}={port}"))
            .collect();
        out.push_str(&format!("    ports: {}\n", ports.join(", ")));
    }
    out.push_str(&format!(
        "    failure count: {} (max {})\n",
        task.failure_count, config.max_task_failures
    ));
}
