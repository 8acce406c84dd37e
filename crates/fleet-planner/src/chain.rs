use serde::Serialize;

use crate::server::ServerConfig;

/// One job descriptor handed to the external execution backend. The
/// planner only describes work; submission, scheduling and retries live
/// on the other side of this record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedTask {
    pub task_id: String,
    pub name: String,
    pub command: String,
    pub server_address: Option<String>,
    pub server: Option<ServerConfig>,
    pub with_sandbox: bool,
    pub sandbox_port: Option<u16>,
    /// Task ids within this plan that must terminate (successfully or
    /// not) before this task may start.
    pub depends_on: Vec<String>,
    /// Experiment names that must complete before this plan starts.
    pub run_after: Vec<String>,
    pub log_dir: String,
    pub container: String,
    pub partition: Option<String>,
    pub time_min: Option<String>,
    pub exclusive: bool,
}

/// Expand one task into `dependent_jobs + 1` chained copies, each link
/// starting only after its predecessor terminates, successfully or not.
/// `initial_deps` (e.g. a shared preprocess task) gate the first link
/// only.
pub fn chain_dependent_tasks(
    base: PlannedTask,
    dependent_jobs: usize,
    initial_deps: &[String],
) -> Vec<PlannedTask> {
    let mut tasks: Vec<PlannedTask> = Vec::with_capacity(dependent_jobs + 1);
    for link in 0..=dependent_jobs {
        let mut task = base.clone();
        if link == 0 {
            task.depends_on = initial_deps.to_vec();
        } else {
            task.task_id = format!("{}@{}", base.task_id, link);
            task.depends_on = vec![tasks[link - 1].task_id.clone()];
        }
        tasks.push(task);
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task() -> PlannedTask {
        PlannedTask {
            task_id: "eval-rs0".to_string(),
            name: "eval-rs0".to_string(),
            command: "python -m fleet.inference.generate".to_string(),
            server_address: None,
            server: None,
            with_sandbox: false,
            sandbox_port: None,
            depends_on: Vec::new(),
            run_after: Vec::new(),
            log_dir: "/results/logs".to_string(),
            container: "fleet".to_string(),
            partition: None,
            time_min: None,
            exclusive: true,
        }
    }

    #[test]
    fn zero_dependent_jobs_yields_a_single_task() {
        let tasks = chain_dependent_tasks(base_task(), 0, &[]);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].depends_on.is_empty());
    }

    #[test]
    fn links_depend_on_their_predecessor() {
        let tasks = chain_dependent_tasks(base_task(), 2, &[]);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].task_id, "eval-rs0");
        assert_eq!(tasks[1].task_id, "eval-rs0@1");
        assert_eq!(tasks[2].task_id, "eval-rs0@2");
        assert!(tasks[0].depends_on.is_empty());
        assert_eq!(tasks[1].depends_on, vec!["eval-rs0".to_string()]);
        assert_eq!(tasks[2].depends_on, vec!["eval-rs0@1".to_string()]);
        // Every link re-runs the identical pipeline.
        assert!(tasks.iter().all(|t| t.command == tasks[0].command));
    }

    #[test]
    fn preprocess_gates_only_the_first_link() {
        let deps = vec!["preprocess_genselect".to_string()];
        let tasks = chain_dependent_tasks(base_task(), 1, &deps);
        assert_eq!(tasks[0].depends_on, deps);
        assert_eq!(tasks[1].depends_on, vec!["eval-rs0".to_string()]);
    }
}
