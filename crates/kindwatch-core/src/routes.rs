use serde::{Deserialize, Serialize};

use kindwatch_types::OperationKind;

/// Backend endpoint templates. `{name}` and `{task_id}` are substituted
/// (percent-encoded) at call time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendRoutes {
    pub create: String,
    pub delete: String,
    pub update_limits: String,
    pub task_status: String,
    pub cluster_status: String,
    pub cluster_list: String,
    pub cluster_nodes: String,
    pub cluster_details: String,
    pub cluster_health: String,
    pub health: String,
}

impl Default for BackendRoutes {
    fn default() -> Self {
        Self {
            create: "/api/cluster/create".to_string(),
            delete: "/api/cluster/delete".to_string(),
            update_limits: "/api/cluster/{name}/set-resource-limits".to_string(),
            task_status: "/api/tasks/{task_id}".to_string(),
            cluster_status: "/api/cluster/status".to_string(),
            cluster_list: "/api/clusters/list".to_string(),
            cluster_nodes: "/api/cluster/{name}/nodes".to_string(),
            cluster_details: "/api/cluster/{name}/details".to_string(),
            cluster_health: "/api/cluster/{name}/health".to_string(),
            health: "/health".to_string(),
        }
    }
}

impl BackendRoutes {
    pub fn submit_path(&self, kind: OperationKind, name: &str) -> String {
        let template = match kind {
            OperationKind::Create => &self.create,
            OperationKind::Delete => &self.delete,
            OperationKind::UpdateLimits => &self.update_limits,
        };
        fill(template, "{name}", name)
    }

    pub fn task_status_path(&self, task_id: &str) -> String {
        fill(&self.task_status, "{task_id}", task_id)
    }

    pub fn cluster_nodes_path(&self, name: &str) -> String {
        fill(&self.cluster_nodes, "{name}", name)
    }

    pub fn cluster_details_path(&self, name: &str) -> String {
        fill(&self.cluster_details, "{name}", name)
    }

    pub fn cluster_health_path(&self, name: &str) -> String {
        fill(&self.cluster_health, "{name}", name)
    }
}

fn fill(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(placeholder, &encode_segment(value))
}

fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_paths_follow_operation_kind() {
        let routes = BackendRoutes::default();
        assert_eq!(
            routes.submit_path(OperationKind::Create, "demo"),
            "/api/cluster/create"
        );
        assert_eq!(
            routes.submit_path(OperationKind::UpdateLimits, "demo"),
            "/api/cluster/demo/set-resource-limits"
        );
    }

    #[test]
    fn path_segments_are_encoded() {
        let routes = BackendRoutes::default();
        assert_eq!(routes.task_status_path("a b/c"), "/api/tasks/a%20b%2Fc");
    }
}
