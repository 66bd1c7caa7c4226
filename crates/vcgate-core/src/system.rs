use std::{fs, path::Path, sync::OnceLock, time::Instant};

static WORKER_ID: OnceLock<String> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Pin the worker start time. Call once at boot.
pub fn init_uptime() {
    START_TIME.get_or_init(Instant::now);
}

/// Worker uptime in seconds.
pub fn uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

/// Stable identifier of this worker for the lifetime of the process.
///
/// Pod name under Kubernetes, container id under Docker, random otherwise.
pub fn worker_id() -> &'static str {
    WORKER_ID.get_or_init(|| {
        if let Ok(id) = std::env::var("VCGATE_WORKER_ID")
            && !id.trim().is_empty()
        {
            return id.trim().to_string();
        }
        if is_kubernetes()
            && let Ok(hostname) = hostname::get()
            && let Some(name) = hostname.to_str()
        {
            return name.to_string();
        }
        if let Some(container_id) = container_id() {
            return container_id;
        }
        uuid::Uuid::new_v4().to_string()
    })
}

fn is_kubernetes() -> bool {
    std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
        || Path::new("/var/run/secrets/kubernetes.io/serviceaccount").exists()
}

fn container_id() -> Option<String> {
    let cgroup = fs::read_to_string("/proc/self/cgroup").ok()?;
    container_id_from_cgroup(&cgroup)
}

/// Scope prefixes container runtimes give the cgroup of a container.
const RUNTIME_SCOPES: &[&str] = &["docker-", "cri-containerd-", "crio-", "libpod-"];

/// Container id from `/proc/self/cgroup` (`hierarchy:controllers:path` lines).
fn container_id_from_cgroup(cgroup: &str) -> Option<String> {
    cgroup
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2))
        .find_map(container_id_in_path)
}

fn container_id_in_path(path: &str) -> Option<String> {
    let mut parent = "";
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let candidate = RUNTIME_SCOPES
            .iter()
            .find_map(|prefix| segment.strip_prefix(prefix))
            .map(|rest| rest.trim_end_matches(".scope"))
            .or((parent == "docker").then_some(segment));
        if let Some(id) = candidate.filter(|id| looks_like_container_id(id)) {
            return Some(id.to_string());
        }
        parent = segment;
    }
    None
}

/// Runtimes use long lowercase hex ids; short ids are accepted down to 12 chars.
fn looks_like_container_id(id: &str) -> bool {
    id.len() >= 12 && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_is_stable() {
        let a = worker_id();
        let b = worker_id();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    const ID: &str = "4f2a9c1e0b7d6a5f3e2c1b0a9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e";

    #[test]
    fn reads_runtime_scopes() {
        for scope in ["docker", "cri-containerd", "crio"] {
            let cgroup = format!("0::/system.slice/{scope}-{ID}.scope\n");
            assert_eq!(container_id_from_cgroup(&cgroup).as_deref(), Some(ID), "{scope}");
        }
    }

    #[test]
    fn reads_cgroup_v1_docker_path() {
        let cgroup = format!("13:pids:/\n12:memory:/docker/{ID}\n");
        assert_eq!(container_id_from_cgroup(&cgroup).as_deref(), Some(ID));
    }

    #[test]
    fn ignores_non_container_scopes() {
        assert!(container_id_from_cgroup("0::/user.slice/session-1.scope\n").is_none());
        assert!(container_id_from_cgroup("0::/system.slice/docker-compose.scope\n").is_none());
        assert!(container_id_from_cgroup("garbage without separators").is_none());
    }
}
