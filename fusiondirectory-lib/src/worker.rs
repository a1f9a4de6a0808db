use std::future::Future;

/// Identifies the worker a FusionDirectory session belongs to.
/// Every worker logs in on its own and keeps its own session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        WorkerId(id.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(id: String) -> Self {
        WorkerId(id)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

tokio::task_local! {
    static CURRENT_WORKER: WorkerId;
}

/// The worker we are running as: the one set by [scope] if any, the current thread otherwise.
pub fn current() -> WorkerId {
    CURRENT_WORKER
        .try_with(|worker| worker.clone())
        .unwrap_or_else(|_| WorkerId(format!("{:?}", std::thread::current().id())))
}

/// Run a future as the given worker, so all requests it makes share one session.
/// Sessions keep a token per worker id, use a fixed set of ids rather than a new one per task.
pub async fn scope<F: Future>(worker: impl Into<WorkerId>, future: F) -> F::Output {
    CURRENT_WORKER.scope(worker.into(), future).await
}
