use async_trait::async_trait;
use smoke_cluster::ClusterResources;
use smoke_poll::{FetchError, ResourceFetcher, ResourceObservation, ResourceQuery, StatePredicate};
use tracing::info;

use super::{observed, wait_until, wait_until_with};
use crate::config::Wait;
use crate::context::ScenarioContext;
use crate::error::StepError;

const READY_PATH: &str = "{.status.containerStatuses[*].ready}";
const ALL: &str = "*";

/// Build and deployer pods finish as `Succeeded` and never run.
pub fn is_helper_pod(name: &str) -> bool {
    name.ends_with("-build") || name.ends_with("-deploy")
}

/// Lists the pods whose name starts with `query.name` (every pod for `*`) on
/// each fetch. The state is the whole set as space-separated `name=phase`
/// pairs; no match is `NotFound`.
struct PodSet<'a> {
    resources: &'a dyn ClusterResources,
    include_helpers: bool,
}

#[async_trait]
impl ResourceFetcher for PodSet<'_> {
    async fn fetch(
        &self,
        query: &ResourceQuery,
    ) -> Result<ResourceObservation, FetchError> {
        let pods = self.resources.list(&query.kind, &query.namespace).await?;
        let set: Vec<_> = pods
            .iter()
            .filter(|p| query.name == ALL || p.name.starts_with(&query.name))
            .filter(|p| self.include_helpers || !is_helper_pod(&p.name))
            .map(|p| format!("{}={}", p.name, p.raw_state))
            .collect();
        if set.is_empty() {
            return Err(FetchError::NotFound(format!("no pods matching {query}")));
        }
        Ok(ResourceObservation::new(&query.name, set.join(" ")))
    }
}

fn pod_names(state: &str) -> Vec<String> {
    state
        .split_whitespace()
        .map(|pair| pair.split_once('=').map_or(pair, |(name, _)| name).to_string())
        .collect()
}

fn every_pod_running() -> StatePredicate {
    StatePredicate::new("every matching pod Running", |state: &str| {
        !state.trim().is_empty()
            && state
                .split_whitespace()
                .all(|pair| pair.split_once('=').is_some_and(|(_, phase)| phase == "Running"))
    })
}

/// Re-lists matching pods on every tick until `predicate` holds for the set
/// and returns the pod names seen last.
async fn wait_for_pod_set(
    ctx: &ScenarioContext,
    prefix: &str,
    include_helpers: bool,
    predicate: StatePredicate,
) -> Result<Vec<String>, StepError> {
    let query = ResourceQuery::new("pods", prefix, ctx.namespace()?);
    let lookup = PodSet {
        resources: ctx.resources(),
        include_helpers,
    };
    let result = wait_until_with(
        ctx,
        lookup,
        std::slice::from_ref(&query),
        Wait::Pod,
        predicate,
    )
    .await?;
    Ok(pod_names(&observed(&result, &query)))
}

async fn wait_for_running(
    ctx: &ScenarioContext,
    prefix: &str,
    include_helpers: bool,
) -> Result<Vec<String>, StepError> {
    let pods = wait_for_pod_set(ctx, prefix, include_helpers, every_pod_running()).await?;
    info!(namespace = %ctx.namespace()?, %prefix, ?pods, "pods running");
    Ok(pods)
}

/// Waits until every pod in the project is `Running`, helper pods included.
/// Meant for freshly created install projects.
pub async fn wait_for_all_pods_running(
    ctx: &ScenarioContext,
) -> Result<Vec<String>, StepError> {
    wait_for_running(ctx, ALL, true).await
}

/// Waits until the operator's own pods (names starting with `prefix`) are
/// `Running`, whatever else the project holds.
pub async fn wait_for_operator_running(
    ctx: &ScenarioContext,
    prefix: &str,
) -> Result<Vec<String>, StepError> {
    wait_for_running(ctx, prefix, false).await
}

/// Waits until at least one pod of application `app` exists and all of its
/// pods, except build and deployer pods, are `Running`.
pub async fn wait_for_app_pods_running(
    ctx: &ScenarioContext,
    app: &str,
) -> Result<Vec<String>, StepError> {
    wait_for_running(ctx, app, false).await
}

/// Finds the first pod whose name starts with `prefix`, waits until none of
/// its containers reports `ready == false` and remembers it in the context.
pub async fn wait_for_instance_pod(
    ctx: &mut ScenarioContext,
    prefix: &str,
) -> Result<String, StepError> {
    let pod = wait_for_pod_set(ctx, prefix, false, StatePredicate::non_empty())
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StepError::Assertion(format!("no pod starting with `{prefix}`")))?;
    let ready = ResourceQuery::new("pod", &pod, ctx.namespace()?).with_json_path(READY_PATH);
    wait_until(
        ctx,
        &[ready],
        Wait::Pod,
        StatePredicate::non_empty().and(StatePredicate::not_contains("false")),
    )
    .await?;
    info!(%pod, "instance pod ready");
    ctx.set_instance_pod(&pod);
    Ok(pod)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use smoke_poll::PollError;
    use tokio::time::Instant;

    use super::*;
    use crate::steps::testing::{FakeCluster, context};

    fn containers(ready: &[bool]) -> serde_json::Value {
        let statuses: Vec<_> = ready.iter().map(|r| json!({"ready": r})).collect();
        json!({"status": {"phase": "Running", "containerStatuses": statuses}})
    }

    #[test]
    fn helper_pods_are_recognised() {
        assert!(is_helper_pod("openshift-jee-sample-1-build"));
        assert!(is_helper_pod("nodejs-mongodb-example-1-deploy"));
        assert!(!is_helper_pod("nodejs-mongodb-example-1-x7k2p"));
        assert!(!is_helper_pod("builder-7d9c"));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn all_pods_wait_for_operator_to_appear() {
        let cluster = FakeCluster::new();
        cluster.phase_at(Duration::from_secs(2), "pod", "jenkins-operator-5c9", "Pending");
        cluster.phase_at(Duration::from_secs(4), "pod", "jenkins-operator-5c9", "Running");
        let ctx = context(cluster);

        let pods = wait_for_all_pods_running(&ctx).await.unwrap();
        assert_eq!(pods, vec!["jenkins-operator-5c9"]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn app_pods_ignore_completed_builds() {
        let cluster = FakeCluster::new();
        cluster.phase_at(Duration::ZERO, "pod", "web-1-build", "Succeeded");
        cluster.phase_at(Duration::ZERO, "pod", "web-1-deploy", "Succeeded");
        cluster.phase_at(Duration::ZERO, "pod", "web-1-abcde", "Running");
        let ctx = context(cluster);

        let pods = wait_for_app_pods_running(&ctx, "web-1").await.unwrap();
        assert_eq!(pods, vec!["web-1-abcde"]);
        assert!(wait_for_all_pods_running(&ctx).await.is_err());
    }

    #[test]
    fn pod_set_state_parsing() {
        let running = every_pod_running();
        assert!(running.test("a=Running b=Running"));
        assert!(!running.test("a=Running b=Pending"));
        assert!(!running.test(""));
        assert_eq!(pod_names("a=Running b=Pending"), vec!["a", "b"]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn app_pods_wait_for_the_application_to_appear() {
        let cluster = FakeCluster::new();
        cluster.phase_at(Duration::ZERO, "pod", "jenkins-operator-5c9", "Running");
        cluster.phase_at(Duration::ZERO, "pod", "jenkins-simple", "Running");
        cluster.phase_at(Duration::ZERO, "pod", "nodejs-mongodb-example-1-build", "Running");
        let app = "nodejs-mongodb-example-1-abcde";
        cluster.phase_at(Duration::from_secs(3), "pod", app, "Pending");
        cluster.phase_at(Duration::from_secs(5), "pod", app, "Running");
        let ctx = context(cluster);
        let started = Instant::now();

        let pods = wait_for_app_pods_running(&ctx, "nodejs-mongodb-example")
            .await
            .unwrap();
        assert_eq!(pods, vec![app]);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn late_second_replica_is_waited_for() {
        let cluster = FakeCluster::new();
        cluster.phase_at(Duration::ZERO, "pod", "web-1-aaaaa", "Running");
        cluster.phase_at(Duration::from_secs(2), "pod", "web-1-bbbbb", "Pending");
        cluster.phase_at(Duration::from_secs(4), "pod", "web-1-bbbbb", "Running");
        let ctx = context(cluster);

        let pods = wait_for_app_pods_running(&ctx, "web-1").await.unwrap();
        assert_eq!(pods, vec!["web-1-aaaaa"]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let started = Instant::now();
        let pods = wait_for_app_pods_running(&ctx, "web-1").await.unwrap();
        assert_eq!(pods, vec!["web-1-aaaaa", "web-1-bbbbb"]);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn operator_check_ignores_finished_builds() {
        let cluster = FakeCluster::new();
        cluster.phase_at(Duration::ZERO, "pod", "jenkins-operator-5c9", "Running");
        cluster.phase_at(Duration::ZERO, "pod", "nodejs-mongodb-example-1-build", "Succeeded");
        cluster.phase_at(Duration::ZERO, "pod", "nodejs-mongodb-example-1-deploy", "Succeeded");
        let ctx = context(cluster);

        let pods = wait_for_operator_running(&ctx, "jenkins-operator").await.unwrap();
        assert_eq!(pods, vec!["jenkins-operator-5c9"]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn operator_pod_that_never_runs_times_out() {
        let cluster = FakeCluster::new();
        cluster.phase_at(Duration::ZERO, "pod", "jenkins-operator-5c9", "CrashLoopBackOff");
        let ctx = context(cluster);

        let err = wait_for_operator_running(&ctx, "jenkins-operator")
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Poll(PollError::Timeout(_))));
        assert!(err.to_string().contains("jenkins-operator-5c9=CrashLoopBackOff"));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn instance_pod_is_remembered_once_ready() {
        let cluster = FakeCluster::new();
        cluster.put("pod", "jenkins-operator-5c9", containers(&[true]));
        cluster.put("pod", "jenkins-simple", containers(&[true, false]));
        cluster.put_at(
            Duration::from_secs(3),
            "pod",
            "jenkins-simple",
            containers(&[true, true]),
        );
        let mut ctx = context(cluster);

        let pod = wait_for_instance_pod(&mut ctx, "jenkins-simple").await.unwrap();
        assert_eq!(pod, "jenkins-simple");
        assert_eq!(ctx.instance_pod().unwrap(), "jenkins-simple");
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn missing_instance_pod_times_out() {
        let cluster = FakeCluster::new();
        cluster.put("pod", "jenkins-operator-5c9", containers(&[true]));
        let mut ctx = context(cluster);

        let err = wait_for_instance_pod(&mut ctx, "jenkins-simple")
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Poll(PollError::Timeout(_))));
        assert!(ctx.instance_pod().is_err());
    }
}
