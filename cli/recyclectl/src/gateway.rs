//! Control plane and scaling registry over the HTTP gateway.
//!
//! | Operation | Request |
//! |---|---|
//! | describe service | `GET /v1/clusters/{c}/services/{s}` |
//! | list tasks | `GET /v1/clusters/{c}/services/{s}/tasks?desired_status=RUNNING` |
//! | describe tasks | `POST /v1/clusters/{c}/tasks/describe` |
//! | stop task | `POST /v1/clusters/{c}/tasks/{t}/stop` |
//! | update desired | `PUT /v1/clusters/{c}/services/{s}/desired-count` |
//! | scalable target | `GET /v1/scalable-targets?resource_id=...` |

use async_trait::async_trait;
use recycle_core::{
    ControlPlane, ControlPlaneError, PlaneResult, ScalableTargetInfo, ScalingRegistry,
    ServiceState, TaskDescription,
};
use recycle_id::{ClusterName, ServiceName, TaskId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ApiClient;

#[derive(Debug, Deserialize)]
struct ListTasksResponse {
    task_ids: Vec<TaskId>,
}

#[derive(Debug, Serialize)]
struct DescribeTasksRequest<'a> {
    task_ids: &'a [TaskId],
}

#[derive(Debug, Deserialize)]
struct DescribeTasksResponse {
    tasks: Vec<TaskDescription>,
}

#[derive(Debug, Serialize)]
struct StopTaskRequest<'a> {
    reason: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateDesiredCountRequest {
    desired_count: u32,
}

/// Gateway-backed [`ControlPlane`] and [`ScalingRegistry`].
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: ApiClient,
}

impl HttpControlPlane {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn describe_service(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> PlaneResult<ServiceState> {
        let state: ServiceState = self
            .client
            .get(
                &["v1", "clusters", cluster.as_str(), "services", service.as_str()],
                &[],
            )
            .await?;
        debug!(service = %service, state = %state.summary(), "Described service");
        Ok(state)
    }

    async fn list_tasks(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
    ) -> PlaneResult<Vec<TaskId>> {
        let response: ListTasksResponse = self
            .client
            .get(
                &[
                    "v1",
                    "clusters",
                    cluster.as_str(),
                    "services",
                    service.as_str(),
                    "tasks",
                ],
                &[("desired_status", "RUNNING")],
            )
            .await?;
        Ok(response.task_ids)
    }

    async fn describe_tasks(
        &self,
        cluster: &ClusterName,
        task_ids: &[TaskId],
    ) -> PlaneResult<Vec<TaskDescription>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let response: DescribeTasksResponse = self
            .client
            .post(
                &["v1", "clusters", cluster.as_str(), "tasks", "describe"],
                &DescribeTasksRequest { task_ids },
            )
            .await?;
        Ok(response.tasks)
    }

    async fn stop_task(
        &self,
        cluster: &ClusterName,
        task_id: &TaskId,
        reason: &str,
    ) -> PlaneResult<()> {
        self.client
            .post_no_content(
                &[
                    "v1",
                    "clusters",
                    cluster.as_str(),
                    "tasks",
                    task_id.as_str(),
                    "stop",
                ],
                &StopTaskRequest { reason },
            )
            .await?;
        Ok(())
    }

    async fn update_desired_count(
        &self,
        cluster: &ClusterName,
        service: &ServiceName,
        desired_count: u32,
    ) -> PlaneResult<()> {
        self.client
            .put_no_content(
                &[
                    "v1",
                    "clusters",
                    cluster.as_str(),
                    "services",
                    service.as_str(),
                    "desired-count",
                ],
                &UpdateDesiredCountRequest { desired_count },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScalingRegistry for HttpControlPlane {
    async fn describe_scalable_target(
        &self,
        resource_id: &str,
    ) -> PlaneResult<Option<ScalableTargetInfo>> {
        let result: Result<ScalableTargetInfo, ControlPlaneError> = self
            .client
            .get(&["v1", "scalable-targets"], &[("resource_id", resource_id)])
            .await
            .map_err(ControlPlaneError::from);

        match result {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use recycle_core::{ServiceStatus, TaskLastStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Config;

    async fn plane(server: &MockServer) -> HttpControlPlane {
        let config = Config {
            api_url: server.uri(),
            ..Config::default()
        };
        HttpControlPlane::new(ApiClient::new(&config).unwrap())
    }

    fn cluster() -> ClusterName {
        ClusterName::parse("prod").unwrap()
    }

    fn service() -> ServiceName {
        ServiceName::parse("web").unwrap()
    }

    #[tokio::test]
    async fn test_describe_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/clusters/prod/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ACTIVE",
                "desired_count": 3,
                "running_count": 3,
                "pending_count": 0,
                "deployments": [
                    {"id": "ecs-svc/1", "status": "PRIMARY", "rollout_state": "COMPLETED"}
                ]
            })))
            .mount(&server)
            .await;

        let state = plane(&server)
            .await
            .describe_service(&cluster(), &service())
            .await
            .unwrap();

        assert_eq!(state.status, ServiceStatus::Active);
        assert_eq!(state.desired_count, 3);
        assert!(state.is_steady());
    }

    #[tokio::test]
    async fn test_missing_service_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "not_found",
                "message": "service web not found"
            })))
            .mount(&server)
            .await;

        let err = plane(&server)
            .await
            .describe_service(&cluster(), &service())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_tasks_filters_running() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/clusters/prod/services/web/tasks"))
            .and(query_param("desired_status", "RUNNING"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"task_ids": ["t1", "t2"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tasks = plane(&server)
            .await
            .list_tasks(&cluster(), &service())
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].as_str(), "t1");
    }

    #[tokio::test]
    async fn test_describe_tasks_tolerates_unknown_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/clusters/prod/tasks/describe"))
            .and(body_json(json!({"task_ids": ["t3"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tasks": [{"task_id": "t3", "last_status": "WARMING"}]
            })))
            .mount(&server)
            .await;

        let described = plane(&server)
            .await
            .describe_tasks(&cluster(), &[TaskId::parse("t3").unwrap()])
            .await
            .unwrap();
        assert_eq!(described[0].last_status, TaskLastStatus::Unknown);
    }

    #[tokio::test]
    async fn test_describe_no_tasks_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let described = plane(&server)
            .await
            .describe_tasks(&cluster(), &[])
            .await
            .unwrap();
        assert!(described.is_empty());
    }

    #[tokio::test]
    async fn test_stop_task_sends_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/clusters/prod/tasks/t1/stop"))
            .and(body_json(json!({"reason": "Task recycling process"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        plane(&server)
            .await
            .stop_task(
                &cluster(),
                &TaskId::parse("t1").unwrap(),
                recycle_core::STOP_REASON,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_desired_count_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/clusters/prod/services/web/desired-count"))
            .and(body_json(json!({"desired_count": 4})))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "conflict",
                "message": "update in progress"
            })))
            .mount(&server)
            .await;

        let err = plane(&server)
            .await
            .update_desired_count(&cluster(), &service(), 4)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ControlPlaneError::Conflict("update in progress".to_string())
        );
    }

    #[tokio::test]
    async fn test_scalable_target_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/scalable-targets"))
            .and(query_param("resource_id", "service/prod/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resource_id": "service/prod/web",
                "min_capacity": 2,
                "max_capacity": 6
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/scalable-targets"))
            .and(query_param("resource_id", "service/prod/api"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "not registered"
            })))
            .mount(&server)
            .await;

        let plane = plane(&server).await;
        let target = plane
            .describe_scalable_target("service/prod/web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.max_capacity, 6);

        let none = plane
            .describe_scalable_target("service/prod/api")
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "message": "throttled"
            })))
            .mount(&server)
            .await;

        let err = plane(&server)
            .await
            .describe_scalable_target("service/prod/web")
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::Api { status: 503, .. }));
    }
}
