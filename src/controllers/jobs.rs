use actix_web::{web, HttpResponse};
use tracing::{error, info_span, warn};
use validator::Validate;

use crate::{
    models::{ApiError, ApiResponse, CreateJobRequest, HealthResponse, JobAccepted},
    services::IngestService,
    workers::{QueueError, WorkerError},
};

#[actix_web::post("/jobs")]
async fn create_job(
    ingest: web::Data<IngestService>,
    request: web::Json<CreateJobRequest>,
) -> HttpResponse {
    let _span = info_span!("create-job-api", correlation_id = uuid::Uuid::new_v4().to_string()).entered();

    // Validate request
    if let Err(e) = request.validate() {
        warn!("Invalid job request: {}", e);
        return HttpResponse::UnprocessableEntity()
            .json(ApiResponse::<JobAccepted>::error(ApiError::invalid_request()));
    }

    match ingest.submit(&request.path, &request.scope) {
        Ok(job) => HttpResponse::Accepted().json(ApiResponse::ok(JobAccepted::from(&job))),
        Err(WorkerError::Validation(e)) => HttpResponse::UnprocessableEntity()
            .json(ApiResponse::<JobAccepted>::error(ApiError::from(&e))),
        Err(WorkerError::Queue(QueueError::Full { capacity })) => {
            warn!("Rejecting job, queue is at capacity {}", capacity);
            HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<JobAccepted>::error(ApiError::queue_full()))
        }
        Err(e) => {
            error!("Failed to accept job: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<JobAccepted>::error(ApiError::system_error()))
        }
    }
}

#[actix_web::get("/health")]
async fn health(ingest: web::Data<IngestService>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        stats: ingest.stats(),
    })
}

#[actix_web::get("/stats")]
async fn stats(ingest: web::Data<IngestService>) -> HttpResponse {
    HttpResponse::Ok().json(ingest.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::KeyBuilder;
    use crate::workers::{JobQueue, QueueStats};
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ingest(queue: Arc<JobQueue>) -> web::Data<IngestService> {
        web::Data::new(IngestService::new(
            queue,
            Arc::new(KeyBuilder::new(&Settings::default())),
        ))
    }

    #[actix_rt::test]
    async fn test_missing_path_is_rejected() {
        let queue = Arc::new(JobQueue::unbounded());
        let app = test::init_service(
            App::new()
                .app_data(ingest(queue.clone()))
                .service(create_job),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/jobs")
            .set_json(serde_json::json!({ "scope": "mba" }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = test::read_body(resp).await;
        let response: ApiResponse<JobAccepted> = serde_json::from_slice(&body).unwrap();
        assert!(!response.success);
        assert_eq!(response.errors.unwrap()[0].cause, "INVALID_REQUEST");
        assert_eq!(queue.stats().queued, 0);
    }

    #[actix_rt::test]
    async fn test_valid_job_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claims.pdf");
        std::fs::write(&path, "pdf").unwrap();

        let queue = Arc::new(JobQueue::unbounded());
        let app = test::init_service(
            App::new()
                .app_data(ingest(queue.clone()))
                .service(create_job),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/jobs")
            .set_json(serde_json::json!({ "path": path, "scope": "policy" }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body = test::read_body(resp).await;
        let response: ApiResponse<JobAccepted> = serde_json::from_slice(&body).unwrap();
        let accepted = response.data.unwrap();
        assert_eq!(accepted.key, "policy/pdf/claims.pdf");
        assert_eq!(accepted.destination, "s3://hma-policy-bucket/policy/pdf/claims.pdf");
        assert_eq!(queue.stats().queued, 1);
    }

    #[actix_rt::test]
    async fn test_unknown_scope_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claims.pdf");
        std::fs::write(&path, "pdf").unwrap();

        let queue = Arc::new(JobQueue::unbounded());
        let app = test::init_service(
            App::new()
                .app_data(ingest(queue.clone()))
                .service(create_job),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/jobs")
            .set_json(serde_json::json!({ "path": path, "scope": "claims" }))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = test::read_body(resp).await;
        let response: ApiResponse<JobAccepted> = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.errors.unwrap()[0].cause, "INVALID_SCOPE");
        assert_eq!(queue.stats().queued, 0);
    }

    #[actix_rt::test]
    async fn test_full_queue_returns_service_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claims.pdf");
        std::fs::write(&path, "pdf").unwrap();

        let queue = Arc::new(JobQueue::bounded(1));
        let app = test::init_service(
            App::new()
                .app_data(ingest(queue.clone()))
                .service(create_job),
        )
        .await;

        let mut statuses = Vec::new();
        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/jobs")
                .set_json(serde_json::json!({ "path": path, "scope": "mba" }))
                .to_request();
            statuses.push(test::call_service(&app, req).await.status());
        }

        assert_eq!(statuses, vec![StatusCode::ACCEPTED, StatusCode::SERVICE_UNAVAILABLE]);
        assert_eq!(queue.stats().queued, 1);
    }

    #[actix_rt::test]
    async fn test_health_and_stats_report_queue_counters() {
        let queue = Arc::new(JobQueue::unbounded());
        let app = test::init_service(
            App::new()
                .app_data(ingest(queue.clone()))
                .service(health)
                .service(stats),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let health_body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health_body.status, "ok");
        assert_eq!(health_body.stats, QueueStats::default());

        let req = test::TestRequest::get().uri("/stats").to_request();
        let stats_body: QueueStats = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats_body, QueueStats::default());
    }
}
