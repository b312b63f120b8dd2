use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use score_learning::{PipelineTelemetry, PredictPipeline};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::ServingConfig,
    form::PredictForm,
    pages::{error_page, form_page, index_page},
};

/// Shared, read-only request state.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<ServingConfig>,
    telemetry: PipelineTelemetry,
}

impl AppState {
    /// State over `config`, logging through `telemetry`.
    #[must_use]
    pub fn new(config: ServingConfig, telemetry: PipelineTelemetry) -> Self {
        Self {
            config: Arc::new(config),
            telemetry,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ServingConfig {
        &self.config
    }
}

/// Routes of the prediction site.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/predictdata", get(blank_form).post(predict))
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(index_page())
}

async fn blank_form() -> Html<String> {
    Html(form_page(&PredictForm::default(), None, None))
}

async fn predict(State(state): State<AppState>, Form(form): Form<PredictForm>) -> Response {
    let record = match form.to_record(state.config.swap_score_fields) {
        Ok(record) => record,
        Err(err) => {
            state.telemetry.note(
                LogLevel::Warn,
                "serving.invalid_form",
                json!({ "error": err.to_string() }),
            );
            return (
                StatusCode::BAD_REQUEST,
                Html(form_page(&form, None, Some(&err.to_string()))),
            )
                .into_response();
        }
    };

    let pipeline =
        PredictPipeline::new(&state.config.artifacts).with_telemetry(state.telemetry.clone());
    let outcome = tokio::task::spawn_blocking(move || pipeline.predict(&record)).await;
    match outcome {
        Ok(Ok(value)) => {
            state.telemetry.note(
                LogLevel::Info,
                "serving.predicted",
                json!({ "prediction": value }),
            );
            Html(form_page(&form, Some(value), None)).into_response()
        }
        Ok(Err(err)) => {
            state.telemetry.note(
                LogLevel::Error,
                "serving.prediction_failed",
                json!({ "stage": err.stage().as_str(), "error": err.report() }),
            );
            failure()
        }
        Err(join) => {
            state.telemetry.note(
                LogLevel::Error,
                "serving.prediction_panicked",
                json!({ "error": join.to_string() }),
            );
            failure()
        }
    }
}

fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(error_page(
            "The model could not produce a prediction right now. Please try again later.",
        )),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use score_learning::{ModelCatalog, PipelineConfig, Table, TrainingPipeline};
    use std::path::Path;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    fn train_artifacts(root: &Path) -> ServingConfig {
        let groups = ["group A", "group B", "group C", "group D", "group E"];
        let mut table = Table::new(
            [
                "gender",
                "race_ethnicity",
                "parental_level_of_education",
                "lunch",
                "test_preparation_course",
                "math_score",
                "reading_score",
                "writing_score",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        );
        for idx in 0..60_usize {
            let reading = 40.0 + ((idx * 37) % 60) as f64;
            let writing = reading + ((idx * 7) % 9) as f64 - 4.0;
            let standard = idx % 3 != 0;
            let math = 0.6 * reading + 0.3 * writing + if standard { 5.0 } else { 0.0 };
            table
                .push_row(vec![
                    if idx % 2 == 0 { "female" } else { "male" }.into(),
                    groups[idx % groups.len()].into(),
                    if idx % 4 < 2 { "high school" } else { "some college" }.into(),
                    if standard { "standard" } else { "free/reduced" }.into(),
                    if idx % 5 == 0 { "completed" } else { "none" }.into(),
                    math.to_string(),
                    reading.to_string(),
                    writing.to_string(),
                ])
                .unwrap();
        }
        let source = root.join("stud.csv");
        table.write_csv(&source).unwrap();
        let pipeline_config = PipelineConfig {
            source_data_path: source,
            artifacts: score_learning::ArtifactStore::under(root.join("artifacts")),
            ..PipelineConfig::default()
        };
        TrainingPipeline::new(pipeline_config.clone(), PipelineTelemetry::disabled())
            .with_catalog(ModelCatalog::standard().only(&["Linear Regression"]))
            .run()
            .unwrap();
        ServingConfig {
            artifacts: pipeline_config.artifacts,
            ..ServingConfig::default()
        }
    }

    fn app(config: ServingConfig) -> Router {
        router(AppState::new(config, PipelineTelemetry::disabled()))
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predictdata")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const VALID: &str = "gender=female&ethnicity=group+B&parental_level_of_education=high+school&lunch=standard&test_preparation_course=none&reading_score=72&writing_score=70";

    #[tokio::test]
    async fn landing_and_blank_form_render() {
        let app = app(ServingConfig::default());
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text(response).await.contains("/predictdata"));

        let response = app
            .oneshot(Request::builder().uri("/predictdata").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = text(response).await;
        assert!(page.contains("<form"));
        assert!(!page.contains("The prediction is"));
    }

    #[tokio::test]
    async fn valid_submission_renders_a_prediction() {
        let dir = tempdir().unwrap();
        let config = train_artifacts(dir.path());
        let response = app(config).oneshot(post(VALID)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text(response).await.contains("The prediction is"));
    }

    #[tokio::test]
    async fn unparseable_score_is_a_bad_request() {
        let body = VALID.replace("reading_score=72", "reading_score=abc");
        let response = app(ServingConfig::default()).oneshot(post(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let page = text(response).await;
        assert!(page.contains("reading_score"));
        assert!(page.contains("<form"));
    }

    #[tokio::test]
    async fn missing_artifacts_give_a_server_error_page() {
        let dir = tempdir().unwrap();
        let config = ServingConfig {
            artifacts: score_learning::ArtifactStore::under(dir.path().join("absent")),
            ..ServingConfig::default()
        };
        let response = app(config).oneshot(post(VALID)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let page = text(response).await;
        assert!(page.contains("Prediction unavailable"));
        assert!(!page.contains("absent"));
    }
}
