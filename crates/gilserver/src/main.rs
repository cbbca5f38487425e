use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use gilcore::{FlowError, PortValues, Value, WorkflowConfig};
use gilruntime::{GilRuntime, NodeRegistry, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<GilRuntime>,
}

/// A workflow sent either as a JSON document or as YAML text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkflowSource {
    Yaml(String),
    Document(WorkflowConfig),
}

impl WorkflowSource {
    fn into_config(self) -> Result<WorkflowConfig, FlowError> {
        match self {
            WorkflowSource::Yaml(text) => WorkflowConfig::from_yaml(&text),
            WorkflowSource::Document(config) => Ok(config),
        }
    }
}

/// Request body for workflow execution
#[derive(Debug, Deserialize)]
struct RunRequest {
    workflow: WorkflowSource,
    #[serde(default)]
    inputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    workflow: WorkflowSource,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(e: &FlowError) -> HttpResponse {
    let body = ErrorResponse {
        error: e.to_string(),
    };
    match e {
        FlowError::Workflow(_) | FlowError::Yaml(_) | FlowError::Serialization(_) => {
            HttpResponse::BadRequest().json(body)
        }
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "gil"
    }))
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> impl Responder {
    let nodes: Vec<_> = data
        .runtime
        .list_nodes()
        .iter()
        .filter_map(|node_type| data.runtime.describe_node(node_type).ok())
        .map(|d| {
            serde_json::json!({
                "type": d.node_type,
                "description": d.description,
                "category": d.category,
            })
        })
        .collect();

    HttpResponse::Ok().json(nodes)
}

/// Ports and description of one node type
#[get("/api/nodes/{node_type}")]
async fn describe_node_type(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let node_type = path.into_inner();
    match data.runtime.describe_node(&node_type) {
        Ok(description) => HttpResponse::Ok().json(description),
        Err(e) => HttpResponse::NotFound().json(ErrorResponse {
            error: e.to_string(),
        }),
    }
}

#[post("/api/workflows/validate")]
async fn validate_workflow(
    data: web::Data<AppState>,
    req: web::Json<ValidateRequest>,
) -> impl Responder {
    match req.into_inner().workflow.into_config() {
        Ok(workflow) => HttpResponse::Ok().json(data.runtime.validate(&workflow)),
        Err(e) => error_response(&e),
    }
}

/// Execute a workflow
#[post("/api/workflows/run")]
async fn run_workflow(data: web::Data<AppState>, req: web::Json<RunRequest>) -> impl Responder {
    let RunRequest { workflow, inputs } = req.into_inner();
    let workflow = match workflow.into_config() {
        Ok(workflow) => workflow,
        Err(e) => return error_response(&e),
    };
    let inputs: PortValues = inputs.into_iter().map(|(k, v)| (k, Value::from(v))).collect();

    info!(workflow = %workflow.name, "Executing workflow");

    let result = data
        .runtime
        .execute(&workflow, inputs)
        .await
        .and_then(|result| result.to_json());

    match result {
        Ok(json) => HttpResponse::Ok().json(json),
        Err(e) => {
            error!(workflow = %workflow.name, error = %e, "Workflow execution failed");
            error_response(&e)
        }
    }
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_node_types)
        .service(describe_node_type)
        .service(validate_workflow)
        .service(run_workflow);
}

fn build_runtime() -> GilRuntime {
    let mut registry = NodeRegistry::new();
    gilnodes::register_all(&mut registry);
    GilRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Gil workflow server");

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(build_runtime()),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use serde_json::json;

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState {
            runtime: Arc::new(build_runtime()),
        })
    }

    #[actix_web::test]
    async fn run_returns_result_shape() {
        let app = test::init_service(App::new().app_data(state()).configure(routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/workflows/run")
            .set_json(json!({
                "workflow": {
                    "name": "greeting",
                    "nodes": {
                        "greet": {"type": "LogMessage", "config": {"prefix": "hi"}},
                        "store": {"type": "SetVariable", "config": {"variable_name": "v"}}
                    },
                    "flow": ["greet", "store"]
                },
                "inputs": {"greet": {"input": "x"}, "store": {"value": "y"}}
            }))
            .to_request();

        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["node_outputs"], json!({"greet": {"output": "x"}, "store": {}}));
        assert_eq!(body["context"]["variables"], json!({"v": "y"}));
    }

    #[actix_web::test]
    async fn yaml_workflow_is_validated() {
        let app = test::init_service(App::new().app_data(state()).configure(routes)).await;
        let yaml = "name: loop\nnodes:\n  a: {type: LogMessage}\n  b: {type: LogMessage}\nflow:\n  - {node: a, depends_on: [b]}\n  - {node: b, depends_on: [a]}\n";
        let req = test::TestRequest::post()
            .uri("/api/workflows/validate")
            .set_json(json!({"workflow": yaml}))
            .to_request();

        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], json!(false));
        assert!(body["errors"][0].as_str().unwrap().contains("Cyclic"));
    }

    #[actix_web::test]
    async fn unknown_node_type_is_not_found() {
        let app = test::init_service(App::new().app_data(state()).configure(routes)).await;
        let req = test::TestRequest::get().uri("/api/nodes/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/nodes/control.branch").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], json!("control.branch"));
        assert_eq!(body["input_ports"][0]["name"], json!("condition"));
    }

    #[actix_web::test]
    async fn construction_failure_is_bad_request() {
        let app = test::init_service(App::new().app_data(state()).configure(routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/workflows/run")
            .set_json(json!({
                "workflow": {"nodes": {"s": {"type": "SetVariable"}}, "flow": ["s"]}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
