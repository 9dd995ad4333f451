use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::core::{
    AccumulationInputs, AccumulationParams, CompoundingMethod, ProjectionError,
    SimulationOverrides, SolveTarget, SolvedValue, WithdrawalResult, simulate,
    simulate_duration, simulate_required_initial, simulate_withdrawal, solve_with_projection,
};

pub const DEFAULT_PORT: u16 = 10_000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Origins allowed by CORS; empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccumulationPayload {
    /// Percent, e.g. 7 for 7%.
    #[serde(deserialize_with = "lenient_number")]
    year_return: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    monthly_reserve: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    initial_investment: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    reserve_periods: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    increment: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    incre_period: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    target_amount: Option<f64>,
    method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WithdrawalPayload {
    #[serde(deserialize_with = "lenient_number")]
    initial_balance: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    monthly_withdrawal: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    years: Option<f64>,
    /// Percent, e.g. 4 for 4%.
    #[serde(deserialize_with = "lenient_number")]
    year_return: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PresentQuery {
    target: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

// Browser forms post numbers as strings.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(v)) => Ok(Some(v)),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got '{s}'"))),
    }
}

fn accumulation_params(
    payload: &AccumulationPayload,
    default_periods: i64,
) -> Result<AccumulationParams, ProjectionError> {
    let method = match payload.method.as_deref() {
        Some(m) => m.parse::<CompoundingMethod>()?,
        None => CompoundingMethod::Geometric,
    };
    AccumulationParams::new(AccumulationInputs {
        annual_return: payload.year_return.unwrap_or(0.0) / 100.0,
        horizon_years: payload
            .reserve_periods
            .map(|v| v.trunc() as i64)
            .unwrap_or(default_periods),
        monthly_contribution: payload.monthly_reserve.unwrap_or(0.0),
        initial_balance: payload.initial_investment.unwrap_or(0.0),
        method,
        annual_increment: payload.increment.unwrap_or(0.0),
        increment_years: payload.incre_period.map(|v| v.trunc() as i64).unwrap_or(0),
    })
}

pub fn router(config: &ServerConfig) -> Result<Router, ServerError> {
    Ok(Router::new()
        .route("/api/test", get(test_handler))
        .route("/api/final_balance", post(final_balance_handler))
        .route("/api/present_data", post(present_data_handler))
        .route("/api/withdrawal/duration", post(withdrawal_duration_handler))
        .route("/api/withdrawal/amount", post(withdrawal_amount_handler))
        .route("/api/withdrawal/initial", post(withdrawal_initial_handler))
        .fallback(not_found_handler)
        .layer(cors_layer(&config.allowed_origins)?))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, ServerError> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).map_err(|_| ServerError::InvalidOrigin(o.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(parsed)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

pub async fn run_http_server(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.socket_addr();
    let app = router(&config)?;

    let listener = TcpListener::bind(addr).await?;
    info!("compound HTTP API listening on http://{addr}");
    if config.allowed_origins.is_empty() {
        info!("CORS: any origin");
    } else {
        info!("CORS: {}", config.allowed_origins.join(", "));
    }

    axum::serve(listener, app).await?;
    Ok(())
}

async fn test_handler() -> Response {
    json_response(StatusCode::OK, json!({ "message": "Test successful!" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn final_balance_handler(
    body: Result<Json<AccumulationPayload>, JsonRejection>,
) -> Response {
    let payload = match request_body("final_balance", body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    let result = accumulation_params(&payload, 0)
        .and_then(|params| simulate(&params, SimulationOverrides::default()));
    match result {
        Ok(result) => json_response(StatusCode::OK, json!({ "result": result })),
        Err(e) => rejected("final_balance", &e),
    }
}

async fn present_data_handler(
    query: Result<Query<PresentQuery>, QueryRejection>,
    body: Result<Json<AccumulationPayload>, JsonRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            warn!("present_data: rejected query: {rejection}");
            return error_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };
    let payload = match request_body("present_data", body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    let Some(raw_target) = query.target else {
        return error_response(StatusCode::BAD_REQUEST, "missing `target` query parameter");
    };
    let result = raw_target.parse::<SolveTarget>().and_then(|target| {
        let params = accumulation_params(&payload, 1)?;
        solve_with_projection(
            &params,
            target,
            payload.target_amount.unwrap_or(0.0),
            None,
        )
    });
    match result {
        Ok(outcome) => json_response(
            StatusCode::OK,
            json!({
                "chart_data": outcome.projection,
                "back_to_present": back_to_present(outcome.solved),
            }),
        ),
        Err(e) => rejected("present_data", &e),
    }
}

fn back_to_present(solved: SolvedValue) -> Value {
    match solved {
        SolvedValue::Amount(amount) => json!(amount),
        // Presented as a percentage with two decimals.
        SolvedValue::Rate(annual) => json!((annual * 10_000.0).round_ties_even() / 100.0),
        SolvedValue::Horizon(years) => json!(years),
    }
}

async fn withdrawal_duration_handler(
    body: Result<Json<WithdrawalPayload>, JsonRejection>,
) -> Response {
    let payload = match request_body("withdrawal/duration", body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    withdrawal_response(
        "withdrawal/duration",
        simulate_duration(
            payload.initial_balance.unwrap_or(0.0),
            payload.monthly_withdrawal.unwrap_or(0.0),
            payload.year_return.unwrap_or(0.0) / 100.0,
        ),
    )
}

async fn withdrawal_amount_handler(
    body: Result<Json<WithdrawalPayload>, JsonRejection>,
) -> Response {
    let payload = match request_body("withdrawal/amount", body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    withdrawal_response(
        "withdrawal/amount",
        simulate_withdrawal(
            payload.initial_balance.unwrap_or(0.0),
            payload.years.unwrap_or(0.0),
            payload.year_return.unwrap_or(0.0) / 100.0,
        ),
    )
}

async fn withdrawal_initial_handler(
    body: Result<Json<WithdrawalPayload>, JsonRejection>,
) -> Response {
    let payload = match request_body("withdrawal/initial", body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    withdrawal_response(
        "withdrawal/initial",
        simulate_required_initial(
            payload.monthly_withdrawal.unwrap_or(0.0),
            payload.years.unwrap_or(0.0),
            payload.year_return.unwrap_or(0.0) / 100.0,
        ),
    )
}

fn withdrawal_response(
    route: &str,
    result: Result<WithdrawalResult, ProjectionError>,
) -> Response {
    match result {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(e) => rejected(route, &e),
    }
}

// Malformed bodies get the same 400 JSON shape as validation errors.
fn request_body<T>(route: &str, body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(payload)| payload).map_err(|rejection| {
        warn!("{route}: rejected request body: {rejection}");
        error_response(StatusCode::BAD_REQUEST, &rejection.body_text())
    })
}

fn rejected(route: &str, err: &ProjectionError) -> Response {
    warn!("{route}: rejected request: {err}");
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(&ServerConfig::default()).expect("router builds")
    }

    async fn call(method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        let response = app().oneshot(request).await.expect("infallible");
        let status = response.status();
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).expect("json body");
        (status, json)
    }

    #[test]
    fn payload_accepts_numeric_strings_and_percent_rates() {
        let payload: AccumulationPayload = serde_json::from_str(
            r#"{"year_return": "7", "monthly_reserve": 500, "reserve_periods": "20",
                "initial_investment": "", "incre_period": 3.9}"#,
        )
        .expect("payload parses");
        let params = accumulation_params(&payload, 1).expect("valid params");
        assert!((params.annual_return() - 0.07).abs() < 1e-12);
        assert_eq!(params.horizon_years(), 20);
        assert_eq!(params.initial_balance(), 0.0);
        assert_eq!(params.increment_years(), 3);
        assert_eq!(params.method(), CompoundingMethod::Geometric);
    }

    #[test]
    fn payload_rejects_non_numeric_text() {
        let err = serde_json::from_str::<AccumulationPayload>(r#"{"year_return": "seven"}"#)
            .expect_err("must reject");
        assert!(err.to_string().contains("seven"));
    }

    #[test]
    fn cors_rejects_unparsable_origin() {
        let err = cors_layer(&["bad\norigin".to_string()]).expect_err("invalid header");
        assert!(matches!(err, ServerError::InvalidOrigin(_)));
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_route_responds() {
        let (status, json) = call("GET", "/api/test", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Test successful!");
    }

    #[tokio::test]
    async fn final_balance_returns_schedule() {
        let (status, json) = call(
            "POST",
            "/api/final_balance",
            json!({"year_return": 2, "monthly_reserve": 2, "reserve_periods": 10}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["final_balance"], 265);
        assert_eq!(json["result"]["total_principal"], 240);
        let data = json["result"]["monthly_data"].as_array().expect("array");
        assert_eq!(data.len(), 121);
        for key in ["date", "principal", "return", "balance", "contribution"] {
            assert!(data[0].get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn non_numeric_field_is_a_json_400() {
        let (status, json) = call(
            "POST",
            "/api/final_balance",
            json!({"year_return": "seven", "reserve_periods": 10}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().expect("message").contains("seven"));

        let (status, json) = call(
            "POST",
            "/api/withdrawal/amount",
            json!({"initial_balance": [1, 2], "years": 5}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn huge_horizon_is_rejected_not_overflowed() {
        let (status, json) = call(
            "POST",
            "/api/present_data?target=amount",
            json!({"reserve_periods": 400_000_000, "monthly_reserve": 1, "target_amount": 1000}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().expect("message").contains("horizon"));
    }

    #[tokio::test]
    async fn final_balance_rejects_missing_horizon() {
        let (status, json) = call("POST", "/api/final_balance", json!({"year_return": 5})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().expect("message").contains("horizon"));
    }

    #[tokio::test]
    async fn present_data_solves_each_target() {
        let body = json!({
            "year_return": 2, "monthly_reserve": 2, "reserve_periods": 10, "target_amount": 1000
        });

        let (status, json) = call("POST", "/api/present_data?target=amount", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["back_to_present"], 8.0);
        assert!(json["chart_data"]["final_balance"].as_i64().expect("int") >= 1_000);

        let (status, json) = call("POST", "/api/present_data?target=horizon", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["back_to_present"], 31);

        let (status, json) = call("POST", "/api/present_data?target=rate", body).await;
        assert_eq!(status, StatusCode::OK);
        let percent = json["back_to_present"].as_f64().expect("number");
        assert!(percent > 2.0 && percent < 100.0, "got {percent}");
    }

    #[tokio::test]
    async fn present_data_requires_known_target() {
        let body = json!({"reserve_periods": 10, "target_amount": 1000});
        let (status, _) = call("POST", "/api/present_data", body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, json) = call("POST", "/api/present_data?target=num", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().expect("message").contains("target"));
    }

    #[tokio::test]
    async fn present_data_rejects_non_positive_target() {
        let body = json!({"reserve_periods": 10, "monthly_reserve": 5});
        let (status, json) = call("POST", "/api/present_data?target=amount", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().expect("message").contains("target value"));
    }

    #[tokio::test]
    async fn withdrawal_routes_solve_their_unknown() {
        let (status, json) = call(
            "POST",
            "/api/withdrawal/duration",
            json!({"initial_balance": 100000, "monthly_withdrawal": 1000, "year_return": 10}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["solved_for"], "duration");
        assert_eq!(json["no_growth"]["value"]["years"], 8);

        let (status, json) = call(
            "POST",
            "/api/withdrawal/amount",
            json!({"initial_balance": 100000, "years": 20, "year_return": "10"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["solved_for"], "monthly_withdrawal");
        assert_eq!(
            json["monthly_balances"].as_array().expect("array").len(),
            240
        );

        let (status, json) = call(
            "POST",
            "/api/withdrawal/initial",
            json!({"monthly_withdrawal": 1000, "years": 20, "year_return": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["initial_balance"], 240_000.0);
    }

    #[tokio::test]
    async fn withdrawal_rejects_missing_inputs() {
        let (status, json) = call("POST", "/api/withdrawal/initial", json!({"years": 5})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            json["error"]
                .as_str()
                .expect("message")
                .contains("monthly_withdrawal")
        );
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, json) = call("GET", "/nope", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Not found");
    }
}
