use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::models::{AppState, DescriptionResponse, ToolSummary};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/description", get(description))
        .with_state(state)
}

async fn description(State(state): State<AppState>) -> Json<DescriptionResponse> {
    let tools = state
        .agent
        .tools()
        .definitions()
        .into_iter()
        .map(|d| ToolSummary {
            name: d.name,
            description: d.description,
        })
        .collect();

    Json(DescriptionResponse {
        name: state.config.report.brand.clone(),
        description: "Neoantigen selection assistant: answers questions, calls prediction tools \
                      and runs the cleavage, TAP, MHC binding, immunogenicity, TCR and mRNA design pipeline."
            .to_string(),
        model: state.config.llm.model.clone(),
        tools,
        pipeline: state.agent.pipeline().plan(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{body_string, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_description_lists_tools_and_steps() {
        let app = router(test_state(vec![]));
        let response = app
            .oneshot(Request::get("/description").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["tools"][0]["name"], "echo");
        assert_eq!(body["pipeline"].as_array().map(Vec::len), Some(6));
        assert_eq!(body["pipeline"][2]["criterion"], "%Rank_EL <= 2");
    }
}
