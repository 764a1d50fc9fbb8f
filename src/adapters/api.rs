use std::sync::{Arc, Mutex};

use actix_web::{HttpResponse, Responder, get, post, web};

use crate::adapters::store::SqliteRowStore;
use crate::adapters::telegram::{self, ChatTransport, Update};
use crate::domain::clock::SystemClock;
use crate::domain::engine::Gateway;

pub type SharedGateway = Arc<Mutex<Gateway<SqliteRowStore, SystemClock>>>;

#[derive(Clone)]
pub struct ApiState {
    pub gateway: SharedGateway,
    pub transport: Arc<dyn ChatTransport>,
}

pub fn configure_routes(config: &mut web::ServiceConfig) {
    config.service(health).service(webhook);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Webhook entry point. Always acknowledges with 200 so the chat service does
/// not redeliver; dialog and delivery failures are logged, never bounced.
#[post("/webhook")]
async fn webhook(state: web::Data<ApiState>, update: web::Json<Update>) -> impl Responder {
    let Some(event) = telegram::decode_update(update.into_inner()) else {
        return HttpResponse::Ok().finish();
    };

    let gateway = Arc::clone(&state.gateway);
    let transport = Arc::clone(&state.transport);

    // The dialog core and the outgoing HTTP calls are blocking; keep them off
    // the async workers. The lock is released before delivery starts.
    let outcome = web::block(move || {
        let replies = match gateway.lock() {
            Ok(mut gateway) => gateway.process(event),
            Err(_) => {
                tracing::error!("gateway lock poisoned");
                return;
            }
        };
        telegram::deliver_all(transport.as_ref(), &replies);
    })
    .await;

    if let Err(error) = outcome {
        tracing::error!(error = %error, "webhook worker failed");
    }
    HttpResponse::Ok().finish()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::{App, test, web};
    use serde_json::json;

    use super::{ApiState, configure_routes};
    use crate::adapters::telegram::ChatTransport;
    use crate::domain::clock::SystemClock;
    use crate::domain::engine::{Gateway, GatewaySettings};
    use crate::domain::models::Role;
    use crate::test_support::{RecordingTransport, open_test_store, seed_approved_user};

    fn state(name: &str) -> (web::Data<ApiState>, Arc<RecordingTransport>) {
        let store = open_test_store(name);
        seed_approved_user(&store, 999, "Jane Operator", Role::Operator);
        let gateway = Arc::new(Mutex::new(Gateway::new(
            store,
            SystemClock,
            GatewaySettings::default(),
        )));
        let recorder = Arc::new(RecordingTransport::new());
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        (
            web::Data::new(ApiState { gateway, transport }),
            recorder,
        )
    }

    #[actix_web::test]
    async fn health_endpoint_responds_ok() {
        let (state, _) = state("api-health.sqlite");
        let app =
            test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let request = test::TestRequest::get().uri("/health").to_request();
        let response = test::call_service(&app, request).await;

        assert!(response.status().is_success());
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[actix_web::test]
    async fn webhook_runs_the_dialog_and_delivers_replies() {
        let (state, recorder) = state("api-webhook.sqlite");
        let app =
            test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({
                "update_id": 1,
                "message": {
                    "chat": { "id": 999 },
                    "from": { "id": 999, "username": "jane" },
                    "text": "Start/Stop"
                }
            }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert!(response.status().is_success());
        let sent = recorder.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 999);
        assert!(sent[0].text.contains("Choose an action"));
    }

    #[actix_web::test]
    async fn unhandled_updates_are_acknowledged_silently() {
        let (state, recorder) = state("api-silent.sqlite");
        let app =
            test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let request = test::TestRequest::post()
            .uri("/webhook")
            .set_json(json!({ "update_id": 2 }))
            .to_request();
        let response = test::call_service(&app, request).await;

        assert!(response.status().is_success());
        assert!(recorder.take().is_empty());
    }
}
