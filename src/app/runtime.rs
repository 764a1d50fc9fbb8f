use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

use actix_web::{App, HttpServer, web};

use crate::adapters::api::{ApiState, SharedGateway, configure_routes};
use crate::adapters::store::{SqliteRowStore, open_connection, run_migrations};
use crate::adapters::telegram::{ChatTransport, TelegramHttpTransport, deliver_all};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::domain::clock::SystemClock;
use crate::domain::engine::{Gateway, GatewaySettings};

/// Periodically evicts idle dialogs and tells each affected chat. Shares the
/// gateway lock with the webhook handlers; one sweep holds it only long
/// enough to collect the notices.
pub fn start_sweeper(
    gateway: SharedGateway,
    transport: Arc<dyn ChatTransport>,
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            let notices = match gateway.lock() {
                Ok(mut gateway) => gateway.sweep_idle(),
                Err(_) => {
                    tracing::error!("gateway lock poisoned, sweeper stopping");
                    break;
                }
            };
            deliver_all(transport.as_ref(), &notices);
            std::thread::sleep(interval);
        }
    })
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let mut connection = open_connection(&config.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;

    let store = SqliteRowStore::new(Arc::new(Mutex::new(connection)));
    let settings = GatewaySettings {
        session_timeout: Duration::from_secs(config.session_timeout_secs),
        cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        time_offset_hours: config.time_offset_hours,
    };
    let gateway: SharedGateway = Arc::new(Mutex::new(Gateway::new(store, SystemClock, settings)));

    let http_transport = TelegramHttpTransport::new(&config.telegram_token);
    if let Some(public_url) = &config.public_url {
        let webhook_url = format!("{}/webhook", public_url.trim_end_matches('/'));
        http_transport
            .set_webhook(&webhook_url)
            .map_err(AppError::runtime)?;
        tracing::info!(url = %webhook_url, "webhook registered");
    }
    let transport: Arc<dyn ChatTransport> = Arc::new(http_transport);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let sweeper_handle = start_sweeper(
        Arc::clone(&gateway),
        Arc::clone(&transport),
        Duration::from_secs(config.sweep_interval_secs),
        Arc::clone(&stop_flag),
    );

    let api_state = ApiState { gateway, transport };

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    stop_flag.store(true, Ordering::Relaxed);
    let join_result = sweeper_handle.join();

    if join_result.is_err() {
        return Err(AppError::runtime("sweeper thread panicked"));
    }

    server_result.map_err(AppError::runtime)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };
    use std::time::Duration;

    use super::start_sweeper;
    use crate::adapters::telegram::ChatTransport;
    use crate::domain::clock::SystemClock;
    use crate::domain::engine::{Gateway, GatewaySettings, InboundEvent};
    use crate::domain::models::Role;
    use crate::test_support::{RecordingTransport, open_test_store, seed_approved_user};

    #[test]
    fn sweeper_delivers_idle_notices() {
        let store = open_test_store("sweeper.sqlite");
        seed_approved_user(&store, 999, "Jane Operator", Role::Operator);

        let settings = GatewaySettings {
            session_timeout: Duration::from_secs(0),
            ..GatewaySettings::default()
        };
        let gateway = Arc::new(Mutex::new(Gateway::new(store, SystemClock, settings)));
        gateway
            .lock()
            .expect("gateway lock")
            .process(InboundEvent::Text {
                user_id: 999,
                chat_id: 999,
                username: "jane".to_string(),
                text: "Start/Stop".to_string(),
            });

        let recorder = Arc::new(RecordingTransport::new());
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let handle = start_sweeper(
            Arc::clone(&gateway),
            transport,
            Duration::from_millis(50),
            Arc::clone(&stop_flag),
        );

        // Timeout zero still needs the idle gap to exceed it.
        std::thread::sleep(Duration::from_millis(1200));
        stop_flag.store(true, Ordering::Relaxed);
        handle.join().expect("sweeper thread should terminate");

        let sent = recorder.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 999);
        assert!(sent[0].text.contains("inactivity"));
    }
}
