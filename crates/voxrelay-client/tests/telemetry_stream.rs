use std::time::Duration;

use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;
use voxrelay_client::Telemetry;
use voxrelay_core::OperationClass;

async fn setup_redis() -> (ContainerAsync<Redis>, String) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start Redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to resolve Redis port");
    (container, format!("redis://127.0.0.1:{port}"))
}

async fn stream_len(url: &str, key: &str) -> i64 {
    let client = redis::Client::open(url).expect("open redis client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connect to redis");
    redis::cmd("XLEN")
        .arg(key)
        .query_async(&mut conn)
        .await
        .expect("XLEN")
}

#[tokio::test]
async fn usage_records_land_on_the_stream() {
    let (_container, url) = setup_redis().await;
    let telemetry = Telemetry::new(Some(&url)).await.with_stream_key("test:usage");

    telemetry.record("user-42", OperationClass::Tts, 2048, 180);
    telemetry.record("user-42", OperationClass::Sfx, 512, 90);

    // Writes are fire-and-forget; poll until they land.
    let mut len = 0;
    for _ in 0..50 {
        len = stream_len(&url, "test:usage").await;
        if len == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(len, 2);
}

#[tokio::test]
async fn records_carry_hashed_ids_not_raw_keys() {
    let (_container, url) = setup_redis().await;
    let telemetry = Telemetry::new(Some(&url)).await.with_stream_key("test:hashed");

    telemetry.record("sk-super-secret-api-key", OperationClass::Stt, 4096, 900);

    let client = redis::Client::open(url.as_str()).expect("open redis client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connect to redis");

    let mut entries: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for _ in 0..50 {
        entries = redis::cmd("XRANGE")
            .arg("test:hashed")
            .arg("-")
            .arg("+")
            .query_async(&mut conn)
            .await
            .expect("XRANGE");
        if !entries.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(entries.len(), 1);
    let fields = &entries[0].1;
    let key_field = fields
        .iter()
        .find(|(name, _)| name == "key")
        .map(|(_, value)| value.clone())
        .expect("key field present");
    assert!(key_field.starts_with("..."));
    assert!(!key_field.contains("secret"));

    let operation = fields
        .iter()
        .find(|(name, _)| name == "operation")
        .map(|(_, value)| value.clone())
        .expect("operation field present");
    assert_eq!(operation, "stt");
}
