//! # Collaborator Sources
//!
//! The HTTP back-ends the core reads from, behind one object-safe trait so the
//! composition root can inject the real clients and tests can inject fakes.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use lib_common::retrieve::ApiClient;
use serde_json::Value;

use crate::error::SyncError;
use crate::model::{ManifestResponse, PickTaskResponse};

/// Request/response primitives of the WCS and WMS.
pub trait WarehouseApi: Send + Sync {
    /// `GET /getDevice/{code}` on the WCS. The document is returned raw and
    /// validated by the caller.
    fn fetch_device<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Value, SyncError>>;

    /// `GET /Inventory/container/{containerCode}` on the WMS.
    fn fetch_manifest<'a>(
        &'a self,
        container: &'a str,
    ) -> BoxFuture<'a, Result<ManifestResponse, SyncError>>;

    /// `GET /StockOutOrder/PickTask?containerCode=...` on the WMS.
    fn fetch_pick_tasks<'a>(
        &'a self,
        container: &'a str,
    ) -> BoxFuture<'a, Result<PickTaskResponse, SyncError>>;
}

/// `WarehouseApi` over two `ApiClient`s.
pub struct HttpWarehouseApi {
    wms: ApiClient,
    wcs: ApiClient,
}

impl HttpWarehouseApi {
    /// `wms` is rooted at the warehouse API (`.../api/warehouse`), `wcs` at the
    /// control API (`.../api/WCS`).
    pub fn new(wms: ApiClient, wcs: ApiClient) -> Self {
        Self { wms, wcs }
    }
}

async fn get_json<T>(
    client: &ApiClient,
    segments: &[&str],
    query: &[(&str, &str)],
) -> Result<T, SyncError>
where
    T: serde::de::DeserializeOwned,
{
    let url = client.endpoint(segments).to_string();
    let response = client.get::<T>(segments, query).await?;
    Ok(response.into_data(&url)?)
}

impl WarehouseApi for HttpWarehouseApi {
    fn fetch_device<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Value, SyncError>> {
        async move { get_json(&self.wcs, &["getDevice", code], &[]).await }.boxed()
    }

    fn fetch_manifest<'a>(
        &'a self,
        container: &'a str,
    ) -> BoxFuture<'a, Result<ManifestResponse, SyncError>> {
        let segments = ["Inventory", "container", container];
        async move { get_json(&self.wms, &segments, &[]).await }.boxed()
    }

    fn fetch_pick_tasks<'a>(
        &'a self,
        container: &'a str,
    ) -> BoxFuture<'a, Result<PickTaskResponse, SyncError>> {
        async move {
            let query = [("containerCode", container)];
            get_json(&self.wms, &["StockOutOrder", "PickTask"], &query).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Serves one canned HTTP response on a random local port and hands back
    /// the base URL plus the request line that was received.
    fn serve_once(status: &str, body: &str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/json\r\n\
             Connection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2048];
            let n = stream.read(&mut buf).unwrap_or(0);
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            String::from_utf8_lossy(&buf[..n]).lines().next().unwrap_or_default().to_string()
        });
        (format!("http://127.0.0.1:{}/api", port), handle)
    }

    fn api(base: &str) -> HttpWarehouseApi {
        let client = ApiClient::new(base, Duration::from_secs(2), 0).unwrap();
        HttpWarehouseApi::new(client.clone(), client)
    }

    #[tokio::test]
    async fn manifest_request_and_decode() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"errCode":0,"errMsg":"","data":[
                {"goodsNo":"G1","goodsName":"Bolt","quantity":5,"unit":"pcs"}
            ]}"#,
        );
        let response = api(&base).fetch_manifest("PAL-77").await.unwrap();
        let request_line = server.join().unwrap();
        assert_eq!(request_line, "GET /api/Inventory/container/PAL-77 HTTP/1.1");
        assert_eq!(response.err_code, 0);
        assert_eq!(response.data.unwrap()[0].goods_name, "Bolt");
    }

    #[tokio::test]
    async fn pick_tasks_use_query_parameter() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"errCode":0,"data":[{"goodsNo":"G1","pickQuantity":"3"}]}"#,
        );
        let response = api(&base).fetch_pick_tasks("PAL-77").await.unwrap();
        assert_eq!(
            server.join().unwrap(),
            "GET /api/StockOutOrder/PickTask?containerCode=PAL-77 HTTP/1.1"
        );
        assert_eq!(response.data.unwrap()[0].quantity(), Some(3.0));
    }

    #[tokio::test]
    async fn http_failure_is_a_transport_error() {
        let (base, server) = serve_once("500 Internal Server Error", "boom");
        let err = api(&base).fetch_device("Tran3001").await.unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, SyncError::Transport(ref msg) if msg.contains("HTTP 500")));
    }
}
