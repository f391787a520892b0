//! フォームの内容と WebSocket メッセージを返すサーバー
//!
//! ```text
//! RUST_LOG=tokio_httpd=debug cargo run --example echo_server
//! curl -d 'name=taro' http://127.0.0.1:8080/form
//! ```

use shiguredo_httpd::websocket::{CloseCode, Frame};
use shiguredo_httpd::{Method, Status, mime_type_for_file};
use tokio_httpd::{
    Handler, HttpSession, Response, Server, WebSocket, WebSocketHandler, WebSocketUpgrade,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Echo;

impl Handler for Echo {
    async fn handle(&self, session: &mut HttpSession) -> Response {
        if session.method() == Method::Post {
            if let Err(e) = session.parse_body().await {
                tracing::warn!("body could not be parsed: {e}");
            }
        }
        let mut lines = vec![format!("{} {}", session.method(), session.uri())];
        let mut names: Vec<_> = session.parameters().keys().cloned().collect();
        names.sort();
        for name in names {
            lines.push(format!("{name} = {:?}", session.parameters()[&name]));
        }
        let visits = session
            .cookies()
            .read("visits")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
            + 1;
        session.cookies().set("visits", &visits.to_string(), 1);
        lines.push(format!("visits = {visits}"));
        lines.push(format!("type = {}", mime_type_for_file(session.uri())));
        Response::text(Status::Ok, "text/plain", &lines.join("\n"))
    }
}

struct EchoSocket;

impl WebSocketHandler for EchoSocket {
    async fn on_open(&self, socket: WebSocket) {
        let _ = socket.send_text("welcome").await;
    }

    async fn on_message(&self, socket: &WebSocket, message: Frame) {
        if message.text_payload() == Some("quit") {
            let _ = socket.close(CloseCode::NormalClosure, "bye").await;
            return;
        }
        let _ = socket.send_frame(message).await;
    }

    async fn on_close(&self, code: CloseCode, reason: &str, initiated_by_remote: bool) {
        tracing::info!(%code, reason, initiated_by_remote, "websocket closed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokio_httpd=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = Server::bind("127.0.0.1:8080")
        .await?
        .interceptor(WebSocketUpgrade::new(|_session: &HttpSession| EchoSocket));
    tracing::info!(addr = %server.local_addr()?, "listening");

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });
    server.serve(Echo).await?;
    Ok(())
}
