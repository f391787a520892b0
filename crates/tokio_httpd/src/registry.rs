//! 接続レジストリ
//!
//! 実行中の接続タスクを追跡し、一括で停止を通知する。
//! 各タスクは `watch::Receiver<bool>` を受け取り、読み込みの待機中に停止を検知する。
//! 書き込みやハンドラーの中で止まっているタスクは、通知から猶予時間が過ぎると
//! ストリームごと破棄される。

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

/// 停止通知から強制終了までの猶予時間のデフォルト
pub const DEFAULT_FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// 接続タスクの識別子
pub type ConnectionId = u64;

#[derive(Default)]
struct Running {
    next_id: ConnectionId,
    tasks: HashMap<ConnectionId, watch::Sender<bool>>,
}

/// 接続レジストリ
#[derive(Clone)]
pub struct ConnectionRegistry {
    running: Arc<Mutex<Running>>,
    force_close_grace: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_force_close_grace(DEFAULT_FORCE_CLOSE_GRACE)
    }

    /// 強制終了までの猶予時間を指定してレジストリを作成する
    pub fn with_force_close_grace(grace: Duration) -> Self {
        Self {
            running: Arc::new(Mutex::new(Running::default())),
            force_close_grace: grace,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Running> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 接続タスクを起動して登録する
    ///
    /// タスクの終了時に自動で `closed()` を呼ぶ。
    /// 停止通知後も猶予時間内に終わらないタスクは破棄する。
    pub fn exec<F, Fut>(&self, task: F) -> ConnectionId
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(false);
        let id = {
            let mut running = self.lock();
            let id = running.next_id;
            running.next_id += 1;
            running.tasks.insert(id, tx);
            id
        };
        let registry = self.clone();
        let mut signal = rx.clone();
        let grace = self.force_close_grace;
        let future = task(rx);
        tokio::spawn(async move {
            let forced = async move {
                if signal.wait_for(|closed| *closed).await.is_err() {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(grace).await;
            };
            tokio::select! {
                () = future => {}
                () = forced => {
                    tracing::debug!(id, "connection task force-closed");
                }
            }
            registry.closed(id);
        });
        id
    }

    /// 接続タスクの終了を記録する
    pub fn closed(&self, id: ConnectionId) {
        self.lock().tasks.remove(&id);
    }

    /// すべての接続タスクに停止を通知する
    pub fn close_all(&self) {
        let running = self.lock();
        tracing::debug!(connections = running.tasks.len(), "closing all connections");
        for tx in running.tasks.values() {
            tx.send_replace(true);
        }
    }

    /// 実行中の接続数
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_exec_and_close_all() {
        let registry = ConnectionRegistry::new();
        let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(2);
        for _ in 0..2 {
            let done_tx = done_tx.clone();
            registry.exec(move |mut shutdown| async move {
                let _ = shutdown.wait_for(|closed| *closed).await;
                let _ = done_tx.send(()).await;
            });
        }
        assert_eq!(registry.len(), 2);

        registry.close_all();
        done_rx.recv().await.unwrap();
        done_rx.recv().await.unwrap();

        for _ in 0..100 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_drops_task_blocked_in_write() {
        use tokio::io::AsyncWriteExt;

        let registry = ConnectionRegistry::with_force_close_grace(Duration::from_millis(20));
        let (mut client, server) = tokio::io::duplex(64);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        registry.exec(move |_shutdown| async move {
            let mut server = server;
            let _ = started_tx.send(());
            // 相手が読まないので書き込みが止まる
            let _ = server.write_all(&[0u8; 1 << 20]).await;
        });
        started_rx.await.unwrap();
        assert_eq!(registry.len(), 1);

        registry.close_all();
        for _ in 0..100 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.is_empty());

        // サーバー側のストリームが破棄されて EOF になる
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut buf)
            .await
            .unwrap();
        assert!(buf.len() < 1 << 20);
    }

    #[tokio::test]
    async fn test_finished_task_is_removed() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        registry.exec(move |_| async move {
            let _ = tx.send(());
        });
        rx.await.unwrap();
        for _ in 0..100 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.is_empty());
    }
}
