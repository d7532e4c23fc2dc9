//! 告警通知 (Notifications)
//!
//! 发送可能阻塞 (网络), 所以放在后台线程, 通过有界通道投递, 满了就丢弃并记录.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, SentinelError};
use crate::geofence::Severity;

/// 一条告警消息
#[derive(Clone, Debug, Serialize)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    pub zones: Vec<String>,
    pub track_ids: Vec<u32>,
    pub recipients: Vec<String>,
    pub timestamp: DateTime<Local>,
}

impl AlertMessage {
    pub fn new(
        subject: impl Into<String>,
        message: &str,
        severity: Severity,
        zones: Vec<String>,
        track_ids: Vec<u32>,
        recipients: Vec<String>,
    ) -> Self {
        let timestamp = Local::now();
        let body = format!(
            "{} [{}] 区域: {} 目标: {} 时间: {}",
            message,
            severity.as_str(),
            zones.join(","),
            track_ids
                .iter()
                .map(|id| format!("#{}", id))
                .collect::<Vec<_>>()
                .join(","),
            timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
        Self {
            subject: subject.into(),
            body,
            severity,
            zones,
            track_ids,
            recipients,
            timestamp,
        }
    }
}

/// 通知通道 (短信网关, 邮件中转, 日志...)
pub trait Notifier: Send {
    fn send(&mut self, message: &AlertMessage) -> Result<()>;
}

/// 只写日志
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        info!("📣 {} | {}", message.subject, message.body);
        Ok(())
    }
}

/// 以 JSON POST 到 HTTP 网关 (由网关转短信/邮件)
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&payload)
            .map_err(|e| SentinelError::Notify(format!("{}: {}", self.url, e)))?;
        Ok(())
    }
}

/// 投递通知的一侧 (状态机只关心投递是否被接受)
pub trait NotificationSink: Send {
    fn dispatch(&self, message: AlertMessage) -> bool;
}

/// 后台通知线程
pub struct NotificationDispatcher {
    tx: Option<Sender<AlertMessage>>,
    worker: Option<JoinHandle<()>>,
}

impl NotificationDispatcher {
    pub fn spawn(notifiers: Vec<Box<dyn Notifier>>, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded::<AlertMessage>(capacity.max(1));
        let worker = thread::Builder::new()
            .name("notify".into())
            .spawn(move || {
                let mut notifiers = notifiers;
                for message in rx.iter() {
                    for notifier in notifiers.iter_mut() {
                        if let Err(e) = notifier.send(&message) {
                            warn!("❌ 通知发送失败: {}", e);
                        }
                    }
                }
                info!("🛑 通知线程退出");
            })?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// 关闭通道并等待已排队的通知发完
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("❌ 通知线程异常退出");
            }
        }
    }
}

impl NotificationSink for NotificationDispatcher {
    fn dispatch(&self, message: AlertMessage) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("⚠️ 通知队列已满, 丢弃本次通知");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("⚠️ 通知线程已退出");
                false
            }
        }
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<String>>>);

    impl Notifier for Recording {
        fn send(&mut self, message: &AlertMessage) -> Result<()> {
            self.0.lock().unwrap().push(message.subject.clone());
            Ok(())
        }
    }

    struct Failing;

    impl Notifier for Failing {
        fn send(&mut self, _message: &AlertMessage) -> Result<()> {
            Err(SentinelError::Notify("offline".into()))
        }
    }

    fn message(subject: &str) -> AlertMessage {
        AlertMessage::new(
            subject,
            "Intrusion Detected!",
            Severity::Alarm,
            vec!["red".into()],
            vec![3],
            vec![],
        )
    }

    #[test]
    fn test_body_mentions_zone_and_track() {
        let m = message("Intrusion Alert");
        assert!(m.body.starts_with("Intrusion Detected!"));
        assert!(m.body.contains("red"));
        assert!(m.body.contains("#3"));
    }

    #[test]
    fn test_dispatcher_delivers_in_background() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = NotificationDispatcher::spawn(
            vec![Box::new(Failing), Box::new(Recording(seen.clone()))],
            8,
        )
        .unwrap();
        assert!(dispatcher.dispatch(message("a")));
        assert!(dispatcher.dispatch(message("b")));
        dispatcher.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_webhook_failure_is_error() {
        // 保留端口 9 上通常无服务
        let mut hook = WebhookNotifier::new("http://127.0.0.1:9/alert", Duration::from_millis(200));
        assert!(hook.send(&message("x")).is_err());
    }
}
