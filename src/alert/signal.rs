//! 硬件信号线 (Hardware signal line)
//!
//! 面向字节的通道 (串口设备节点, 或转发给单片机的 TCP 对端), 状态变化时写入固定令牌.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, SentinelError};

/// 单片机约定的串口波特率
pub const SERIAL_BAUD: u32 = 9600;

/// 信号线电平
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Low,
    High,
}

/// 信号线接口: 写入失败返回错误, 由调用方记录
pub trait SignalLine: Send {
    fn write_token(&mut self, token: &[u8]) -> Result<()>;

    fn name(&self) -> &str;
}

type Connector = Box<dyn FnMut() -> io::Result<Box<dyn Write + Send>> + Send>;

/// 基于字节流的信号线, 写入失败后下次写入时重新连接
pub struct StreamSignalLine {
    name: String,
    connect: Connector,
    stream: Option<Box<dyn Write + Send>>,
}

impl StreamSignalLine {
    pub fn new(name: impl Into<String>, connect: Connector) -> Self {
        Self {
            name: name.into(),
            connect,
            stream: None,
        }
    }

    /// 串口设备节点, 只打开写入, 不设置波特率.
    /// 使用前需配置为 SERIAL_BAUD 8N1, 例如 `stty -F /dev/ttyACM0 9600 raw -echo`
    pub fn device(path: impl Into<String>) -> Self {
        let path = path.into();
        info!("🔌 串口 {} 需预先配置为 {} 波特 (stty)", path, SERIAL_BAUD);
        let open_path = path.clone();
        Self::new(
            format!("serial:{}", path),
            Box::new(move || {
                let file = OpenOptions::new().write(true).open(&open_path)?;
                Ok(Box::new(file) as Box<dyn Write + Send>)
            }),
        )
    }

    /// TCP 对端 (由对端转发给单片机)
    pub fn tcp(addr: impl Into<String>, timeout: Duration) -> Self {
        let addr = addr.into();
        let target = addr.clone();
        Self::new(
            format!("tcp:{}", addr),
            Box::new(move || {
                let resolved: Vec<SocketAddr> = target.to_socket_addrs()?.collect();
                let first = resolved.first().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "地址解析为空")
                })?;
                let stream = TcpStream::connect_timeout(first, timeout)?;
                stream.set_write_timeout(Some(timeout))?;
                Ok(Box::new(stream) as Box<dyn Write + Send>)
            }),
        )
    }

    /// 任意写入端 (测试或嵌入使用)
    pub fn from_writer<W: Write + Send + 'static>(name: impl Into<String>, writer: W) -> Self {
        let mut line = Self::new(
            name,
            Box::new(|| {
                Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "写入端已关闭",
                ))
            }),
        );
        line.stream = Some(Box::new(writer));
        line
    }

    fn try_write(&mut self, token: &[u8]) -> io::Result<()> {
        if self.stream.is_none() {
            let stream = (self.connect)()?;
            info!("🔌 信号线已连接: {}", self.name);
            self.stream = Some(stream);
        }
        match self.stream.as_mut() {
            Some(stream) => {
                stream.write_all(token)?;
                stream.flush()
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "信号线未连接")),
        }
    }
}

impl SignalLine for StreamSignalLine {
    fn write_token(&mut self, token: &[u8]) -> Result<()> {
        self.try_write(token).map_err(|e| {
            // 丢弃连接, 下次重连
            self.stream = None;
            SentinelError::Signal(format!("{}: {}", self.name, e))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 未配置硬件时使用
pub struct NullSignalLine;

impl SignalLine for NullSignalLine {
    fn write_token(&mut self, token: &[u8]) -> Result<()> {
        debug!("信号线未配置, 忽略: {}", String::from_utf8_lossy(token).trim());
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// 写入失败只记录
pub fn drive(line: &mut dyn SignalLine, token: &[u8]) -> bool {
    match line.write_token(token) {
        Ok(()) => true,
        Err(e) => {
            warn!("❌ {}", e);
            false
        }
    }
}
