//! 长度前缀分帧 (Length-prefixed framing)
//!
//! 每帧: 4字节大端长度 + 负载. 推送失败只记录, 不影响检测.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, SentinelError};

/// 单帧最大长度 (读取端保护)
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// 叠加画面出口
pub trait OverlaySink: Send {
    fn send(&mut self, payload: &[u8]) -> Result<()>;
}

/// 写入端
pub struct FrameWriter<W: Write> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| SentinelError::Transport(format!("帧过大: {} 字节", payload.len())))?;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> OverlaySink for FrameWriter<W> {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.write_frame(payload)
    }
}

/// 读取端 (消费端与测试使用)
pub struct FrameReader<R: Read> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// 读取一帧; 在帧边界处遇到 EOF 返回 Ok(None)
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match self.inner.read(&mut len_buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(SentinelError::Transport("长度前缀不完整".into()));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(SentinelError::Transport(format!("帧长度 {} 超出上限", len)));
        }
        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).map_err(|e| {
            SentinelError::Transport(format!("帧数据不完整 ({} 字节): {}", len, e))
        })?;
        Ok(Some(payload))
    }
}

/// TCP 推送: 断开后下一帧重连
pub struct TcpFrameSink {
    address: String,
    timeout: Duration,
    writer: Option<FrameWriter<TcpStream>>,
}

impl TcpFrameSink {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            writer: None,
        }
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let resolved: Vec<SocketAddr> = self.address.to_socket_addrs()?.collect();
        let first = resolved
            .first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "地址解析为空"))?;
        let stream = TcpStream::connect_timeout(first, self.timeout)?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl OverlaySink for TcpFrameSink {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.writer.is_none() {
            let stream = self
                .connect()
                .map_err(|e| SentinelError::Transport(format!("{}: {}", self.address, e)))?;
            info!("🔌 已连接画面消费端 {}", self.address);
            self.writer = Some(FrameWriter::new(stream));
        }
        let result = match self.writer.as_mut() {
            Some(writer) => writer.write_frame(payload),
            None => Ok(()),
        };
        if result.is_err() {
            warn!("⚠️ 画面消费端断开: {}", self.address);
            self.writer = None;
        }
        result
    }
}
