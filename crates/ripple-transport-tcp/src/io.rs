//! 基于就绪模型的读写原语，供通道与上层协议服务器共用。

use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::net::TcpStream;

/// 等待可读并向 `buf` 追加一次读取的字节。
///
/// 返回 `Ok(0)` 表示对端已关闭（EOF）。`WouldBlock` 在内部消化：
/// 就绪通知可能是虚假的，循环重试直到真正读到数据或出错。
pub async fn read_chunk(stream: &TcpStream, buf: &mut BytesMut) -> io::Result<usize> {
    loop {
        stream.readable().await?;
        match stream.try_read_buf(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err),
        }
    }
}

/// 将 `buf` 全部写入连接，尊重写就绪信号。
///
/// 内核写缓冲不可写（`WouldBlock`）时挂起等待 `writable()`，这正是
/// 出站背压的落点：写源的排放被此处的暂停自然拖慢。
pub async fn write_all(stream: &TcpStream, buf: &mut BytesMut) -> io::Result<()> {
    while !buf.is_empty() {
        stream.writable().await?;
        match stream.try_write(buf) {
            Ok(n) => buf.advance(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// 双向关闭底层套接字，幂等且忽略“已关闭”类错误。
pub fn shutdown_both(stream: &TcpStream) {
    use std::net::Shutdown;
    let _ = socket2::SockRef::from(stream).shutdown(Shutdown::Both);
}

/// 析构时双向关闭套接字的守卫。
///
/// 连接任务在强制关闭路径上会被 `abort` 中止，任务尾部的显式关闭语句
/// 不再有机会执行；把关闭动作挂在守卫的 `Drop` 上，中止与正常返回走的
/// 就是同一条回收路径。套接字关闭同时会让滞留的读取泵观察到 EOF 退出。
pub struct ShutdownGuard(Arc<TcpStream>);

impl ShutdownGuard {
    /// 接管一个共享句柄；守卫离开作用域即关闭连接。
    pub fn new(stream: Arc<TcpStream>) -> Self {
        Self(stream)
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        shutdown_both(&self.0);
    }
}
