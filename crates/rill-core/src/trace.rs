//! 规范调试输出的参考 Inspector（仅 `std`）。
//!
//! 输出格式逐行为：
//!
//! ```text
//! DEBUG:<sec>.<nsec10>:<event>:<depth-tildes> <payload>\n
//! ```
//!
//! 其中 `<event>` ∈ {`+node`, `-node`, `+conn`, `-conn`, `>send`, `<recv`}，
//! 波浪线数量等于节点的祖先容器数量，包值按 [`crate::packet`] 的
//! `Display` 渲染。时间戳来自系统时钟；核心其余部分不依赖任何时钟。

use alloc::format;
use alloc::string::String;

use std::boxed::Box;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::inspector::{ConnDesc, Inspector, NodeDesc};
use crate::options::OptionsRecord;
use crate::packet::Packet;

/// 把图生命周期与包事件按规范文本格式写入给定 sink 的 Inspector。
pub struct TraceInspector {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl TraceInspector {
    /// 输出到标准输出。
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// 输出到任意 `Write` sink。
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    fn emit(&self, event: &str, depth: usize, payload: &str) {
        let (secs, nanos) = wall_clock();
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        let _ = write!(sink, "DEBUG:{secs}.{nanos:010}:{event}:");
        for _ in 0..depth {
            let _ = write!(sink, "~");
        }
        let _ = writeln!(sink, " {payload}");
    }
}

fn wall_clock() -> (u64, u32) {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| (elapsed.as_secs(), elapsed.subsec_nanos()))
        .unwrap_or((0, 0))
}

fn node_payload(node: &NodeDesc<'_>, opts: Option<&OptionsRecord>) -> String {
    match opts.map(OptionsRecord::summary).filter(|s| !s.is_empty()) {
        Some(summary) => format!("{}({}:{})", node.display_id(), node.type_name, summary),
        None => format!("{}({})", node.display_id(), node.type_name),
    }
}

fn conn_payload(conn: &ConnDesc<'_>) -> String {
    format!(
        "{} OUT({}) {}->{} IN({}) {}",
        conn.src.display_id(),
        conn.src_type,
        conn.src_port,
        conn.dst_port,
        conn.dst_type,
        conn.dst.display_id()
    )
}

impl Inspector for TraceInspector {
    fn did_open_node(&self, node: &NodeDesc<'_>, opts: &OptionsRecord) {
        self.emit("+node", node.depth, &node_payload(node, Some(opts)));
    }

    fn will_close_node(&self, node: &NodeDesc<'_>) {
        self.emit("-node", node.depth, &node_payload(node, None));
    }

    fn did_connect_port(&self, conn: &ConnDesc<'_>) {
        self.emit("+conn", conn.dst.depth, &conn_payload(conn));
    }

    fn will_disconnect_port(&self, conn: &ConnDesc<'_>) {
        self.emit("-conn", conn.dst.depth, &conn_payload(conn));
    }

    fn will_send_packet(&self, src: &NodeDesc<'_>, _port: u16, packet: &Packet) {
        self.emit(
            ">send",
            src.depth,
            &format!(
                "{} OUT({}) -> {packet}",
                src.display_id(),
                packet.ty().name()
            ),
        );
    }

    fn will_deliver_packet(&self, dst: &NodeDesc<'_>, port: u16, _conn_id: u16, packet: &Packet) {
        self.emit(
            "<recv",
            dst.depth,
            &format!(
                "{packet} ->{port} IN({}) {}",
                packet.ty().name(),
                dst.display_id()
            ),
        );
    }
}
