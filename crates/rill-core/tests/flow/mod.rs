//! 端到端场景：单边投递、扇出、组合包、回退、嵌套导出与错误端口。
//!
//! Inspector 单例全进程只安装一次；每个场景使用独有的节点 id 前缀，
//! 以 `events_about` 切出自己的事件子序列，测试之间互不干扰。

use std::any::Any;
use std::sync::Mutex;

use rill_core::flow::StaticFlowSpec;
use rill_core::node::{NodeContext, NodeType};
use rill_core::packet::{registry, ty, Packet};
use rill_core::port::{PortInType, PortOutType, PORT_ERROR};
use rill_core::test_stubs::{self, InspectorEvent};
use rill_core::{ErrorKind, Node, Result};

fn open_root(spec: StaticFlowSpec, type_name: &'static str, id: &str) -> Node {
    let ty = spec.build_type(type_name).expect("container spec must build");
    let opts = ty.options().defaults();
    Node::new(ty, Some(id), &opts).expect("container must open")
}

#[test]
fn scenario_a_single_edge_delivery() {
    let recorder = test_stubs::install_recorder();

    let root = open_root(
        StaticFlowSpec::new()
            .child_with_opts("sa_src", test_stubs::int_generator(), &["value=7"])
            .child("sa_sink", test_stubs::int_sink())
            .connect(0, 0, 1, 0),
        "scenario/a",
        "sa_root",
    );
    drop(root);

    let packet = "<val:7|min:-2147483648|max:2147483647|step:1>".to_string();
    assert_eq!(
        recorder.events_about("sa_"),
        vec![
            InspectorEvent::NodeOpened {
                id: "sa_root".into(),
                depth: 0,
            },
            InspectorEvent::NodeOpened {
                id: "sa_src".into(),
                depth: 1,
            },
            InspectorEvent::NodeOpened {
                id: "sa_sink".into(),
                depth: 1,
            },
            InspectorEvent::Connected {
                src: "sa_src".into(),
                src_port: 0,
                dst: "sa_sink".into(),
                dst_port: 0,
                conn_id: 0,
            },
            InspectorEvent::Sent {
                id: "sa_src".into(),
                port: 0,
                packet: packet.clone(),
            },
            InspectorEvent::Delivered {
                id: "sa_sink".into(),
                port: 0,
                conn_id: 0,
                packet,
                depth: 1,
            },
            InspectorEvent::NodeClosed {
                id: "sa_root".into(),
                depth: 0,
            },
            InspectorEvent::NodeClosed {
                id: "sa_sink".into(),
                depth: 1,
            },
            InspectorEvent::Disconnected {
                src: "sa_src".into(),
                src_port: 0,
                dst: "sa_sink".into(),
                dst_port: 0,
                conn_id: 0,
            },
            InspectorEvent::NodeClosed {
                id: "sa_src".into(),
                depth: 1,
            },
        ],
        "单边场景的事件序列必须逐项确定"
    );
    assert_eq!(
        test_stubs::int_sink_received("sa_"),
        vec![("sa_sink".to_string(), 7, 0)]
    );
}

#[test]
fn scenario_b_fan_out_delivers_in_connection_order() {
    let recorder = test_stubs::install_recorder();

    let mut root = open_root(
        StaticFlowSpec::new()
            .child("sb_src", test_stubs::forwarder())
            .child("sb_a", test_stubs::int_sink())
            .child("sb_b", test_stubs::int_sink())
            .connect(0, 0, 1, 0)
            .connect(0, 0, 2, 0)
            .export_in(0, 0),
        "scenario/b",
        "sb_root",
    );

    root.process(0, &Packet::new_irange_value(5)).unwrap();

    let deliveries: Vec<InspectorEvent> = recorder
        .events_about("sb_")
        .into_iter()
        .filter(|event| {
            matches!(event, InspectorEvent::Delivered { id, .. } if id != "sb_src")
        })
        .collect();
    let packet = "<val:5|min:-2147483648|max:2147483647|step:1>".to_string();
    assert_eq!(
        deliveries,
        vec![
            InspectorEvent::Delivered {
                id: "sb_a".into(),
                port: 0,
                conn_id: 0,
                packet: packet.clone(),
                depth: 1,
            },
            InspectorEvent::Delivered {
                id: "sb_b".into(),
                port: 0,
                conn_id: 0,
                packet,
                depth: 1,
            },
        ],
        "一次 send 必须按连接表顺序产生恰好两次投递"
    );
    assert_eq!(
        test_stubs::int_sink_received("sb_"),
        vec![("sb_a".to_string(), 5, 0), ("sb_b".to_string(), 5, 0)]
    );
}

fn composed_pair_connect(
    ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
) -> Result<()> {
    let pair = registry::composed(&[ty::string().clone(), ty::irange().clone()])?;
    let packet = Packet::new_composed(
        &pair,
        vec![Packet::new_string("k"), Packet::new_irange_value(42)],
    )?;
    ctx.send(0, packet)
}

fn composed_pair_type() -> std::sync::Arc<NodeType> {
    let pair = registry::composed(&[ty::string().clone(), ty::irange().clone()])
        .expect("composed type must build");
    NodeType::builder("composed-pair")
        .category("test/source")
        .port_out(PortOutType::new(pair).with_connect(composed_pair_connect))
        .build()
}

#[test]
fn scenario_c_composed_packet_renders_members_in_order() {
    test_stubs::install_recorder();

    let root = open_root(
        StaticFlowSpec::new()
            .child("sc_src", composed_pair_type())
            .child("sc_sink", test_stubs::any_sink())
            .connect(0, 0, 1, 0),
        "scenario/c",
        "sc_root",
    );

    let received = test_stubs::any_sink_received("sc_");
    assert_eq!(received.len(), 1, "组合包应恰好投递一次");
    assert!(
        received[0]
            .1
            .contains("<COMPOSED-PACKET {<\"k\"><val:42|"),
        "实际渲染: {}",
        received[0].1
    );
    drop(root);
}

#[test]
fn scenario_d_open_failure_rolls_back_in_reverse() {
    let recorder = test_stubs::install_recorder();

    let ty = StaticFlowSpec::new()
        .child_with_opts("sd_ok", test_stubs::int_generator(), &["value=1"])
        .child("sd_bad", test_stubs::broken())
        .build_type("scenario/d")
        .unwrap();
    let opts = ty.options().defaults();
    let err = Node::new(ty, Some("sd_root"), &opts).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);

    let events = recorder.events_about("sd_");
    assert_eq!(
        events,
        vec![
            InspectorEvent::NodeOpened {
                id: "sd_root".into(),
                depth: 0,
            },
            InspectorEvent::NodeOpened {
                id: "sd_ok".into(),
                depth: 1,
            },
            InspectorEvent::NodeOpened {
                id: "sd_bad".into(),
                depth: 1,
            },
            InspectorEvent::NodeClosed {
                id: "sd_bad".into(),
                depth: 1,
            },
            InspectorEvent::NodeClosed {
                id: "sd_ok".into(),
                depth: 1,
            },
            InspectorEvent::NodeClosed {
                id: "sd_root".into(),
                depth: 0,
            },
        ],
        "开启失败必须逆序回退，且不得出现任何连接事件"
    );
}

#[test]
fn scenario_e_nested_reexport_reaches_inner_child() {
    let recorder = test_stubs::install_recorder();

    let inner = StaticFlowSpec::new()
        .child("se_x", test_stubs::int_sink())
        .export_in(0, 0)
        .build_type("scenario/e-inner")
        .unwrap();

    let mut root = open_root(
        StaticFlowSpec::new()
            .child("se_y", test_stubs::forwarder())
            .child("se_a", inner)
            .connect(0, 0, 1, 0)
            .export_in(0, 0),
        "scenario/e",
        "se_root",
    );

    root.process(0, &Packet::new_irange_value(9)).unwrap();

    assert_eq!(
        test_stubs::int_sink_received("se_"),
        vec![("se_x".to_string(), 9, 0)]
    );
    let delivered_to_x: Vec<InspectorEvent> = recorder
        .events_about("se_x")
        .into_iter()
        .filter(|event| matches!(event, InspectorEvent::Delivered { .. }))
        .collect();
    assert_eq!(
        delivered_to_x,
        vec![InspectorEvent::Delivered {
            id: "se_x".into(),
            port: 0,
            conn_id: 0,
            packet: "<val:9|min:-2147483648|max:2147483647|step:1>".into(),
            depth: 2,
        }],
        "经导出端口转入的包必须落在内部子节点，嵌套深度为 2（即 `~~`）"
    );
}

#[test]
fn scenario_f_unconnected_error_port_is_silent_success() {
    let recorder = test_stubs::install_recorder();

    let mut root = open_root(
        StaticFlowSpec::new()
            .child_with_opts(
                "sf_err",
                test_stubs::error_emitter(),
                &["code=-2", "message=\"sensor died\""],
            )
            .export_in(0, 0),
        "scenario/f",
        "sf_root",
    );

    root.process(0, &Packet::new_empty()).unwrap();

    let events = recorder.events_about("sf_err");
    let sends: Vec<&InspectorEvent> = events
        .iter()
        .filter(|event| matches!(event, InspectorEvent::Sent { .. }))
        .collect();
    assert_eq!(
        sends,
        vec![&InspectorEvent::Sent {
            id: "sf_err".into(),
            port: PORT_ERROR,
            packet: "<code:-2|msg:\"sensor died\">".into(),
        }],
        "错误包照常经过 send 钩子"
    );
    let deliveries = events
        .iter()
        .filter(|event| matches!(event, InspectorEvent::Delivered { .. }))
        .count();
    assert_eq!(deliveries, 1, "只有触发包被投递，错误包静默丢弃");
}

static ERROR_PROBE_SEEN: Mutex<Vec<(i32, String)>> = Mutex::new(Vec::new());

fn error_probe_process(
    _ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
    packet: &Packet,
) -> Result<()> {
    let (code, message) = packet.as_error()?;
    ERROR_PROBE_SEEN
        .lock()
        .unwrap()
        .push((code, message.to_string()));
    Ok(())
}

fn error_probe_type() -> std::sync::Arc<NodeType> {
    NodeType::builder("error-probe")
        .category("test/sink")
        .port_in(PortInType::new(ty::error().clone()).with_process(error_probe_process))
        .build()
}

/// 错误端口接线后的往返：发送 (code, msg)，`process` 侧取回同一 (code, msg)。
#[test]
fn connected_error_port_roundtrips_code_and_message() {
    test_stubs::install_recorder();

    let mut root = open_root(
        StaticFlowSpec::new()
            .child_with_opts(
                "sg_err",
                test_stubs::error_emitter(),
                &["code=-7", "message=\"parse failed\""],
            )
            .child("sg_probe", error_probe_type())
            .connect(0, PORT_ERROR, 1, 0)
            .export_in(0, 0),
        "scenario/g",
        "sg_root",
    );

    root.process(0, &Packet::new_empty()).unwrap();

    let seen = ERROR_PROBE_SEEN.lock().unwrap().clone();
    assert_eq!(seen, vec![(-7, "parse failed".to_string())]);
}

#[test]
fn teardown_disconnects_in_descending_conn_id_order() {
    let recorder = test_stubs::install_recorder();

    let root = open_root(
        StaticFlowSpec::new()
            .child("sh_s1", test_stubs::forwarder())
            .child("sh_s2", test_stubs::forwarder())
            .child("sh_sink", test_stubs::int_sink())
            .connect(0, 0, 2, 0)
            .connect(1, 0, 2, 0),
        "scenario/h",
        "sh_root",
    );
    drop(root);

    let disconnects: Vec<InspectorEvent> = recorder
        .events_about("sh_")
        .into_iter()
        .filter(|event| matches!(event, InspectorEvent::Disconnected { .. }))
        .collect();
    assert_eq!(
        disconnects,
        vec![
            InspectorEvent::Disconnected {
                src: "sh_s2".into(),
                src_port: 0,
                dst: "sh_sink".into(),
                dst_port: 0,
                conn_id: 1,
            },
            InspectorEvent::Disconnected {
                src: "sh_s1".into(),
                src_port: 0,
                dst: "sh_sink".into(),
                dst_port: 0,
                conn_id: 0,
            },
        ],
        "同一端点的边必须按 conn-id 降序断开"
    );
}

static DECREMENT_SEEN: Mutex<Vec<i32>> = Mutex::new(Vec::new());

fn decrement_process(
    ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
    packet: &Packet,
) -> Result<()> {
    let value = packet.as_irange()?.val;
    DECREMENT_SEEN.lock().unwrap().push(value);
    if value > 0 {
        ctx.send(0, Packet::new_irange_value(value - 1))?;
    }
    Ok(())
}

fn decrement_type() -> std::sync::Arc<NodeType> {
    NodeType::builder("decrement")
        .category("test/filter")
        .port_in(PortInType::new(ty::irange().clone()).with_process(decrement_process))
        .port_out(PortOutType::new(ty::irange().clone()))
        .build()
}

/// 自环投递回正在处理的节点：重入转入待投队列，由最外层帧排空，
/// 最外层 `process` 返回前全部级联投递完成。
#[test]
fn self_loop_reentry_is_queued_and_fully_drained() {
    test_stubs::install_recorder();

    let mut root = open_root(
        StaticFlowSpec::new()
            .child("si_dec", decrement_type())
            .connect(0, 0, 0, 0)
            .export_in(0, 0),
        "scenario/i",
        "si_root",
    );

    root.process(0, &Packet::new_irange_value(3)).unwrap();

    let seen = DECREMENT_SEEN.lock().unwrap().clone();
    assert_eq!(seen, vec![3, 2, 1, 0], "级联必须在注入调用返回前完成");
}

#[derive(Debug, thiserror::Error)]
#[error("malformed reading from the probe bus")]
struct ProbeBusError;

fn failing_process(
    _ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
    _packet: &Packet,
) -> Result<()> {
    Err(
        rill_core::FlowError::new(ErrorKind::NotFound, "reading could not be decoded")
            .with_std_cause(ProbeBusError),
    )
}

fn failing_type() -> std::sync::Arc<NodeType> {
    NodeType::builder("failing-probe")
        .category("test/sink")
        .port_in(PortInType::new(ty::any().clone()).with_process(failing_process))
        .build()
}

/// `process` 的失败沿分发路径返回给注入方，底层原因链保持可回溯。
#[test]
fn process_failures_propagate_with_cause_chain() {
    test_stubs::install_recorder();

    let mut root = open_root(
        StaticFlowSpec::new()
            .child("sl_fail", failing_type())
            .export_in(0, 0),
        "scenario/l",
        "sl_root",
    );

    let err = root.process(0, &Packet::new_empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.cause().is_some(), "嵌入方错误必须留在 cause 链上");
}

fn double_value(child: u16, opts: &mut rill_core::options::OptionsRecord) {
    if child == 0 {
        if let Some(range) = opts.int("value") {
            let doubled = rill_core::types::IntRange {
                val: range.val * 2,
                ..range
            };
            opts.set("value", rill_core::options::OptionValue::Int(doubled))
                .expect("value member exists");
        }
    }
}

/// `child_opts_set` 在实例化时改写子节点选项的副本，规格本身保持不变。
#[test]
fn child_opts_set_rewrites_options_at_instantiation() {
    test_stubs::install_recorder();

    let spec = StaticFlowSpec::new()
        .child_with_opts("sk_src", test_stubs::int_generator(), &["value=21"])
        .child("sk_sink", test_stubs::int_sink())
        .connect(0, 0, 1, 0)
        .child_opts_set(double_value);
    let root = open_root(spec, "scenario/k", "sk_root");

    assert_eq!(
        test_stubs::int_sink_received("sk_"),
        vec![("sk_sink".to_string(), 42, 0)],
        "生成器应以改写后的值 42 发包"
    );
    drop(root);
}

/// 不变式 3：子节点的父侧槽位与父容器子表的索引一致。
#[test]
fn parent_slot_matches_child_table_index() {
    test_stubs::install_recorder();

    let root = open_root(
        StaticFlowSpec::new()
            .child("sj_a", test_stubs::forwarder())
            .child("sj_b", test_stubs::int_sink())
            .connect(0, 0, 1, 0),
        "scenario/j",
        "sj_root",
    );

    assert_eq!(root.meta().parent_slot(), None, "根节点无父侧槽位");
    assert_eq!(test_stubs::child_count(&root), Some(2));
    for idx in 0..2u16 {
        let slot = test_stubs::child_meta(&root, idx, |meta| meta.parent_slot()).unwrap();
        assert_eq!(slot, Some(idx));
    }

    // 不变式 2：连接表全程保持排序。
    let conns = test_stubs::connections_of(&root).unwrap();
    let mut keys: Vec<_> = conns
        .iter()
        .map(|c| (c.src_idx, c.src_port, c.dst_idx, c.dst_port))
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        conns
            .iter()
            .map(|c| (c.src_idx, c.src_port, c.dst_idx, c.dst_port))
            .collect::<Vec<_>>()
    );
}
