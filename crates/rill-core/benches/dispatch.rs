//! 分发热路径基准：单边链路与扇出投递。

use criterion::{criterion_group, criterion_main, Criterion};

use rill_core::flow::StaticFlowSpec;
use rill_core::packet::Packet;
use rill_core::test_stubs;
use rill_core::Node;

fn chain_container(len: u16) -> Node {
    let mut spec = StaticFlowSpec::new().child("head", test_stubs::forwarder());
    for idx in 1..len {
        spec = spec
            .child(format!("hop{idx}"), test_stubs::forwarder())
            .connect(idx - 1, 0, idx, 0);
    }
    let ty = spec.export_in(0, 0).build_type("bench/chain").unwrap();
    let opts = ty.options().defaults();
    Node::new(ty, Some("bench_chain"), &opts).unwrap()
}

fn fanout_container(width: u16) -> Node {
    let mut spec = StaticFlowSpec::new().child("head", test_stubs::forwarder());
    for idx in 1..=width {
        spec = spec.child(format!("leaf{idx}"), test_stubs::forwarder());
    }
    for idx in 1..=width {
        spec = spec.connect(0, 0, idx, 0);
    }
    let ty = spec.export_in(0, 0).build_type("bench/fanout").unwrap();
    let opts = ty.options().defaults();
    Node::new(ty, Some("bench_fanout"), &opts).unwrap()
}

fn bench_dispatch(c: &mut Criterion) {
    let mut chain = chain_container(16);
    c.bench_function("chain_16_hops", |b| {
        b.iter(|| {
            chain
                .process(0, &Packet::new_irange_value(7))
                .expect("chain delivery")
        })
    });

    let mut fanout = fanout_container(16);
    c.bench_function("fanout_16_leaves", |b| {
        b.iter(|| {
            fanout
                .process(0, &Packet::new_irange_value(7))
                .expect("fanout delivery")
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
